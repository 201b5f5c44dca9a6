//! Line-addressed text storage.
//!
//! Editing works on flat char offsets; editors address the same text as
//! `\n`-delimited lines and columns. `TextBuffer` offers both views and the
//! clamped conversions between them.

use smol_str::{SmolStr, ToSmolStr};
use std::ops::Range;

use crate::types::Position;

/// Editable text addressed by char offset and by line/column.
///
/// Offsets count Unicode scalar values. Only `\n` starts a new line.
pub trait TextBuffer {
    fn len_chars(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len_chars() == 0
    }

    fn insert(&mut self, char_offset: usize, text: &str);

    fn delete(&mut self, char_range: Range<usize>);

    fn replace(&mut self, char_range: Range<usize>, text: &str) {
        self.delete(char_range.clone());
        self.insert(char_range.start, text);
    }

    /// Text in `char_range`, or `None` if the range is out of bounds.
    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr>;

    fn to_string(&self) -> String;

    /// Number of lines. An empty buffer has one line.
    fn len_lines(&self) -> usize;

    /// Line containing the char offset. Offsets past the end map to the last line.
    fn char_to_line(&self, char_offset: usize) -> usize;

    /// Char offset of the start of a line. Lines past the end map to `len_chars()`.
    fn line_to_char(&self, line: usize) -> usize;

    /// Length of a line in chars, excluding its `\n`.
    fn line_len(&self, line: usize) -> usize {
        let last = self.len_lines().saturating_sub(1);
        if line > last {
            return 0;
        }
        let start = self.line_to_char(line);
        if line == last {
            self.len_chars() - start
        } else {
            self.line_to_char(line + 1) - start - 1
        }
    }

    /// Line/column of a char offset, clamped to the buffer.
    fn offset_to_position(&self, char_offset: usize) -> Position {
        let offset = char_offset.min(self.len_chars());
        let line = self.char_to_line(offset);
        Position {
            line,
            ch: offset - self.line_to_char(line),
        }
    }

    /// Char offset of a line/column position.
    ///
    /// Lines past the end clip to the end of the buffer; columns past the
    /// end of a line clip to the end of that line.
    fn position_to_offset(&self, pos: Position) -> usize {
        let last = self.len_lines().saturating_sub(1);
        if pos.line > last {
            return self.len_chars();
        }
        self.line_to_char(pos.line) + pos.ch.min(self.line_len(pos.line))
    }
}

/// Ropey-backed [`TextBuffer`].
///
/// Ropey is built without its Unicode and CR line-break handling, so its line
/// indices agree with the `\n`-split lines of change records.
#[derive(Clone, Default)]
pub struct EditorRope {
    rope: ropey::Rope,
}

impl EditorRope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_str(s: &str) -> Self {
        Self {
            rope: ropey::Rope::from_str(s),
        }
    }
}

impl TextBuffer for EditorRope {
    fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    fn insert(&mut self, char_offset: usize, text: &str) {
        self.rope.insert(char_offset, text);
    }

    fn delete(&mut self, char_range: Range<usize>) {
        self.rope.remove(char_range);
    }

    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr> {
        if char_range.start > char_range.end || char_range.end > self.len_chars() {
            return None;
        }
        Some(self.rope.slice(char_range).to_smolstr())
    }

    fn to_string(&self) -> String {
        self.rope.to_string()
    }

    fn len_lines(&self) -> usize {
        self.rope.len_lines()
    }

    fn char_to_line(&self, char_offset: usize) -> usize {
        self.rope.char_to_line(char_offset.min(self.rope.len_chars()))
    }

    fn line_to_char(&self, line: usize) -> usize {
        if line >= self.rope.len_lines() {
            return self.rope.len_chars();
        }
        self.rope.line_to_char(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_across_lines() {
        let mut rope = EditorRope::from_str("one\ntwo\nthree");
        rope.replace(2..9, "ly\nt");
        assert_eq!(rope.to_string(), "only\nthree");
        assert_eq!(rope.len_lines(), 2);
        assert_eq!(rope.slice(5..10).as_deref(), Some("three"));
        assert_eq!(rope.slice(5..40), None);

        rope.insert(0, "é\n");
        assert_eq!(rope.offset_to_position(2), Position::new(1, 0));
        assert_eq!(rope.slice(0..1).as_deref(), Some("é"));
    }

    #[test]
    fn test_line_addressing() {
        let rope = EditorRope::from_str("ab\ncde\n\nf");
        assert_eq!(rope.len_lines(), 4);
        assert_eq!(rope.line_to_char(1), 3);
        assert_eq!(rope.line_len(0), 2);
        assert_eq!(rope.line_len(1), 3);
        assert_eq!(rope.line_len(2), 0);
        assert_eq!(rope.line_len(3), 1);
        assert_eq!(rope.line_len(9), 0);
    }

    #[test]
    fn test_position_conversion() {
        let rope = EditorRope::from_str("ab\ncde\n\nf");
        assert_eq!(rope.offset_to_position(0), Position::new(0, 0));
        assert_eq!(rope.offset_to_position(2), Position::new(0, 2));
        assert_eq!(rope.offset_to_position(3), Position::new(1, 0));
        assert_eq!(rope.offset_to_position(7), Position::new(2, 0));
        assert_eq!(rope.offset_to_position(9), Position::new(3, 1));
        assert_eq!(rope.offset_to_position(50), Position::new(3, 1));

        for offset in 0..=rope.len_chars() {
            let pos = rope.offset_to_position(offset);
            assert_eq!(rope.position_to_offset(pos), offset);
        }
    }

    #[test]
    fn test_position_clipping() {
        let rope = EditorRope::from_str("ab\ncde");
        // Column past end of line clips to the line end, not into the next line
        assert_eq!(rope.position_to_offset(Position::new(0, 10)), 2);
        // Line past the end clips to the end of the buffer
        assert_eq!(rope.position_to_offset(Position::new(7, 0)), 6);
    }

    #[test]
    fn test_only_newline_breaks_lines() {
        // Form feed, vertical tab and U+2028 are plain chars here.
        let rope = EditorRope::from_str("a\u{000C}b\u{2028}c\u{000B}d");
        assert_eq!(rope.len_lines(), 1);
        assert_eq!(rope.offset_to_position(6), Position::new(0, 6));
    }

    #[test]
    fn test_empty_buffer_lines() {
        let rope = EditorRope::new();
        assert!(rope.is_empty());
        assert_eq!(rope.len_lines(), 1);
        assert_eq!(rope.offset_to_position(0), Position::new(0, 0));
        assert_eq!(rope.position_to_offset(Position::new(0, 3)), 0);
    }
}
