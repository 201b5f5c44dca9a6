//! Selections, line/column positions, and the change records hosts emit.

use std::fmt;

use smol_str::SmolStr;

/// Selection as flat char offsets.
///
/// `head` is the end that moves with the cursor; `anchor` stays put. Either
/// may come first.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    /// A caret at `offset`.
    pub fn collapsed(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn start(&self) -> usize {
        self.anchor.min(self.head)
    }

    pub fn end(&self) -> usize {
        self.anchor.max(self.head)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.head
    }

    /// Head before anchor, as after a shift-left drag.
    pub fn is_backwards(&self) -> bool {
        self.head < self.anchor
    }

    /// Same selection with anchor and head exchanged.
    pub fn flipped(&self) -> Self {
        Self::new(self.head, self.anchor)
    }
}

/// Line/column address in a newline-delimited buffer.
///
/// `ch` counts chars from the start of the line, so the position just past the
/// last char of a line is `ch == line_len`.
#[derive(Clone, Debug, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: usize,
    pub ch: usize,
}

impl Position {
    pub fn new(line: usize, ch: usize) -> Self {
        Self { line, ch }
    }

    /// Start of the given line.
    pub fn line_start(line: usize) -> Self {
        Self { line, ch: 0 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.ch)
    }
}

/// Where a buffer mutation came from.
///
/// Hosts tag every change so listeners can tell their own writes apart from
/// user input.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EditOrigin {
    /// Typing, deleting, or any other keystroke-sized edit.
    User,
    /// Clipboard paste.
    Paste,
    /// Drag-and-drop insertion.
    Drop,
    Undo,
    Redo,
    /// Whole-document replacement.
    SetValue,
    /// A named subsystem, such as a collaboration binding.
    Tagged(SmolStr),
}

impl EditOrigin {
    /// Bulk edits insert arbitrary amounts of text in one step and should
    /// not be merged with neighbouring keystrokes in undo history.
    pub fn is_bulk(&self) -> bool {
        matches!(self, EditOrigin::Paste | EditOrigin::Drop)
    }

    pub fn tagged(name: impl Into<SmolStr>) -> Self {
        EditOrigin::Tagged(name.into())
    }
}

/// One replaced range, reported after the edit has been applied.
///
/// `from`/`to` are in pre-change coordinates. `removed` and `inserted` are
/// split on `\n`, so a pure insertion has `removed == [""]` and a pure
/// deletion has `inserted == [""]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeRecord {
    pub from: Position,
    pub to: Position,
    pub removed: Vec<SmolStr>,
    pub inserted: Vec<SmolStr>,
    pub origin: EditOrigin,
}

impl ChangeRecord {
    /// Chars removed, counting one separator between consecutive lines.
    pub fn removed_len(&self) -> usize {
        let chars: usize = self.removed.iter().map(|l| l.chars().count()).sum();
        chars + self.removed.len().saturating_sub(1)
    }

    /// Inserted text with lines joined by `\n`.
    pub fn inserted_text(&self) -> String {
        self.inserted
            .iter()
            .map(SmolStr::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Split text into lines the way change records carry them.
pub fn split_lines(text: &str) -> Vec<SmolStr> {
    text.split('\n').map(SmolStr::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_orientation() {
        let forward = Selection::new(5, 10);
        assert_eq!((forward.start(), forward.end()), (5, 10));
        assert!(!forward.is_backwards());

        let backward = forward.flipped();
        assert_eq!(backward, Selection::new(10, 5));
        assert_eq!((backward.start(), backward.end()), (5, 10));
        assert!(backward.is_backwards());

        let caret = Selection::collapsed(7);
        assert!(caret.is_collapsed());
        assert!(!caret.is_backwards());
        assert_eq!(caret.flipped(), caret);
    }

    #[test]
    fn test_position_ordering() {
        assert!(Position::new(0, 10) < Position::new(1, 0));
        assert!(Position::new(2, 1) > Position::new(2, 0));
        assert_eq!(Position::line_start(3).to_string(), "3:0");
    }

    #[test]
    fn test_bulk_origins() {
        assert!(EditOrigin::Paste.is_bulk());
        assert!(EditOrigin::Drop.is_bulk());
        assert!(!EditOrigin::User.is_bulk());
        assert!(!EditOrigin::tagged("collab").is_bulk());
    }

    #[test]
    fn test_change_record_lengths() {
        let record = ChangeRecord {
            from: Position::new(0, 2),
            to: Position::new(2, 1),
            removed: split_lines("llo\nworld\nx"),
            inserted: split_lines("ab\ncd"),
            origin: EditOrigin::User,
        };
        // 3 + 5 + 1 chars plus two separators
        assert_eq!(record.removed_len(), 11);
        assert_eq!(record.inserted_text(), "ab\ncd");

        let insertion = ChangeRecord {
            from: Position::new(0, 0),
            to: Position::new(0, 0),
            removed: split_lines(""),
            inserted: split_lines("héllo"),
            origin: EditOrigin::User,
        };
        assert_eq!(insertion.removed_len(), 0);
    }
}
