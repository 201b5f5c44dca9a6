//! Undo/redo seam between editors and history stores, plus the key chords
//! that trigger it.

/// A history store an editor can step through.
///
/// `undo` and `redo` apply the change themselves and return whether
/// anything was applied.
pub trait UndoManager {
    fn can_undo(&self) -> bool;

    fn can_redo(&self) -> bool;

    fn undo(&mut self) -> bool;

    fn redo(&mut self) -> bool;

    /// Forget every undo and redo step.
    fn clear_history(&mut self);
}

/// History command bound to a key chord.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyCommand {
    Undo,
    Redo,
}

impl KeyCommand {
    /// Parse a chord such as `"Ctrl-Z"` or `"Shift-Cmd-Z"`.
    ///
    /// Modifiers may appear in any order and are case-insensitive.
    /// Recognized: `Ctrl-Z`/`Cmd-Z` undo, `Shift-Ctrl-Z`, `Ctrl-Y`,
    /// `Shift-Cmd-Z` and `Cmd-Y` redo.
    pub fn from_chord(chord: &str) -> Option<Self> {
        let mut shift = false;
        let mut primary = false;
        let mut key = None;
        for part in chord.split('-') {
            match part.to_ascii_lowercase().as_str() {
                "shift" => shift = true,
                "ctrl" | "cmd" | "mod" => primary = true,
                "" => return None,
                other => {
                    if key.is_some() {
                        return None;
                    }
                    key = Some(other.to_string());
                }
            }
        }
        if !primary {
            return None;
        }
        match (key.as_deref()?, shift) {
            ("z", false) => Some(KeyCommand::Undo),
            ("z", true) | ("y", false) => Some(KeyCommand::Redo),
            _ => None,
        }
    }
}
