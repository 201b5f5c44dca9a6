//! Editor host abstraction.
//!
//! `EditorHost` is the interface between collaboration logic and the widget
//! that owns the editable buffer (a browser editor, a native view, or the
//! in-memory `HeadlessEditor`). Everything is addressed by line/column
//! `Position`s with flat char-index conversions, and all methods take `&self`
//! so event listeners can call back into the host while it is dispatching.

use std::rc::Rc;

use smol_str::SmolStr;

use crate::types::{ChangeRecord, EditOrigin, Position, Selection};

/// Handle for a registered event listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Handle for a decoration added through [`EditorHost::add_decoration`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecorationId(pub u64);

/// Notifications delivered to host listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditorEvent {
    /// A range is about to be replaced. The buffer still holds the old text.
    BeforeChange {
        from: Position,
        to: Position,
        origin: EditOrigin,
    },
    /// All changes applied during one outermost operation, in order.
    Changes(Vec<ChangeRecord>),
    /// Selection or caret moved, either directly or through an edit.
    CursorActivity,
    Focus,
    Blur,
    /// The widget now shows a different document.
    DocumentSwapped,
}

/// Visual annotations painted by the host on behalf of collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoration {
    /// Background for a range within the text.
    Highlight {
        from: Position,
        to: Position,
        color: SmolStr,
    },
    /// Whole-line background, including the area past the end of the text.
    LineFill { line: usize, color: SmolStr },
    /// Caret widget with an optional name label.
    Caret {
        at: Position,
        name: SmolStr,
        color: SmolStr,
        show_name: bool,
    },
}

pub type EditorListener = Rc<dyn Fn(&EditorEvent)>;

/// The editable buffer widget, seen from collaboration code.
pub trait EditorHost {
    /// Full text content, lines joined by `\n`.
    ///
    /// Only `\n` separates lines. A `\r` must be kept as an ordinary char so
    /// char offsets match the shared text one to one.
    fn value(&self) -> String;

    /// Replace the whole document.
    fn set_value(&self, text: &str);

    /// Length in chars.
    fn len_chars(&self) -> usize;

    fn index_from_pos(&self, pos: Position) -> usize;

    fn pos_from_index(&self, index: usize) -> Position;

    /// Replace `from..to` with `text`, tagging the change with `origin`.
    ///
    /// Emits `BeforeChange` before mutating. The matching `Changes` event is
    /// delivered when the outermost operation ends.
    fn replace_range(&self, text: &str, from: Position, to: Position, origin: EditOrigin);

    /// Open a batched operation. Operations nest.
    fn start_operation(&self);

    /// Close a batched operation, flushing change and cursor events when the
    /// outermost one ends.
    fn end_operation(&self);

    fn in_operation(&self) -> bool;

    /// Run `f` inside one batched operation.
    fn operation<R>(&self, f: impl FnOnce() -> R) -> R
    where
        Self: Sized,
    {
        self.start_operation();
        let result = f();
        self.end_operation();
        result
    }

    /// Anchor and head as positions.
    fn selection_positions(&self) -> (Position, Position);

    /// Anchor and head as flat char indices.
    fn selection(&self) -> Selection {
        let (anchor, head) = self.selection_positions();
        Selection::new(self.index_from_pos(anchor), self.index_from_pos(head))
    }

    fn set_selection(&self, anchor: Position, head: Position, scroll: bool);

    /// Whether the editor itself has input focus.
    fn has_focus(&self) -> bool;

    /// Whether the surface containing the editor (window, document, tab) has focus.
    fn surface_has_focus(&self) -> bool;

    fn subscribe(&self, listener: EditorListener) -> ListenerId;

    fn unsubscribe(&self, id: ListenerId);

    fn add_decoration(&self, decoration: Decoration) -> DecorationId;

    fn update_decoration(&self, id: DecorationId, decoration: Decoration);

    fn clear_decoration(&self, id: DecorationId);
}
