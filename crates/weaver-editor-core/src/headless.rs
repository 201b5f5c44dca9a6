//! In-memory editor host.
//!
//! `HeadlessEditor` implements [`EditorHost`] over an [`EditorRope`] with the
//! event semantics of a line-based code editor: nested operations batch
//! change records, and selections are mapped through edits. Only `\n` ends a
//! line; `\r` is stored like any other char, so offsets into the editor and
//! into a bound shared text always agree. It backs tests and hosts that have
//! no visual widget.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::host::{Decoration, DecorationId, EditorEvent, EditorHost, EditorListener, ListenerId};
use crate::text::{EditorRope, TextBuffer};
use crate::types::{split_lines, ChangeRecord, EditOrigin, Position, Selection};

struct EditorState {
    text: EditorRope,
    selection: Selection,
    op_depth: usize,
    pending_changes: Vec<ChangeRecord>,
    cursor_moved: bool,
    focused: bool,
    surface_focused: bool,
    decorations: BTreeMap<DecorationId, Decoration>,
}

pub struct HeadlessEditor {
    state: RefCell<EditorState>,
    listeners: RefCell<Vec<(ListenerId, EditorListener)>>,
    next_listener: Cell<u64>,
    next_decoration: Cell<u64>,
}

/// Map an offset through the replacement of `start..end` by `inserted` chars.
///
/// Offsets before the change stay put, offsets inside it (or touching its
/// end) move to the end of the inserted text, later offsets shift.
fn map_offset(offset: usize, start: usize, end: usize, inserted: usize) -> usize {
    if offset < start {
        offset
    } else if offset <= end {
        start + inserted
    } else {
        offset - (end - start) + inserted
    }
}

impl Default for HeadlessEditor {
    fn default() -> Self {
        Self::new("")
    }
}

impl HeadlessEditor {
    /// Create an editor holding `text`, with the caret at the start.
    pub fn new(text: &str) -> Self {
        Self {
            state: RefCell::new(EditorState {
                text: EditorRope::from_str(text),
                selection: Selection::collapsed(0),
                op_depth: 0,
                pending_changes: Vec::new(),
                cursor_moved: false,
                focused: false,
                surface_focused: true,
                decorations: BTreeMap::new(),
            }),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
            next_decoration: Cell::new(0),
        }
    }

    fn emit(&self, event: &EditorEvent) {
        // Clone the list so listeners may subscribe or unsubscribe while we dispatch.
        let listeners: Vec<EditorListener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// Selection as flat indices.
    pub fn selection_indices(&self) -> Selection {
        self.state.borrow().selection
    }

    pub fn set_selection_indices(&self, anchor: usize, head: usize) {
        let (anchor, head) = {
            let state = self.state.borrow();
            (
                state.text.offset_to_position(anchor),
                state.text.offset_to_position(head),
            )
        };
        self.set_selection(anchor, head, true);
    }

    /// Replace the selected text as a user edit.
    pub fn replace_selection(&self, text: &str) {
        self.replace_selection_with(text, EditOrigin::User);
    }

    /// Replace the selected text as a paste.
    pub fn paste(&self, text: &str) {
        self.replace_selection_with(text, EditOrigin::Paste);
    }

    fn replace_selection_with(&self, text: &str, origin: EditOrigin) {
        let (from, to) = {
            let state = self.state.borrow();
            let sel = state.selection;
            (
                state.text.offset_to_position(sel.start()),
                state.text.offset_to_position(sel.end()),
            )
        };
        self.replace_range(text, from, to, origin);
    }

    pub fn insert_at(&self, index: usize, text: &str) {
        let pos = self.pos_from_index(index);
        self.replace_range(text, pos, pos, EditOrigin::User);
    }

    pub fn delete_range(&self, start: usize, end: usize) {
        let from = self.pos_from_index(start);
        let to = self.pos_from_index(end);
        self.replace_range("", from, to, EditOrigin::User);
    }

    /// Report cursor activity without moving, as a click on the caret would.
    pub fn notify_cursor_activity(&self) {
        if self.in_operation() {
            self.state.borrow_mut().cursor_moved = true;
        } else {
            self.emit(&EditorEvent::CursorActivity);
        }
    }

    pub fn focus(&self) {
        let changed = !std::mem::replace(&mut self.state.borrow_mut().focused, true);
        if changed {
            self.emit(&EditorEvent::Focus);
        }
    }

    pub fn blur(&self) {
        let changed = std::mem::replace(&mut self.state.borrow_mut().focused, false);
        if changed {
            self.emit(&EditorEvent::Blur);
        }
    }

    pub fn set_surface_focus(&self, focused: bool) {
        self.state.borrow_mut().surface_focused = focused;
    }

    /// Show a different document without reporting it as an edit.
    pub fn swap_document(&self, text: &str) {
        {
            let mut state = self.state.borrow_mut();
            state.text = EditorRope::from_str(text);
            state.selection = Selection::collapsed(0);
        }
        self.emit(&EditorEvent::DocumentSwapped);
    }

    /// Live decorations, ordered by creation.
    pub fn decorations(&self) -> Vec<(DecorationId, Decoration)> {
        self.state
            .borrow()
            .decorations
            .iter()
            .map(|(id, d)| (*id, d.clone()))
            .collect()
    }
}

impl EditorHost for HeadlessEditor {
    fn value(&self) -> String {
        self.state.borrow().text.to_string()
    }

    fn set_value(&self, text: &str) {
        let end = {
            let state = self.state.borrow();
            state.text.offset_to_position(state.text.len_chars())
        };
        self.replace_range(text, Position::default(), end, EditOrigin::SetValue);
    }

    fn len_chars(&self) -> usize {
        self.state.borrow().text.len_chars()
    }

    fn index_from_pos(&self, pos: Position) -> usize {
        self.state.borrow().text.position_to_offset(pos)
    }

    fn pos_from_index(&self, index: usize) -> Position {
        self.state.borrow().text.offset_to_position(index)
    }

    fn replace_range(&self, text: &str, from: Position, to: Position, origin: EditOrigin) {
        let (start, end) = {
            let state = self.state.borrow();
            let a = state.text.position_to_offset(from);
            let b = state.text.position_to_offset(to);
            (a.min(b), a.max(b))
        };
        if start == end && text.is_empty() {
            return;
        }
        let (from, to) = (self.pos_from_index(start), self.pos_from_index(end));

        self.emit(&EditorEvent::BeforeChange {
            from,
            to,
            origin: origin.clone(),
        });

        self.start_operation();
        {
            let mut state = self.state.borrow_mut();
            let removed = state.text.slice(start..end).unwrap_or_default();
            state.text.replace(start..end, &text);

            let inserted = text.chars().count();
            let sel = state.selection;
            state.selection = Selection::new(
                map_offset(sel.anchor, start, end, inserted),
                map_offset(sel.head, start, end, inserted),
            );
            state.pending_changes.push(ChangeRecord {
                from,
                to,
                removed: split_lines(&removed),
                inserted: split_lines(&text),
                origin,
            });
            state.cursor_moved = true;
        }
        self.end_operation();
    }

    fn start_operation(&self) {
        self.state.borrow_mut().op_depth += 1;
    }

    fn end_operation(&self) {
        let (changes, cursor_moved) = {
            let mut state = self.state.borrow_mut();
            if state.op_depth == 0 {
                tracing::warn!("end_operation without matching start_operation");
                return;
            }
            state.op_depth -= 1;
            if state.op_depth > 0 {
                return;
            }
            (
                std::mem::take(&mut state.pending_changes),
                std::mem::take(&mut state.cursor_moved),
            )
        };

        if cursor_moved {
            self.emit(&EditorEvent::CursorActivity);
        }
        if !changes.is_empty() {
            tracing::trace!(count = changes.len(), "flushing change batch");
            self.emit(&EditorEvent::Changes(changes));
        }
    }

    fn in_operation(&self) -> bool {
        self.state.borrow().op_depth > 0
    }

    fn selection_positions(&self) -> (Position, Position) {
        let state = self.state.borrow();
        (
            state.text.offset_to_position(state.selection.anchor),
            state.text.offset_to_position(state.selection.head),
        )
    }

    fn set_selection(&self, anchor: Position, head: Position, _scroll: bool) {
        let notify = {
            let mut state = self.state.borrow_mut();
            let next = Selection::new(
                state.text.position_to_offset(anchor),
                state.text.position_to_offset(head),
            );
            if next == state.selection {
                return;
            }
            state.selection = next;
            if state.op_depth > 0 {
                state.cursor_moved = true;
                false
            } else {
                true
            }
        };
        if notify {
            self.emit(&EditorEvent::CursorActivity);
        }
    }

    fn has_focus(&self) -> bool {
        self.state.borrow().focused
    }

    fn surface_has_focus(&self) -> bool {
        self.state.borrow().surface_focused
    }

    fn subscribe(&self, listener: EditorListener) -> ListenerId {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
    }

    fn add_decoration(&self, decoration: Decoration) -> DecorationId {
        let id = DecorationId(self.next_decoration.get());
        self.next_decoration.set(id.0 + 1);
        self.state.borrow_mut().decorations.insert(id, decoration);
        id
    }

    fn update_decoration(&self, id: DecorationId, decoration: Decoration) {
        if let Some(slot) = self.state.borrow_mut().decorations.get_mut(&id) {
            *slot = decoration;
        }
    }

    fn clear_decoration(&self, id: DecorationId) {
        self.state.borrow_mut().decorations.remove(&id);
    }
}
