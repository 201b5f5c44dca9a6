//! End-to-end behaviour of a binding between replicas.

use std::cell::RefCell;
use std::rc::Rc;

use weaver_editor_core::{EditOrigin, EditorHost, HeadlessEditor, Position, Selection};
use weaver_editor_crdt::{
    Awareness, BindingOptions, CollabBinding, LoroDoc, Origin, PresenceChange, SharedText,
    UndoHistory,
};

struct Replica {
    text: SharedText,
    host: Rc<HeadlessEditor>,
    binding: CollabBinding<HeadlessEditor>,
}

impl Replica {
    fn new(text: SharedText) -> Self {
        let host = Rc::new(HeadlessEditor::default());
        let binding =
            CollabBinding::new(text.clone(), host.clone(), None, BindingOptions::default());
        Self {
            text,
            host,
            binding,
        }
    }

    fn with_history(text: SharedText, history: &UndoHistory) -> Self {
        let host = Rc::new(HeadlessEditor::default());
        let binding = CollabBinding::new(
            text.clone(),
            host.clone(),
            None,
            BindingOptions {
                history: Some(history.clone()),
                ..Default::default()
            },
        );
        Self {
            text,
            host,
            binding,
        }
    }

    fn fork(&self) -> Self {
        let snapshot = self.text.export_snapshot().unwrap();
        Self::new(SharedText::from_snapshot(&snapshot, "content").unwrap())
    }
}

fn shared(content: &str) -> SharedText {
    let text = SharedText::new(LoroDoc::new(), "content");
    text.transact(&Origin::new("setup"), |txn| txn.insert(0, content))
        .unwrap();
    text
}

fn sync(a: &SharedText, b: &SharedText) {
    if let Some(updates) = a.export_updates_since(&b.version()).unwrap() {
        b.import(&updates).unwrap();
    }
    if let Some(updates) = b.export_updates_since(&a.version()).unwrap() {
        a.import(&updates).unwrap();
    }
}

#[test]
fn test_local_edit_round_trips_to_peer_buffer() {
    let a = Replica::new(shared("first line\nsecond line"));
    let b = a.fork();
    assert_eq!(b.host.value(), a.host.value());

    a.host.replace_range(
        "inserted ",
        Position::new(1, 7),
        Position::new(1, 7),
        EditOrigin::User,
    );
    sync(&a.text, &b.text);

    assert_eq!(a.host.value(), "first line\nsecond inserted line");
    assert_eq!(b.host.value(), a.host.value());
    assert_eq!(b.text.to_string(), a.host.value());
}

#[test]
fn test_remote_insert_keeps_caret_on_its_char() {
    let local = Replica::new(shared("abcdef"));
    let peer = local.fork();
    local.host.set_selection_indices(2, 2);

    peer.text
        .transact(&Origin::new("peer"), |txn| txn.insert(1, "X"))
        .unwrap();
    sync(&peer.text, &local.text);

    assert_eq!(local.host.value(), "aXbcdef");
    assert_eq!(local.host.selection_indices(), Selection::collapsed(3));
}

#[test]
fn test_remote_delete_clamps_caret() {
    let local = Replica::new(shared("abcdefgh"));
    let peer = local.fork();
    local.host.set_selection_indices(5, 5);

    peer.text
        .transact(&Origin::new("peer"), |txn| txn.delete(3, 4))
        .unwrap();
    sync(&peer.text, &local.text);

    assert_eq!(local.host.value(), "abch");
    assert_eq!(local.host.selection_indices(), Selection::collapsed(3));
}

#[test]
fn test_disjoint_edits_in_one_batch() {
    let local = Replica::new(shared("hello world"));
    let peer = local.fork();

    local.host.operation(|| {
        local.host.replace_range(
            "goodbye",
            Position::new(0, 0),
            Position::new(0, 5),
            EditOrigin::User,
        );
        local.host.replace_range(
            "moon",
            Position::new(0, 8),
            Position::new(0, 13),
            EditOrigin::User,
        );
    });
    assert_eq!(local.host.value(), "goodbye moon");
    assert_eq!(local.text.to_string(), "goodbye moon");

    sync(&local.text, &peer.text);
    assert_eq!(peer.host.value(), "goodbye moon");
}

#[test]
fn test_carriage_returns_from_peers_keep_indices_aligned() {
    let local = Replica::new(shared("top\r\n"));
    assert_eq!(local.host.value(), "top\r\n");
    let peer = local.fork();

    peer.text
        .transact(&Origin::new("peer"), |txn| txn.insert(5, "a\r\nb"))
        .unwrap();
    sync(&peer.text, &local.text);
    assert_eq!(local.host.value(), "top\r\na\r\nb");
    assert_eq!(local.host.pos_from_index(8), Position::new(2, 0));

    // Concurrent inserts right after the last "\r\n".
    peer.text
        .transact(&Origin::new("peer"), |txn| txn.insert(9, "Z"))
        .unwrap();
    local.host.insert_at(9, "!");
    assert_eq!(local.text.to_string(), local.host.value());
    sync(&peer.text, &local.text);

    assert_eq!(local.host.value(), local.text.to_string());
    assert_eq!(peer.host.value(), peer.text.to_string());
    assert_eq!(peer.text.to_string(), local.text.to_string());
    assert_eq!(local.text.len(), 11);
}

#[test]
fn test_undo_restores_selection_and_survives_teardown() {
    let text = shared("abc");
    let history = UndoHistory::new(text.clone());
    let host = Rc::new(HeadlessEditor::default());
    let binding = CollabBinding::new(
        text.clone(),
        host.clone(),
        None,
        BindingOptions {
            history: Some(history.clone()),
            ..Default::default()
        },
    );

    host.set_selection_indices(1, 2);
    host.replace_selection("");
    assert_eq!(host.value(), "ac");
    let after = host.selection_indices();
    assert_eq!(after, Selection::collapsed(1));

    assert!(history.undo());
    assert_eq!(host.value(), "abc");
    assert_eq!(host.selection_indices(), Selection::new(1, 2));

    assert!(history.redo());
    assert_eq!(host.value(), "ac");
    assert_eq!(host.selection_indices(), after);

    assert!(history.undo());
    assert_eq!(host.selection_indices(), Selection::new(1, 2));

    binding.destroy();
    assert!(history.redo());
    assert_eq!(text.to_string(), "ac");
    assert!(history.undo());
    assert_eq!(text.to_string(), "abc");
}

#[test]
fn test_redo_restores_selection_from_before_undo() {
    let text = shared("abc");
    let history = UndoHistory::new(text.clone());
    let local = Replica::with_history(text, &history);

    local.host.set_selection_indices(1, 2);
    local.host.replace_selection("");
    assert_eq!(local.host.value(), "ac");

    assert!(local.binding.undo());
    assert_eq!(local.host.selection_indices(), Selection::new(1, 2));

    // Moving the caret in between does not leak into the redo step.
    local.host.set_selection_indices(3, 3);
    assert!(local.binding.redo());
    assert_eq!(local.host.value(), "ac");
    assert_eq!(local.host.selection_indices(), Selection::collapsed(1));

    local.host.set_selection_indices(0, 0);
    assert!(local.binding.undo());
    assert_eq!(local.host.value(), "abc");
    assert_eq!(local.host.selection_indices(), Selection::new(1, 2));
}

#[test]
fn test_undo_spares_peer_text_that_looks_like_ours() {
    let text = shared("abc");
    let history = UndoHistory::new(text.clone());
    let local = Replica::with_history(text, &history);
    local.host.insert_at(3, "x");
    assert_eq!(local.text.to_string(), "abcx");

    // The peer removes our "x" and types an identical one at the front.
    let peer = local.fork();
    peer.text
        .transact(&Origin::new("peer"), |txn| {
            txn.delete(3, 1)?;
            txn.insert(0, "x")
        })
        .unwrap();
    sync(&peer.text, &local.text);
    assert_eq!(local.host.value(), "xabc");

    history.undo();
    assert_eq!(local.text.to_string(), "xabc");
    assert_eq!(local.host.value(), "xabc");
}

#[test]
fn test_undo_leaves_peer_edits_alone() {
    let text = shared("shared");
    let history = UndoHistory::new(text.clone());
    let local = Replica::with_history(text, &history);
    let peer = local.fork();

    local.host.set_selection_indices(6, 6);
    local.host.replace_selection(" notes");
    peer.host.set_selection_indices(0, 0);
    peer.host.replace_selection("our ");
    sync(&local.text, &peer.text);
    assert_eq!(local.host.value(), "our shared notes");

    assert!(local.binding.undo());
    assert_eq!(local.host.value(), "our shared");
    sync(&local.text, &peer.text);
    assert_eq!(peer.host.value(), "our shared");
}

#[test]
fn test_unchanged_cursor_is_broadcast_once() {
    let text = shared("hello");
    let awareness = Awareness::new(text.client_id());
    let host = Rc::new(HeadlessEditor::default());
    let binding = CollabBinding::new(
        text.clone(),
        host.clone(),
        Some(awareness.clone()),
        BindingOptions::default(),
    );
    let broadcasts = Rc::new(RefCell::new(0));
    let sink = broadcasts.clone();
    awareness.on_change(Rc::new(move |_: &PresenceChange| *sink.borrow_mut() += 1));

    host.focus();
    host.set_selection_indices(1, 3);
    binding.flush_timers();
    assert_eq!(*broadcasts.borrow(), 1);

    host.notify_cursor_activity();
    binding.flush_timers();
    host.notify_cursor_activity();
    binding.flush_timers();
    assert_eq!(*broadcasts.borrow(), 1);
}

#[test]
fn test_presence_between_replicas() {
    let a_text = shared("line one\nline two");
    let b_text = SharedText::from_snapshot(&a_text.export_snapshot().unwrap(), "content").unwrap();
    let a_awareness = Awareness::new(a_text.client_id());
    let b_awareness = Awareness::new(b_text.client_id());
    let a_host = Rc::new(HeadlessEditor::default());
    let b_host = Rc::new(HeadlessEditor::default());
    let a_binding = CollabBinding::new(
        a_text.clone(),
        a_host.clone(),
        Some(a_awareness.clone()),
        BindingOptions::default(),
    );
    let b_binding = CollabBinding::new(
        b_text.clone(),
        b_host.clone(),
        Some(b_awareness.clone()),
        BindingOptions::default(),
    );

    a_awareness.set_local_state_field("user", serde_json::json!({ "name": "ana" }));
    a_host.focus();
    a_host.set_selection_indices(5, 12);
    a_binding.flush_timers();

    let update = a_awareness.encode_update(&[a_awareness.client_id()]).unwrap();
    b_awareness.apply_update(&update).unwrap();
    b_binding.flush_timers();

    let cursors = b_binding.remote_cursors();
    assert_eq!(cursors.len(), 1);
    assert_eq!(cursors[0].client, a_awareness.client_id());
    assert_eq!(cursors[0].name, "ana");
    assert_eq!(cursors[0].anchor, Position::new(0, 5));
    assert_eq!(cursors[0].head, Position::new(1, 3));
    assert!(!b_host.decorations().is_empty());
}
