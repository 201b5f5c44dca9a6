//! Undo/redo history for a shared text, backed by Loro's `UndoManager`.
//!
//! Loro records commits made by the local peer and transforms every step
//! against concurrent remote changes, so undo only ever takes back local
//! work. On top of that the history records only commits whose origin is
//! tracked: the manager stays paused, and is resumed just for the duration of
//! a tracked transaction and of undo/redo itself. Untracked commits are still
//! folded into both stacks so later steps transform correctly.
//!
//! Each step carries the selections bindings had before it, one per binding
//! origin. Loro's callbacks have to be `Send`, so they only stage and queue;
//! listeners run on the owning thread once the manager has returned.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::rc::{Rc, Weak};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use loro::{LoroValue, UndoItemMeta, UndoManager as LoroUndoManager, UndoOrRedo};
use weaver_editor_core::{ListenerId, Selection, UndoManager};

use crate::config::HistoryConfig;
use crate::position::RelativeSelection;
use crate::text::{CommitStage, ObserverId, Origin, SharedText};

/// Selections attached to one undo step, keyed by the binding that owns them.
#[derive(Clone, Debug, Default)]
pub struct StackItem {
    selections: Vec<(Origin, RelativeSelection)>,
}

impl StackItem {
    pub fn meta(&self, key: &Origin) -> Option<&RelativeSelection> {
        self.selections
            .iter()
            .find(|(origin, _)| origin == key)
            .map(|(_, selection)| selection)
    }

    pub fn set_meta(&mut self, key: Origin, selection: RelativeSelection) {
        match self.selections.iter_mut().find(|(origin, _)| *origin == key) {
            Some((_, slot)) => *slot = selection,
            None => self.selections.push((key, selection)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Owners go in `value`, with one anchor/head cursor pair per owner.
    fn into_loro(self) -> UndoItemMeta {
        let mut meta = UndoItemMeta::new();
        let mut owners = Vec::with_capacity(self.selections.len());
        for (origin, selection) in self.selections {
            meta.add_cursor(selection.anchor.cursor());
            meta.add_cursor(selection.head.cursor());
            owners.push(LoroValue::from(origin.as_str()));
        }
        meta.set_value(LoroValue::from(owners));
        meta
    }
}

/// Selections from a popped step, as indices into the text right after it
/// was applied.
fn restored_selections(meta: &UndoItemMeta, len: usize) -> Vec<(Origin, Selection)> {
    let LoroValue::List(owners) = &meta.value else {
        return Vec::new();
    };
    if meta.cursors.len() != owners.len() * 2 {
        tracing::debug!(
            owners = owners.len(),
            cursors = meta.cursors.len(),
            "step metadata does not line up, ignoring it"
        );
        return Vec::new();
    }
    owners
        .iter()
        .zip(meta.cursors.chunks(2))
        .filter_map(|(owner, pair)| {
            let LoroValue::String(owner) = owner else {
                return None;
            };
            let selection = Selection::new(pair[0].pos.pos.min(len), pair[1].pos.pos.min(len));
            Some((Origin::new(owner.as_str()), selection))
        })
        .collect()
}

/// Which stack an item was pushed to or popped from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackKind {
    Undo,
    Redo,
}

impl StackKind {
    fn opposite(self) -> Self {
        match self {
            StackKind::Undo => StackKind::Redo,
            StackKind::Redo => StackKind::Undo,
        }
    }
}

impl From<UndoOrRedo> for StackKind {
    fn from(kind: UndoOrRedo) -> Self {
        match kind {
            UndoOrRedo::Undo => StackKind::Undo,
            UndoOrRedo::Redo => StackKind::Redo,
        }
    }
}

/// A step is about to be recorded. Listeners attach their selection.
pub struct StackItemAdded<'a> {
    pub kind: StackKind,
    /// Origin of the transaction being recorded. `None` for the opposite step
    /// pushed by undo or redo.
    pub origin: Option<&'a Origin>,
    pub item: &'a mut StackItem,
}

/// A step was just applied by undo or redo.
pub struct StackItemPopped<'a> {
    pub kind: StackKind,
    selections: &'a [(Origin, Selection)],
}

impl StackItemPopped<'_> {
    /// Selection stored by `key`, mapped onto the current text.
    pub fn selection(&self, key: &Origin) -> Option<Selection> {
        self.selections
            .iter()
            .find(|(origin, _)| origin == key)
            .map(|(_, selection)| *selection)
    }
}

pub type AddedListener = Rc<dyn Fn(&mut StackItemAdded<'_>)>;
pub type PoppedListener = Rc<dyn Fn(&StackItemPopped<'_>)>;

/// What Loro's callbacks hand over.
#[derive(Default)]
struct Exchange {
    /// Metadata for the next step Loro pushes.
    staged: Option<UndoItemMeta>,
    popped: VecDeque<(StackKind, UndoItemMeta)>,
}

type SharedExchange = Arc<Mutex<Exchange>>;

fn lock(exchange: &SharedExchange) -> MutexGuard<'_, Exchange> {
    exchange.lock().unwrap_or_else(PoisonError::into_inner)
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

struct HistoryInner {
    text: SharedText,
    origin: Origin,
    manager: RefCell<LoroUndoManager>,
    exchange: SharedExchange,
    tracked: RefCell<HashSet<Origin>>,
    capture_timeout: Cell<Duration>,
    /// The next tracked transaction starts a step of its own.
    split_next: Cell<bool>,
    /// A tracked transaction is open and the manager is recording.
    recording: Cell<bool>,
    /// An undo or redo is running.
    busy: Cell<bool>,
    added: RefCell<Vec<(ListenerId, AddedListener)>>,
    popped: RefCell<Vec<(ListenerId, PoppedListener)>>,
    next_listener: Cell<u64>,
    commit_hook: Cell<Option<ObserverId>>,
}

impl Drop for HistoryInner {
    fn drop(&mut self) {
        if let Some(id) = self.commit_hook.take() {
            self.text.off_commit(id);
        }
    }
}

/// Shared handle to the undo history of one text.
#[derive(Clone)]
pub struct UndoHistory {
    inner: Rc<HistoryInner>,
}

impl UndoHistory {
    pub fn new(text: SharedText) -> Self {
        Self::with_config(text, &HistoryConfig::default())
    }

    pub fn with_config(text: SharedText, config: &HistoryConfig) -> Self {
        let exchange = SharedExchange::default();
        let mut manager = LoroUndoManager::new(text.doc());
        manager.set_max_undo_steps(config.max_steps);
        manager.set_merge_interval(millis(config.capture_timeout()));

        let sink = exchange.clone();
        manager.set_on_push(Some(Box::new(move |_kind, _span, _event| {
            lock(&sink).staged.take().unwrap_or_default()
        })));
        let sink = exchange.clone();
        manager.set_on_pop(Some(Box::new(move |kind, _span, meta| {
            lock(&sink).popped.push_back((kind.into(), meta));
        })));
        manager.pause();

        let inner = Rc::new(HistoryInner {
            text: text.clone(),
            origin: Origin::unique("weaver-history"),
            manager: RefCell::new(manager),
            exchange,
            tracked: RefCell::new(HashSet::new()),
            capture_timeout: Cell::new(config.capture_timeout()),
            split_next: Cell::new(false),
            recording: Cell::new(false),
            busy: Cell::new(false),
            added: RefCell::new(Vec::new()),
            popped: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
            commit_hook: Cell::new(None),
        });

        let weak: Weak<HistoryInner> = Rc::downgrade(&inner);
        let id = text.on_commit(Rc::new(move |origin: &Origin, stage: CommitStage| {
            if let Some(inner) = weak.upgrade() {
                UndoHistory { inner }.on_commit(origin, stage);
            }
        }));
        inner.commit_hook.set(Some(id));
        Self { inner }
    }

    /// Origin tagged on commits made by undo and redo.
    pub fn origin(&self) -> &Origin {
        &self.inner.origin
    }

    pub fn text(&self) -> &SharedText {
        &self.inner.text
    }

    pub fn track_origin(&self, origin: &Origin) {
        self.inner.tracked.borrow_mut().insert(origin.clone());
    }

    pub fn untrack_origin(&self, origin: &Origin) {
        self.inner.tracked.borrow_mut().remove(origin);
    }

    pub fn is_tracking(&self, origin: &Origin) -> bool {
        self.inner.tracked.borrow().contains(origin)
    }

    /// The next tracked change starts a new step instead of merging.
    pub fn stop_capturing(&self) {
        self.inner.split_next.set(true);
    }

    /// Tracked changes within `timeout` of the start of the current step
    /// merge into it.
    pub fn set_capture_timeout(&self, timeout: Duration) {
        self.inner.capture_timeout.set(timeout);
        self.inner
            .manager
            .borrow_mut()
            .set_merge_interval(millis(timeout));
    }

    pub fn can_undo(&self) -> bool {
        self.inner.manager.borrow().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.inner.manager.borrow().can_redo()
    }

    pub fn undo_depth(&self) -> usize {
        self.inner.manager.borrow().undo_count()
    }

    pub fn redo_depth(&self) -> usize {
        self.inner.manager.borrow().redo_count()
    }

    pub fn clear(&self) {
        self.inner.manager.borrow().clear();
    }

    /// Revert the most recent step. Returns false if nothing changed.
    pub fn undo(&self) -> bool {
        self.perform(StackKind::Undo)
    }

    /// Reapply the most recently undone step. Returns false if nothing changed.
    pub fn redo(&self) -> bool {
        self.perform(StackKind::Redo)
    }

    pub fn on_item_added(&self, listener: AddedListener) -> ListenerId {
        let id = self.next_listener_id();
        self.inner.added.borrow_mut().push((id, listener));
        id
    }

    pub fn off_item_added(&self, id: ListenerId) {
        self.inner.added.borrow_mut().retain(|(lid, _)| *lid != id);
    }

    pub fn on_item_popped(&self, listener: PoppedListener) -> ListenerId {
        let id = self.next_listener_id();
        self.inner.popped.borrow_mut().push((id, listener));
        id
    }

    pub fn off_item_popped(&self, id: ListenerId) {
        self.inner.popped.borrow_mut().retain(|(lid, _)| *lid != id);
    }

    fn next_listener_id(&self) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.get());
        self.inner.next_listener.set(id.0 + 1);
        id
    }

    fn on_commit(&self, origin: &Origin, stage: CommitStage) {
        match stage {
            CommitStage::Begin => {
                if self.inner.busy.get() || !self.is_tracking(origin) {
                    return;
                }
                let mut item = StackItem::default();
                self.emit_added(StackKind::Undo, Some(origin), &mut item);
                lock(&self.inner.exchange).staged = Some(item.into_loro());

                let mut manager = self.inner.manager.borrow_mut();
                if self.inner.split_next.replace(false) {
                    manager.set_merge_interval(0);
                }
                manager.resume();
                self.inner.recording.set(true);
            }
            // The reverting commit of a failed transaction is not a step.
            CommitStage::Abort => self.stop_recording(),
            CommitStage::End => self.stop_recording(),
        }
    }

    fn stop_recording(&self) {
        if !self.inner.recording.replace(false) {
            return;
        }
        let mut manager = self.inner.manager.borrow_mut();
        manager.pause();
        manager.set_merge_interval(millis(self.inner.capture_timeout.get()));
        lock(&self.inner.exchange).staged = None;
    }

    fn perform(&self, kind: StackKind) -> bool {
        if self.inner.busy.replace(true) {
            tracing::debug!(?kind, "undo/redo requested while one is being applied");
            return false;
        }

        // Selections to restore if this step is taken back again.
        let mut item = StackItem::default();
        self.emit_added(kind.opposite(), None, &mut item);
        lock(&self.inner.exchange).staged = Some(item.into_loro());

        let result = {
            let mut manager = self.inner.manager.borrow_mut();
            self.inner
                .text
                .doc()
                .set_next_commit_origin(self.inner.origin.as_str());
            manager.resume();
            let result = match kind {
                StackKind::Undo => manager.undo(),
                StackKind::Redo => manager.redo(),
            };
            manager.pause();
            result
        };
        let popped = {
            let mut exchange = lock(&self.inner.exchange);
            exchange.staged = None;
            std::mem::take(&mut exchange.popped)
        };

        // Observers see the change before listeners restore selections.
        self.inner.text.flush();
        let len = self.inner.text.len();
        for (kind, meta) in popped {
            let selections = restored_selections(&meta, len);
            self.emit_popped(kind, &selections);
        }
        self.inner.busy.set(false);

        match result {
            Ok(changed) => changed,
            Err(e) => {
                tracing::warn!(?kind, error = %e, "undo manager failed");
                false
            }
        }
    }

    fn emit_added(&self, kind: StackKind, origin: Option<&Origin>, item: &mut StackItem) {
        let listeners: Vec<AddedListener> = self
            .inner
            .added
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&mut StackItemAdded { kind, origin, item });
        }
    }

    fn emit_popped(&self, kind: StackKind, selections: &[(Origin, Selection)]) {
        let listeners: Vec<PoppedListener> = self
            .inner
            .popped
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&StackItemPopped { kind, selections });
        }
    }
}

impl UndoManager for UndoHistory {
    fn can_undo(&self) -> bool {
        UndoHistory::can_undo(self)
    }

    fn can_redo(&self) -> bool {
        UndoHistory::can_redo(self)
    }

    fn undo(&mut self) -> bool {
        UndoHistory::undo(self)
    }

    fn redo(&mut self) -> bool {
        UndoHistory::redo(self)
    }

    fn clear_history(&mut self) {
        self.clear();
    }
}
