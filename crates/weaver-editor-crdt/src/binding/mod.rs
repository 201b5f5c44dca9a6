//! Two-way binding between a [`SharedText`] and an [`EditorHost`].
//!
//! Remote deltas are replayed into the host as origin-tagged edits while the
//! local selection is carried along. Host change batches are written back to
//! the text in one transaction per batch. A shared [`ReentrancyGuard`] keeps
//! the two paths from feeding each other. With an [`Awareness`] attached the
//! local selection is published and peer selections are painted through
//! host decorations. With an [`UndoHistory`] attached, undo steps remember
//! and restore the selection the user had before the edit.

mod cursors;
mod guard;
mod local;
mod remote;
mod selection;
mod undo;


use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use web_time::Instant;
use weaver_editor_core::{
    EditOrigin, EditorEvent, EditorHost, KeyCommand, ListenerId, Selection,
};

use crate::config::BindingConfig;
use crate::history::{StackItemAdded, StackItemPopped, UndoHistory};
use crate::presence::{Awareness, ClientId, PresenceChange};
use crate::text::{ObserverId, Origin, SharedText, TextEvent};
use crate::timer::Debouncer;

use cursors::CursorTable;
use selection::PendingSelection;

pub use cursors::{RemoteCursor, SelectionLayout, layout_remote_selection};
pub use guard::ReentrancyGuard;
pub use local::{TextDiff, simple_diff};

/// Called with the local selection once cursor activity has settled.
pub type CursorActivityListener = Rc<dyn Fn(Selection)>;

/// Optional collaborators and tunables for [`CollabBinding::new`].
#[derive(Clone, Default)]
pub struct BindingOptions {
    pub history: Option<UndoHistory>,
    pub config: BindingConfig,
}

#[derive(Default)]
struct Registrations {
    text: Option<ObserverId>,
    host: Option<ListenerId>,
    awareness: Option<ListenerId>,
    item_added: Option<ListenerId>,
    item_popped: Option<ListenerId>,
}

pub(crate) struct BindingInner<H: EditorHost> {
    text: SharedText,
    host: Rc<H>,
    awareness: Option<Awareness>,
    history: Option<UndoHistory>,
    config: BindingConfig,
    origin: Origin,
    /// `origin` as the host sees it on our own edits.
    edit_origin: EditOrigin,
    guard: ReentrancyGuard,
    pending: PendingSelection,
    cursors: RefCell<CursorTable>,
    presence_timer: RefCell<Debouncer<BTreeSet<ClientId>>>,
    settle_timer: RefCell<Debouncer<()>>,
    activity_listeners: RefCell<Vec<(ListenerId, CursorActivityListener)>>,
    next_listener: Cell<u64>,
    registrations: RefCell<Registrations>,
}

/// Keeps one shared text and one editor host in sync.
///
/// Dropping the binding (or calling [`destroy`](Self::destroy)) unregisters
/// everything it attached. The text, host, presence store and history stay
/// usable afterwards.
pub struct CollabBinding<H: EditorHost + 'static> {
    inner: Rc<BindingInner<H>>,
}

impl<H: EditorHost + 'static> CollabBinding<H> {
    /// Attach `host` to `text`. The host is first reset to the text's content.
    pub fn new(
        text: SharedText,
        host: Rc<H>,
        awareness: Option<Awareness>,
        options: BindingOptions,
    ) -> Self {
        let BindingOptions { history, config } = options;
        let origin = Origin::unique(&config.origin_prefix);

        let content = text.to_string();
        if host.value() != content {
            host.set_value(&content);
        }

        let inner = Rc::new(BindingInner {
            edit_origin: EditOrigin::Tagged(origin.as_str().into()),
            presence_timer: RefCell::new(Debouncer::new(config.presence_debounce())),
            settle_timer: RefCell::new(Debouncer::new(config.cursor_settle())),
            text,
            host,
            awareness,
            history,
            config,
            origin,
            guard: ReentrancyGuard::default(),
            pending: PendingSelection::default(),
            cursors: RefCell::new(CursorTable::new()),
            activity_listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
            registrations: RefCell::new(Registrations::default()),
        });
        BindingInner::register(&inner);
        tracing::debug!(origin = %inner.origin, text = %inner.text.id(), "binding attached");
        Self { inner }
    }

    /// Origin tagged on every transaction this binding writes.
    pub fn origin(&self) -> &Origin {
        &self.inner.origin
    }

    pub fn text(&self) -> &SharedText {
        &self.inner.text
    }

    pub fn host(&self) -> &Rc<H> {
        &self.inner.host
    }

    pub fn awareness(&self) -> Option<&Awareness> {
        self.inner.awareness.as_ref()
    }

    pub fn history(&self) -> Option<&UndoHistory> {
        self.inner.history.as_ref()
    }

    /// Undo through the attached history. Returns false without one.
    pub fn undo(&self) -> bool {
        self.inner.run_history(KeyCommand::Undo)
    }

    pub fn redo(&self) -> bool {
        self.inner.run_history(KeyCommand::Redo)
    }

    /// Handle an undo/redo key chord such as `"Ctrl-Z"`. Returns whether the
    /// chord was consumed.
    pub fn handle_key(&self, chord: &str) -> bool {
        if self.inner.history.is_none() {
            return false;
        }
        match KeyCommand::from_chord(chord) {
            Some(command) => {
                self.inner.run_history(command);
                true
            }
            None => false,
        }
    }

    /// Fire timers that are due at `now`.
    pub fn poll(&self, now: Instant) {
        self.inner.poll(now);
    }

    /// Fire all pending timers immediately.
    pub fn flush_timers(&self) {
        self.inner.flush_timers();
    }

    pub fn on_cursor_activity(&self, listener: CursorActivityListener) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.get());
        self.inner.next_listener.set(id.0 + 1);
        self.inner
            .activity_listeners
            .borrow_mut()
            .push((id, listener));
        id
    }

    pub fn off_cursor_activity(&self, id: ListenerId) {
        self.inner
            .activity_listeners
            .borrow_mut()
            .retain(|(lid, _)| *lid != id);
    }

    /// Peers currently painted in the host, by client id.
    pub fn remote_cursors(&self) -> Vec<RemoteCursor> {
        self.inner.remote_cursors()
    }

    /// Detach from every collaborator.
    pub fn destroy(self) {
        drop(self);
    }
}

impl<H: EditorHost + 'static> Drop for CollabBinding<H> {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl<H: EditorHost + 'static> BindingInner<H> {
    fn register(this: &Rc<Self>) {
        let mut registrations = Registrations::default();

        let weak = Rc::downgrade(this);
        registrations.text = Some(this.text.observe(Rc::new(move |event: &TextEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_text_event(event);
            }
        })));

        let weak = Rc::downgrade(this);
        registrations.host = Some(this.host.subscribe(Rc::new(move |event: &EditorEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_editor_event(event);
            }
        })));

        if let Some(awareness) = &this.awareness {
            let weak = Rc::downgrade(this);
            registrations.awareness = Some(awareness.on_change(Rc::new(
                move |change: &PresenceChange| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_presence_change(change);
                    }
                },
            )));
        }

        if let Some(history) = &this.history {
            history.track_origin(&this.origin);
            let weak: Weak<Self> = Rc::downgrade(this);
            registrations.item_added = Some(history.on_item_added(Rc::new(
                move |event: &mut StackItemAdded<'_>| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_item_added(event);
                    }
                },
            )));
            let weak: Weak<Self> = Rc::downgrade(this);
            registrations.item_popped = Some(history.on_item_popped(Rc::new(
                move |event: &StackItemPopped<'_>| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_item_popped(event);
                    }
                },
            )));
        }

        *this.registrations.borrow_mut() = registrations;
    }

    fn teardown(&self) {
        let registrations = std::mem::take(&mut *self.registrations.borrow_mut());
        if let Some(id) = registrations.text {
            self.text.unobserve(id);
        }
        if let Some(id) = registrations.host {
            self.host.unsubscribe(id);
        }
        if let (Some(awareness), Some(id)) = (&self.awareness, registrations.awareness) {
            awareness.off_change(id);
        }
        if let Some(history) = &self.history {
            if let Some(id) = registrations.item_added {
                history.off_item_added(id);
            }
            if let Some(id) = registrations.item_popped {
                history.off_item_popped(id);
            }
            history.untrack_origin(&self.origin);
        }
        self.presence_timer.borrow_mut().cancel();
        self.settle_timer.borrow_mut().cancel();
        self.clear_remote_cursors();
        self.activity_listeners.borrow_mut().clear();
        tracing::debug!(origin = %self.origin, "binding detached");
    }

    fn on_text_event(&self, event: &TextEvent) {
        if event.is_from(&self.origin) {
            tracing::trace!("ignoring echo of own transaction");
            return;
        }
        self.apply_remote(event);
    }

    fn on_editor_event(&self, event: &EditorEvent) {
        match event {
            EditorEvent::BeforeChange { origin, .. } => {
                if *origin != self.edit_origin {
                    self.before_local_change();
                }
            }
            EditorEvent::Changes(records) => self.capture_local(records),
            EditorEvent::CursorActivity => self.schedule_settle(),
            EditorEvent::Focus => {
                if self.awareness.is_some() {
                    self.schedule_settle();
                }
            }
            EditorEvent::Blur | EditorEvent::DocumentSwapped => self.clear_local_cursor(),
        }
    }

    fn poll(&self, now: Instant) {
        let due = self.presence_timer.borrow_mut().poll(now);
        if let Some(clients) = due {
            self.update_remote_selections(clients);
        }
        let settled = self.settle_timer.borrow_mut().poll(now);
        if settled.is_some() {
            self.emit_cursor_activity();
        }
    }

    fn flush_timers(&self) {
        let due = self.presence_timer.borrow_mut().flush();
        if let Some(clients) = due {
            self.update_remote_selections(clients);
        }
        let settled = self.settle_timer.borrow_mut().flush();
        if settled.is_some() {
            self.emit_cursor_activity();
        }
    }
}
