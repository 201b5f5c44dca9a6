//! Shared CRDT text handle.
//!
//! `SharedText` wraps a `LoroText` inside its `LoroDoc` and turns Loro's diff
//! events into ordered retain/insert/delete deltas delivered to observers on
//! the owning thread. Loro invokes subscribers from inside commit and import,
//! so the subscriber only queues; observers run once the commit or import has
//! returned and may freely read or write the document again.
//!
//! A transaction is all or nothing: if its closure fails, the edits it made
//! are reverted before the commit.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use loro::event::{Diff, DiffEvent};
use loro::{ContainerTrait, ExportMode, LoroDoc, LoroText, Subscription, TextDelta, VersionVector};
use smol_str::{SmolStr, ToSmolStr};
use weaver_editor_core::{EditorRope, TextBuffer};

use crate::CrdtError;

/// Tag attached to a transaction so observers can attribute its changes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Origin(SmolStr);

impl Origin {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    /// A process-unique origin, `"{prefix}#{n}"`.
    pub fn unique(prefix: &str) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        Self(smol_str::format_smolstr!("{prefix}#{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One run of a text change, in chars.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delta {
    Retain(usize),
    Insert(SmolStr),
    Delete(usize),
}

/// A change to the shared text as seen by observers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextEvent {
    /// Origin of the commit that produced the change. Empty for imports.
    pub origin: SmolStr,
    pub delta: Vec<Delta>,
    /// Text removed by each `Delete` run, in order.
    pub removed: Vec<SmolStr>,
}

impl TextEvent {
    pub fn is_from(&self, origin: &Origin) -> bool {
        self.origin == origin.as_str()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub type TextObserver = Rc<dyn Fn(&TextEvent)>;

/// Where a [`SharedText::transact`] call is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommitStage {
    /// Before the closure runs. The text is still unchanged.
    Begin,
    /// The closure failed. Its edits are about to be reverted and committed.
    Abort,
    /// After the commit, before observers are notified.
    End,
}

pub(crate) type CommitHook = Rc<dyn Fn(&Origin, CommitStage)>;

struct RawChange {
    origin: SmolStr,
    delta: Vec<Delta>,
}

type ChangeQueue = Arc<Mutex<VecDeque<RawChange>>>;

struct Inner {
    doc: LoroDoc,
    text: LoroText,
    queue: ChangeQueue,
    /// Mirror of the text as of the last dispatched event, for removed-text lookups.
    shadow: RefCell<EditorRope>,
    observers: RefCell<Vec<(ObserverId, TextObserver)>>,
    commit_hooks: RefCell<Vec<(ObserverId, CommitHook)>>,
    next_observer: Cell<u64>,
    flushing: Cell<bool>,
    _subscription: Subscription,
}

/// Cheaply clonable handle to one text container of a Loro document.
///
/// All offsets are in Unicode scalar values.
#[derive(Clone)]
pub struct SharedText {
    inner: Rc<Inner>,
}

enum Applied {
    Inserted { index: usize, len: usize },
    Deleted { index: usize, text: String },
}

/// Edits made inside [`SharedText::transact`].
pub struct TextTxn<'a> {
    text: &'a LoroText,
    applied: RefCell<Vec<Applied>>,
}

impl<'a> TextTxn<'a> {
    fn new(text: &'a LoroText) -> Self {
        Self {
            text,
            applied: RefCell::new(Vec::new()),
        }
    }

    pub fn insert(&self, index: usize, text: &str) -> Result<(), CrdtError> {
        if text.is_empty() {
            return Ok(());
        }
        self.text.insert(index, text)?;
        self.applied.borrow_mut().push(Applied::Inserted {
            index,
            len: text.chars().count(),
        });
        Ok(())
    }

    pub fn delete(&self, index: usize, len: usize) -> Result<(), CrdtError> {
        if len == 0 {
            return Ok(());
        }
        let removed = self.text.slice(index, index + len)?;
        self.text.delete(index, len)?;
        self.applied.borrow_mut().push(Applied::Deleted {
            index,
            text: removed,
        });
        Ok(())
    }

    /// Current length including edits made so far in this transaction.
    pub fn len(&self) -> usize {
        self.text.len_unicode()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slice(&self, range: Range<usize>) -> Option<String> {
        if range.start > range.end || range.end > self.len() {
            return None;
        }
        self.text.slice(range.start, range.end).ok()
    }

    pub fn content(&self) -> String {
        self.text.to_string()
    }

    fn has_edits(&self) -> bool {
        !self.applied.borrow().is_empty()
    }

    /// Take back every edit made so far, newest first.
    fn revert(&self) -> Result<(), CrdtError> {
        let applied = std::mem::take(&mut *self.applied.borrow_mut());
        for edit in applied.iter().rev() {
            match edit {
                Applied::Inserted { index, len } => self.text.delete(*index, *len)?,
                Applied::Deleted { index, text } => self.text.insert(*index, text)?,
            }
        }
        Ok(())
    }
}

fn convert_delta(ops: &[TextDelta]) -> Vec<Delta> {
    ops.iter()
        .filter_map(|op| match op {
            TextDelta::Retain { retain, .. } if *retain > 0 => Some(Delta::Retain(*retain)),
            TextDelta::Insert { insert, .. } if !insert.is_empty() => {
                Some(Delta::Insert(insert.to_smolstr()))
            }
            TextDelta::Delete { delete } if *delete > 0 => Some(Delta::Delete(*delete)),
            _ => None,
        })
        .collect()
}

impl SharedText {
    /// Bind to the text container `name` of `doc`.
    pub fn new(doc: LoroDoc, name: &str) -> Self {
        let text = doc.get_text(name);
        let queue: ChangeQueue = Arc::new(Mutex::new(VecDeque::new()));

        let sink = queue.clone();
        let subscription = doc.subscribe(
            &text.id(),
            Arc::new(move |event: DiffEvent<'_>| {
                let origin = event.origin.to_smolstr();
                let mut queue = sink.lock().unwrap_or_else(PoisonError::into_inner);
                for container in event.events.iter() {
                    if let Diff::Text(ops) = &container.diff {
                        let delta = convert_delta(ops);
                        if !delta.is_empty() {
                            queue.push_back(RawChange {
                                origin: origin.clone(),
                                delta,
                            });
                        }
                    }
                }
            }),
        );

        let shadow = EditorRope::from_str(&text.to_string());
        Self {
            inner: Rc::new(Inner {
                doc,
                text,
                queue,
                shadow: RefCell::new(shadow),
                observers: RefCell::new(Vec::new()),
                commit_hooks: RefCell::new(Vec::new()),
                next_observer: Cell::new(0),
                flushing: Cell::new(false),
                _subscription: subscription,
            }),
        }
    }

    /// Create a fresh document from a Loro snapshot.
    pub fn from_snapshot(snapshot: &[u8], name: &str) -> Result<Self, CrdtError> {
        let doc = LoroDoc::new();
        doc.import(snapshot)
            .map_err(|e| CrdtError::Import(e.to_string()))?;
        Ok(Self::new(doc, name))
    }

    /// Get the underlying Loro document.
    pub fn doc(&self) -> &LoroDoc {
        &self.inner.doc
    }

    pub(crate) fn loro_text(&self) -> &LoroText {
        &self.inner.text
    }

    /// Identifier of the local replica.
    pub fn client_id(&self) -> u64 {
        self.inner.doc.peer_id()
    }

    /// Identifier of the text container, stable across replicas.
    pub fn id(&self) -> SmolStr {
        self.inner.text.id().to_smolstr()
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        self.inner.text.len_unicode()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slice(&self, range: Range<usize>) -> Option<SmolStr> {
        if range.start > range.end || range.end > self.len() {
            return None;
        }
        self.inner
            .text
            .slice(range.start, range.end)
            .ok()
            .map(|s| s.to_smolstr())
    }

    /// Apply edits as one commit tagged with `origin`, then notify observers.
    ///
    /// A transaction that changes nothing commits nothing. When `f` fails,
    /// whatever it already applied is reverted, so the text content is left
    /// as it was.
    pub fn transact<R>(
        &self,
        origin: &Origin,
        f: impl FnOnce(&TextTxn<'_>) -> Result<R, CrdtError>,
    ) -> Result<R, CrdtError> {
        let txn = TextTxn::new(&self.inner.text);
        self.run_commit_hooks(origin, CommitStage::Begin);
        let result = f(&txn);
        if txn.has_edits() {
            if let Err(e) = &result {
                tracing::debug!(%origin, error = %e, "transaction failed, reverting its edits");
                self.run_commit_hooks(origin, CommitStage::Abort);
                if let Err(e) = txn.revert() {
                    tracing::error!(%origin, error = %e, "failed to revert transaction");
                }
            }
            self.inner.doc.set_next_commit_origin(origin.as_str());
            self.inner.doc.commit();
        }
        self.run_commit_hooks(origin, CommitStage::End);
        self.flush();
        result
    }

    pub(crate) fn on_commit(&self, hook: CommitHook) -> ObserverId {
        let id = ObserverId(self.inner.next_observer.get());
        self.inner.next_observer.set(id.0 + 1);
        self.inner.commit_hooks.borrow_mut().push((id, hook));
        id
    }

    pub(crate) fn off_commit(&self, id: ObserverId) {
        self.inner
            .commit_hooks
            .borrow_mut()
            .retain(|(hid, _)| *hid != id);
    }

    fn run_commit_hooks(&self, origin: &Origin, stage: CommitStage) {
        let hooks: Vec<CommitHook> = self
            .inner
            .commit_hooks
            .borrow()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for hook in hooks {
            hook(origin, stage);
        }
    }

    pub fn observe(&self, observer: TextObserver) -> ObserverId {
        let id = ObserverId(self.inner.next_observer.get());
        self.inner.next_observer.set(id.0 + 1);
        self.inner.observers.borrow_mut().push((id, observer));
        id
    }

    pub fn unobserve(&self, id: ObserverId) {
        self.inner.observers.borrow_mut().retain(|(oid, _)| *oid != id);
    }

    /// Get current version vector.
    pub fn version(&self) -> VersionVector {
        self.inner.doc.oplog_vv()
    }

    /// Export full snapshot.
    pub fn export_snapshot(&self) -> Result<Vec<u8>, CrdtError> {
        self.inner
            .doc
            .export(ExportMode::Snapshot)
            .map_err(|e| CrdtError::Export(e.to_string()))
    }

    /// Export updates since given version. `None` when there is nothing new.
    pub fn export_updates_since(
        &self,
        version: &VersionVector,
    ) -> Result<Option<Vec<u8>>, CrdtError> {
        if *version == self.inner.doc.oplog_vv() {
            return Ok(None);
        }
        let updates = self
            .inner
            .doc
            .export(ExportMode::Updates {
                from: Cow::Owned(version.clone()),
            })
            .map_err(|e| CrdtError::Export(e.to_string()))?;
        Ok((!updates.is_empty()).then_some(updates))
    }

    /// Import remote changes and notify observers.
    pub fn import(&self, data: &[u8]) -> Result<(), CrdtError> {
        let imported = self
            .inner
            .doc
            .import(data)
            .map(|_| ())
            .map_err(|e| CrdtError::Import(e.to_string()));
        self.flush();
        imported
    }

    /// Deliver queued changes. Re-entrant calls leave the work to the outer loop.
    pub(crate) fn flush(&self) {
        if self.inner.flushing.replace(true) {
            return;
        }
        loop {
            let next = self
                .inner
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(raw) = next else { break };
            let event = self.track_removed(raw);
            tracing::trace!(origin = %event.origin, ops = event.delta.len(), "text changed");

            let observers: Vec<TextObserver> = self
                .inner
                .observers
                .borrow()
                .iter()
                .map(|(_, o)| o.clone())
                .collect();
            for observer in observers {
                observer(&event);
            }
        }
        self.inner.flushing.set(false);
        self.resync_shadow();
    }

    fn track_removed(&self, raw: RawChange) -> TextEvent {
        let mut shadow = self.inner.shadow.borrow_mut();
        let mut index = 0;
        let mut removed = Vec::new();
        for op in &raw.delta {
            match op {
                Delta::Retain(n) => index += n,
                Delta::Insert(s) => {
                    let at = index.min(shadow.len_chars());
                    shadow.insert(at, s);
                    index += s.chars().count();
                }
                Delta::Delete(n) => {
                    let end = (index + n).min(shadow.len_chars());
                    let start = index.min(end);
                    removed.push(shadow.slice(start..end).unwrap_or_default());
                    shadow.delete(start..end);
                }
            }
        }
        TextEvent {
            origin: raw.origin,
            delta: raw.delta,
            removed,
        }
    }

    fn resync_shadow(&self) {
        let mut shadow = self.inner.shadow.borrow_mut();
        let expected = self.inner.text.len_unicode();
        if shadow.len_chars() != expected {
            tracing::warn!(
                shadow = shadow.len_chars(),
                expected,
                "removed-text mirror drifted, resyncing"
            );
            *shadow = EditorRope::from_str(&self.inner.text.to_string());
        }
    }
}

impl fmt::Display for SharedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.text.to_string())
    }
}

impl fmt::Debug for SharedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedText")
            .field("id", &self.id())
            .field("len", &self.len())
            .finish()
    }
}
