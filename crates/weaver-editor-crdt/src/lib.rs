//! Loro-backed collaborative editing for line/column editors.
//!
//! This crate provides:
//! - `SharedText`: Loro text handle with ordered delta events and origin-tagged transactions
//! - `RelativePosition` / `RelativeSelection`: positions that survive concurrent edits
//! - `UndoHistory`: origin-scoped undo/redo on Loro's `UndoManager`, with per-step selections
//! - `Awareness`: per-client presence state with a JSON wire codec
//! - `CollabBinding`: keeps a `SharedText` and an `EditorHost` in sync, including
//!   peer cursors and selection-aware undo

mod binding;
mod config;
mod error;
mod history;
mod position;
mod presence;
mod text;
mod timer;

pub use binding::{
    BindingOptions, CollabBinding, CursorActivityListener, ReentrancyGuard, RemoteCursor,
    SelectionLayout, TextDiff, layout_remote_selection, simple_diff,
};
pub use config::{BindingConfig, CollabConfig, HistoryConfig};
pub use error::CrdtError;
pub use history::{
    AddedListener, PoppedListener, StackItem, StackItemAdded, StackItemPopped, StackKind,
    UndoHistory,
};
pub use position::{RelativePosition, RelativeSelection};
pub use presence::{
    Awareness, ClientId, CursorPayload, DEFAULT_CURSOR_COLOR, LocalUser, PeerPresence,
    PresenceChange, PresenceListener, collaborator_color,
};
pub use text::{Delta, ObserverId, Origin, SharedText, TextEvent, TextObserver, TextTxn};
pub use timer::Debouncer;

// Re-export Loro types that consumers need
pub use loro::{LoroDoc, VersionVector};
