//! weaver-editor-core: Pure Rust editor logic without framework dependencies.
//!
//! This crate provides:
//! - `TextBuffer` trait for text storage abstraction
//! - `EditorRope` - ropey-backed implementation with line/column addressing
//! - `EditorHost` - the editable-buffer widget contract used by collaboration code
//! - `HeadlessEditor` - in-memory `EditorHost`
//! - `UndoManager` and the undo/redo key chords

pub mod headless;
pub mod host;
pub mod text;
pub mod types;
pub mod undo;

pub use headless::HeadlessEditor;
pub use host::{Decoration, DecorationId, EditorEvent, EditorHost, EditorListener, ListenerId};
pub use smol_str::SmolStr;
pub use text::{EditorRope, TextBuffer};
pub use types::{ChangeRecord, EditOrigin, Position, Selection, split_lines};
pub use undo::{KeyCommand, UndoManager};
