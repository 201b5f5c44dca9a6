//! Positions that survive concurrent edits.
//!
//! A `RelativePosition` refers to a character of the shared text rather than
//! to an index, so it keeps pointing at the same spot while other replicas
//! insert and delete around it. It is resolved back to an index only at the
//! moment of use.

use loro::ContainerTrait;
use loro::cursor::{Cursor, Side};
use serde_json::Value;
use weaver_editor_core::Selection;

use crate::text::SharedText;

/// Loro cursor with edit-stable equality.
#[derive(Clone, Debug)]
pub struct RelativePosition(Cursor);

impl RelativePosition {
    pub fn cursor(&self) -> &Cursor {
        &self.0
    }

    /// JSON form, as carried in presence payloads.
    pub fn to_json(&self) -> Value {
        // Cursor holds only ids and integers, which always serialize.
        serde_json::to_value(&self.0).unwrap_or(Value::Null)
    }

    /// Parse a value produced by [`to_json`](Self::to_json). Garbage yields `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok().map(Self)
    }
}

impl PartialEq for RelativePosition {
    /// Same referenced element on the same side. The index recorded at
    /// creation time is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id && self.0.container == other.0.container && self.0.side == other.0.side
    }
}

impl Eq for RelativePosition {}

impl SharedText {
    /// Relative position of the gap before the char at `index`. Indices past
    /// the end are clamped.
    pub fn relative_position(&self, index: usize) -> Option<RelativePosition> {
        let index = index.min(self.len());
        self.loro_text()
            .get_cursor(index, Side::default())
            .map(RelativePosition)
    }

    /// Current index of `pos`, or `None` when it does not belong to this text.
    /// A deleted char resolves to where it used to be.
    pub fn resolve(&self, pos: &RelativePosition) -> Option<usize> {
        if pos.0.container != self.loro_text().id() {
            return None;
        }
        let result = self.doc().get_cursor_pos(&pos.0).ok()?;
        Some(result.current.pos.min(self.len()))
    }
}

/// Anchor and head held as relative positions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelativeSelection {
    pub anchor: RelativePosition,
    pub head: RelativePosition,
}

impl RelativeSelection {
    pub fn capture(text: &SharedText, selection: Selection) -> Option<Self> {
        Some(Self {
            anchor: text.relative_position(selection.anchor)?,
            head: text.relative_position(selection.head)?,
        })
    }

    /// Both ends resolved, or `None` if either no longer resolves.
    pub fn resolve(&self, text: &SharedText) -> Option<Selection> {
        Some(Selection::new(
            text.resolve(&self.anchor)?,
            text.resolve(&self.head)?,
        ))
    }
}
