//! Local selection bookkeeping: the in-flight selection shifted by remote
//! deltas, and the pre-edit snapshot handed to undo history.

use std::cell::RefCell;

use weaver_editor_core::Selection;

use crate::position::RelativeSelection;

/// Selection being carried through one remote delta.
///
/// Held with `anchor <= head` while the delta replays and flipped back by
/// [`finish`](Self::finish). Remote insertions are right-associated at the
/// anchor of a range but left-associated at a caret, so a peer typing exactly
/// where the local user sits does not push the caret forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct InFlightSelection {
    anchor: usize,
    head: usize,
    swapped: bool,
}

impl InFlightSelection {
    pub fn new(selection: Selection) -> Self {
        let swapped = selection.is_backwards();
        Self {
            anchor: selection.start(),
            head: selection.end(),
            swapped,
        }
    }

    pub fn on_insert(&mut self, index: usize, len: usize) {
        if index < self.anchor || (self.anchor < self.head && index == self.anchor) {
            self.anchor += len;
        }
        if index < self.head {
            self.head += len;
        }
    }

    pub fn on_delete(&mut self, index: usize, len: usize) {
        if index < self.anchor {
            self.anchor = self.anchor.saturating_sub(len).max(index);
        }
        if index < self.head {
            self.head = self.head.saturating_sub(len).max(index);
        }
    }

    pub fn finish(self) -> Selection {
        let selection = Selection::new(self.anchor, self.head);
        if self.swapped {
            selection.flipped()
        } else {
            selection
        }
    }
}

/// Single slot holding the selection captured right before a local edit.
#[derive(Debug, Default)]
pub(crate) struct PendingSelection {
    slot: RefCell<Option<RelativeSelection>>,
}

impl PendingSelection {
    /// Replace whatever was pending.
    pub fn arm(&self, selection: RelativeSelection) {
        *self.slot.borrow_mut() = Some(selection);
    }

    pub fn take(&self) -> Option<RelativeSelection> {
        self.slot.borrow_mut().take()
    }

    pub fn is_armed(&self) -> bool {
        self.slot.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay(selection: Selection, f: impl FnOnce(&mut InFlightSelection)) -> Selection {
        let mut sel = InFlightSelection::new(selection);
        f(&mut sel);
        sel.finish()
    }

    #[test]
    fn test_caret_before_insertion_point_stays() {
        assert_eq!(
            replay(Selection::collapsed(2), |s| s.on_insert(1, 1)),
            Selection::collapsed(3)
        );
        // Insertion exactly at the caret does not move it.
        assert_eq!(
            replay(Selection::collapsed(2), |s| s.on_insert(2, 4)),
            Selection::collapsed(2)
        );
    }

    #[test]
    fn test_range_anchor_is_right_associated() {
        // Insert at the start of a forward range: both ends shift.
        assert_eq!(
            replay(Selection::new(2, 5), |s| s.on_insert(2, 3)),
            Selection::new(5, 8)
        );
        // Insert at the end of the range: head stays.
        assert_eq!(
            replay(Selection::new(2, 5), |s| s.on_insert(5, 3)),
            Selection::new(2, 5)
        );
    }

    #[test]
    fn test_backwards_selection_is_restored() {
        assert_eq!(
            replay(Selection::new(5, 2), |s| s.on_insert(0, 1)),
            Selection::new(6, 3)
        );
    }

    #[test]
    fn test_delete_clamps_to_deletion_start() {
        assert_eq!(
            replay(Selection::collapsed(5), |s| s.on_delete(3, 4)),
            Selection::collapsed(3)
        );
        assert_eq!(
            replay(Selection::new(1, 6), |s| s.on_delete(2, 2)),
            Selection::new(1, 4)
        );
        // Deletion after the selection changes nothing.
        assert_eq!(
            replay(Selection::new(1, 2), |s| s.on_delete(2, 3)),
            Selection::new(1, 2)
        );
    }
}
