use weaver_editor_core::{EditorHost, KeyCommand};

use super::BindingInner;
use crate::history::{StackItemAdded, StackItemPopped};
use crate::position::RelativeSelection;

impl<H: EditorHost + 'static> BindingInner<H> {
    /// Snapshot the selection ahead of a local edit. Skipped while a remote
    /// change is being applied.
    pub(super) fn before_local_change(&self) {
        if self.guard.is_active() {
            return;
        }
        if let Some(selection) = RelativeSelection::capture(&self.text, self.host.selection()) {
            self.pending.arm(selection);
        }
    }

    /// Attach the selection this step should restore. A local edit hands over
    /// the snapshot taken before it; undo and redo hand over the current
    /// selection, which the opposite step returns to.
    pub(super) fn on_item_added(&self, event: &mut StackItemAdded<'_>) {
        let own_edit = event.origin == Some(&self.origin);
        let selection = own_edit
            .then(|| self.pending.take())
            .flatten()
            .or_else(|| RelativeSelection::capture(&self.text, self.host.selection()));
        if let Some(selection) = selection {
            event.item.set_meta(self.origin.clone(), selection);
        }
    }

    pub(super) fn on_item_popped(&self, event: &StackItemPopped<'_>) {
        let Some(selection) = event.selection(&self.origin) else {
            tracing::debug!(kind = ?event.kind, "step carries no selection for this binding");
            return;
        };
        self.host.set_selection(
            self.host.pos_from_index(selection.anchor),
            self.host.pos_from_index(selection.head),
            true,
        );
        self.before_local_change();
    }

    /// Run undo or redo outside any host operation that is open, so the
    /// selection restore is not folded into it.
    pub(super) fn run_history(&self, command: KeyCommand) -> bool {
        let Some(history) = &self.history else {
            return false;
        };
        let reopen = self.host.in_operation();
        if reopen {
            self.host.end_operation();
        }
        let changed = match command {
            KeyCommand::Undo => history.undo(),
            KeyCommand::Redo => history.redo(),
        };
        if reopen {
            self.host.start_operation();
        }
        changed
    }
}
