use weaver_editor_core::EditorHost;

use super::BindingInner;
use super::selection::InFlightSelection;
use crate::text::{Delta, TextEvent};

impl<H: EditorHost + 'static> BindingInner<H> {
    /// Replay a text delta into the host as one batched operation.
    pub(super) fn apply_remote(&self, event: &TextEvent) {
        let applied = self.guard.run_exclusive(|| {
            let host = &*self.host;
            let mut selection = InFlightSelection::new(host.selection());

            host.operation(|| {
                let mut index = 0;
                for op in &event.delta {
                    match op {
                        Delta::Retain(n) => index += n,
                        Delta::Insert(s) => {
                            let len = s.chars().count();
                            selection.on_insert(index, len);
                            let pos = host.pos_from_index(index);
                            host.replace_range(s, pos, pos, self.edit_origin.clone());
                            index += len;
                        }
                        Delta::Delete(n) => {
                            selection.on_delete(index, *n);
                            let from = host.pos_from_index(index);
                            let to = host.pos_from_index(index + n);
                            host.replace_range("", from, to, self.edit_origin.clone());
                        }
                    }
                }
                self.refresh_remote_carets();
            });

            let selection = selection.finish();
            host.set_selection(
                host.pos_from_index(selection.anchor),
                host.pos_from_index(selection.head),
                false,
            );
        });

        if applied.is_none() {
            tracing::debug!(origin = %event.origin, "text change arrived mid-capture, skipped");
        }
    }
}
