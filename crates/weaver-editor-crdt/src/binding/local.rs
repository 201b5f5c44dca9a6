use weaver_editor_core::{ChangeRecord, EditorHost};

use super::BindingInner;
use crate::CrdtError;
use crate::text::TextTxn;

/// Single replaced span turning one string into another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextDiff {
    /// Length of the common prefix, in chars.
    pub index: usize,
    /// Chars removed at `index`.
    pub remove: usize,
    pub insert: String,
}

/// Diff by common prefix and suffix. The suffix never overlaps the prefix.
pub fn simple_diff(before: &str, after: &str) -> TextDiff {
    let a: Vec<char> = before.chars().collect();
    let b: Vec<char> = after.chars().collect();
    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let max_suffix = a.len().min(b.len()) - prefix;
    let suffix = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take(max_suffix)
        .take_while(|(x, y)| x == y)
        .count();
    TextDiff {
        index: prefix,
        remove: a.len() - prefix - suffix,
        insert: b[prefix..b.len() - suffix].iter().collect(),
    }
}

impl<H: EditorHost + 'static> BindingInner<H> {
    /// Write one host change batch into the text as a single transaction.
    pub(super) fn capture_local(&self, records: &[ChangeRecord]) {
        let records: Vec<&ChangeRecord> = records
            .iter()
            .filter(|r| r.origin != self.edit_origin)
            .collect();
        if records.is_empty() {
            tracing::trace!("ignoring echo of remote apply");
            return;
        }

        self.guard.run_exclusive(|| {
            // Bulk inserts get an undo step of their own.
            let history = self
                .history
                .as_ref()
                .filter(|_| records.iter().any(|r| r.origin.is_bulk()));
            if let Some(history) = history {
                history.stop_capturing();
            }

            let result = self.text.transact(&self.origin, |txn| match records.as_slice() {
                [change] => {
                    let start = self.host.index_from_pos(change.from);
                    txn.delete(start, change.removed_len())?;
                    txn.insert(start, &change.inserted_text())
                }
                _ => {
                    tracing::debug!(changes = records.len(), "multi-change batch, writing content diff");
                    self.write_content_diff(txn)
                }
            });
            if let Err(e) = result {
                // The failed write was reverted; bring the text up to the host.
                tracing::warn!(error = %e, "failed to write local change, resyncing from the editor");
                let resynced = self
                    .text
                    .transact(&self.origin, |txn| self.write_content_diff(txn));
                if let Err(e) = resynced {
                    tracing::error!(error = %e, "editor and shared text have diverged");
                }
            }

            if let Some(history) = history {
                history.stop_capturing();
            }
        });
        // A snapshot no history step picked up is stale now.
        self.pending.take();

        self.refresh_remote_carets();
        let settled = self.settle_timer.borrow_mut().flush();
        if settled.is_some() {
            self.emit_cursor_activity();
        }
    }

    /// Replace whatever differs between the text and the host content.
    fn write_content_diff(&self, txn: &TextTxn<'_>) -> Result<(), CrdtError> {
        let diff = simple_diff(&txn.content(), &self.host.value());
        txn.delete(diff.index, diff.remove)?;
        txn.insert(diff.index, &diff.insert)
    }
}
