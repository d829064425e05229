use serde::Serialize;

use crate::batch::RecordBatch;

/// Result of merging an upload into the consolidated dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MergeOutcome {
    /// Rows from the incoming batch were appended.
    Merged { rows_added: usize },
    /// Nothing changed; the reason is meant for the user.
    Rejected { reason: String },
}

impl MergeOutcome {
    pub fn is_merged(&self) -> bool {
        matches!(self, MergeOutcome::Merged { .. })
    }
}

/// Merge `incoming` into `existing` on their shared columns.
///
/// An empty `existing` is replaced by `incoming` as-is. Otherwise only the
/// columns both batches have survive, in `existing`'s order, with the
/// existing rows first. Without a single shared column the incoming batch is
/// rejected and `existing` comes back untouched.
///
/// Rows are never deduplicated: consolidating the same batch twice doubles
/// it. Callers guard against re-submission with
/// [`UploadGuard`](crate::session::UploadGuard).
pub fn consolidate(existing: RecordBatch, incoming: RecordBatch) -> (RecordBatch, MergeOutcome) {
    if existing.is_empty() {
        let rows_added = incoming.row_count();
        return (incoming, MergeOutcome::Merged { rows_added });
    }

    let shared = existing
        .columns()
        .iter()
        .filter(|name| incoming.has_column(name))
        .cloned()
        .collect::<Vec<_>>();
    if shared.is_empty() {
        return (
            existing,
            MergeOutcome::Rejected {
                reason: "incompatible columns: the uploaded file shares no column with the existing data"
                    .to_string(),
            },
        );
    }

    let mut merged = if shared.len() == existing.column_count() {
        existing
    } else {
        existing.select(&shared)
    };
    let incoming = incoming.select(&shared);
    let rows_added = incoming.row_count();
    merged.extend_rows(incoming.rows().iter().cloned());
    (merged, MergeOutcome::Merged { rows_added })
}
