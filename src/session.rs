//! Event-driven dashboard state.
//!
//! All mutable state lives in [`AppState`], which [`Dashboard::update`]
//! consumes and returns. Rendering is a pure read of that state through
//! [`Dashboard::render`].

use log::{debug, info, warn};

use crate::{
    batch::RecordBatch,
    coerce::drop_unparseable_dates,
    config::DashboardConfig,
    consolidate::{MergeOutcome, consolidate},
    error::{Diagnostic, Severity},
    filter::FilterSelection,
    ingest::{Fingerprint, ReadOptions, Upload, read_upload},
    report::{self, View},
    store::Store,
};

/// Remembers the last upload that was processed so that the same file,
/// still attached after a re-render, is not merged again.
///
/// ```text
/// Idle            --upload(f)------------> Consolidated(fp(f))   process
/// Consolidated(x) --upload(f), fp(f) == x -> Consolidated(x)     skip
/// Consolidated(x) --upload(f), fp(f) != x -> Consolidated(fp(f)) process
/// Consolidated(x) --no upload------------> Idle
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UploadGuard {
    #[default]
    Idle,
    Consolidated(Fingerprint),
}

impl UploadGuard {
    /// Record `fingerprint` and report whether it needs processing.
    pub fn observe(&mut self, fingerprint: &Fingerprint) -> bool {
        match self {
            UploadGuard::Consolidated(seen) if seen == fingerprint => false,
            _ => {
                *self = UploadGuard::Consolidated(fingerprint.clone());
                true
            }
        }
    }

    /// The upload was removed; the next one is processed whatever it is.
    pub fn reset(&mut self) {
        *self = UploadGuard::Idle;
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub dataset: RecordBatch,
    pub guard: UploadGuard,
    pub selection: FilterSelection,
    /// Messages produced by the latest event.
    pub diagnostics: Vec<Diagnostic>,
}

impl AppState {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    /// A file is attached to the upload slot.
    Upload(Upload),
    /// The upload slot was emptied.
    UploadCleared,
    /// Restrict `column` to `values`; empty `values` lifts the restriction.
    Select { column: String, values: Vec<String> },
    /// Drop the restriction on one column, or on all of them.
    Unselect { column: Option<String> },
    /// Wipe dataset and store. Ignored unless `confirmed`.
    Clear { confirmed: bool },
}

pub struct Dashboard<S: Store> {
    config: DashboardConfig,
    store: S,
}

impl<S: Store> Dashboard<S> {
    pub fn new(config: DashboardConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Initial state from the store. A store that cannot be read yields an
    /// empty dataset and a warning.
    pub fn startup(&self) -> AppState {
        let mut state = AppState::default();
        match self.store.load() {
            Ok(dataset) => state.dataset = dataset,
            Err(err) => {
                warn!("{err}");
                state.diagnostics.push(Diagnostic::warning(format!(
                    "Stored data could not be loaded, starting empty: {err}"
                )));
            }
        }
        state
    }

    pub fn update(&self, mut state: AppState, event: Event) -> AppState {
        state.diagnostics.clear();
        match event {
            Event::Upload(upload) => {
                let fingerprint = upload.fingerprint();
                if state.guard.observe(&fingerprint) {
                    state = self.ingest(state, &upload);
                } else {
                    debug!(
                        "Upload '{}' ({}) already processed",
                        upload.name,
                        fingerprint.short()
                    );
                }
            }
            Event::UploadCleared => state.guard.reset(),
            Event::Select { column, values } => state.selection.set(&column, values),
            Event::Unselect { column: Some(column) } => state.selection.clear_column(&column),
            Event::Unselect { column: None } => state.selection.clear(),
            Event::Clear { confirmed } => state = self.clear(state, confirmed),
        }
        state
    }

    pub fn render(&self, state: &AppState) -> View {
        report::build_view(
            &self.config,
            &state.dataset,
            &state.selection,
            self.store.size_bytes(),
            &state.diagnostics,
        )
    }

    /// Read, merge, drop undated rows, persist.
    ///
    /// Failure at any stage leaves the previous dataset in place and is
    /// reported through `state.diagnostics`.
    fn ingest(&self, mut state: AppState, upload: &Upload) -> AppState {
        let incoming = match ReadOptions::from_config(&self.config)
            .map_err(|err| format!("{err:#}"))
            .and_then(|options| read_upload(upload, &options).map_err(|err| err.to_string()))
        {
            Ok(batch) => batch,
            Err(message) => {
                warn!("{message}");
                state.diagnostics.push(Diagnostic::error(message));
                return state;
            }
        };

        let existing = std::mem::take(&mut state.dataset);
        let (mut merged, outcome) = consolidate(existing, incoming);
        match outcome {
            MergeOutcome::Rejected { reason } => {
                warn!("Upload '{}' rejected: {reason}", upload.name);
                state.dataset = merged;
                state.diagnostics.push(Diagnostic::warning(format!(
                    "'{}' was not merged: {reason}",
                    upload.name
                )));
                return state;
            }
            MergeOutcome::Merged { rows_added } => {
                info!("Merged {rows_added} row(s) from '{}'", upload.name);
                state.diagnostics.push(Diagnostic::info(format!(
                    "Merged {rows_added} row(s) from '{}'",
                    upload.name
                )));
            }
        }

        let stage = drop_unparseable_dates(&mut merged, &self.config);
        if stage.dropped > 0 {
            state.diagnostics.push(Diagnostic::warning(format!(
                "Removed {} row(s) whose '{}' value is not a valid date",
                stage.dropped,
                stage.column.as_deref().unwrap_or_default()
            )));
        }

        if let Err(err) = self.store.save(&merged) {
            warn!("{err}");
            state.diagnostics.push(Diagnostic::warning(format!(
                "Consolidated data could not be saved: {err}"
            )));
        }
        state.dataset = merged;
        state
    }

    fn clear(&self, mut state: AppState, confirmed: bool) -> AppState {
        if !confirmed {
            state.diagnostics.push(Diagnostic::warning(
                "Clearing all data is irreversible and needs confirmation",
            ));
            return state;
        }
        match self.store.clear() {
            Ok(removed) => debug!("Store cleared (file removed: {removed})"),
            Err(err) => {
                warn!("{err}");
                state.diagnostics.push(Diagnostic::warning(format!(
                    "Stored data could not be removed: {err}"
                )));
            }
        }
        state.dataset = RecordBatch::empty();
        state.selection.clear();
        state.guard.reset();
        info!("All data cleared");
        state
            .diagnostics
            .push(Diagnostic::info("All data cleared"));
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn dashboard() -> Dashboard<MemoryStore> {
        Dashboard::new(DashboardConfig::default(), MemoryStore::new())
    }

    fn csv(name: &str, body: &str) -> Upload {
        Upload::new(name, body.as_bytes().to_vec())
    }

    #[test]
    fn guard_transitions() {
        let a = Fingerprint::of(b"a");
        let b = Fingerprint::of(b"b");
        let mut guard = UploadGuard::default();
        assert!(guard.observe(&a));
        assert!(!guard.observe(&a));
        assert!(guard.observe(&b));
        assert_eq!(guard, UploadGuard::Consolidated(b.clone()));
        guard.reset();
        assert!(guard.observe(&b));
    }

    #[test]
    fn same_upload_twice_is_consolidated_once() {
        let dashboard = dashboard();
        let upload = csv("a.csv", "date,total\n01/03/2024,\"10,50\"\n");
        let state = dashboard.startup();
        let state = dashboard.update(state, Event::Upload(upload.clone()));
        let state = dashboard.update(state, Event::Upload(upload.clone()));
        assert_eq!(state.dataset.row_count(), 1);
        assert_eq!(dashboard.store().load().unwrap().row_count(), 1);

        let state = dashboard.update(state, Event::UploadCleared);
        let state = dashboard.update(state, Event::Upload(upload));
        assert_eq!(state.dataset.row_count(), 2);
    }

    #[test]
    fn bad_upload_keeps_previous_dataset() {
        let dashboard = dashboard();
        let state = dashboard.update(
            dashboard.startup(),
            Event::Upload(csv("a.csv", "date,total\n01/03/2024,1\n")),
        );
        let state = dashboard.update(state, Event::Upload(csv("notes.txt", "hello")));
        assert!(state.has_errors());
        assert_eq!(state.dataset.row_count(), 1);

        let state = dashboard.update(state, Event::Upload(csv("b.csv", "sku\nA\n")));
        assert!(!state.has_errors());
        assert_eq!(state.diagnostics[0].severity, Severity::Warning);
        assert_eq!(state.dataset.row_count(), 1);
    }

    #[test]
    fn undated_rows_are_removed_from_the_stored_dataset() {
        let dashboard = dashboard();
        let state = dashboard.update(
            dashboard.startup(),
            Event::Upload(csv("b.csv", "date,total\nxx,1\n02/03/2024,2\n")),
        );
        assert_eq!(state.dataset.row_count(), 1);
        assert_eq!(dashboard.store().load().unwrap(), state.dataset);
    }

    #[test]
    fn clear_needs_confirmation() {
        let dashboard = dashboard();
        let upload = csv("a.csv", "date,total\n01/03/2024,1\n");
        let state = dashboard.update(dashboard.startup(), Event::Upload(upload.clone()));
        let state = dashboard.update(state, Event::Clear { confirmed: false });
        assert_eq!(state.dataset.row_count(), 1);

        let state = dashboard.update(state, Event::Clear { confirmed: true });
        assert!(state.dataset.is_empty());
        assert_eq!(state.guard, UploadGuard::Idle);
        assert!(dashboard.store().load().unwrap().is_empty());

        let state = dashboard.update(state, Event::Upload(upload));
        assert_eq!(state.dataset.row_count(), 1);
    }

    #[test]
    fn selection_events_update_the_filter() {
        let dashboard = dashboard();
        let state = dashboard.update(
            AppState::default(),
            Event::Select {
                column: "status".into(),
                values: vec!["paid".into()],
            },
        );
        assert!(state.selection.selected("status").is_some());
        let state = dashboard.update(state, Event::Unselect { column: None });
        assert!(state.selection.is_empty());
    }
}
