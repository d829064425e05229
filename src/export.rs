use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use log::info;

use crate::{
    batch::RecordBatch,
    cli::ExportArgs,
    coerce::coerce,
    config::DashboardConfig,
    filter::{FilterSelection, filter_rows},
    io_utils,
};

/// Default download name, e.g. `filtered_20240301_142500.csv`.
pub fn default_file_name(now: NaiveDateTime) -> String {
    format!("filtered_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

/// Rows of `dataset` matching `selection`, typed then rendered back to text.
pub fn filtered_batch(
    config: &DashboardConfig,
    dataset: &RecordBatch,
    selection: &FilterSelection,
) -> RecordBatch {
    let typed = coerce(dataset.clone(), config).table;
    filter_rows(&typed, selection).to_record_batch()
}

/// The filtered subset as CSV text. Touches neither state nor store.
pub fn export_csv(
    config: &DashboardConfig,
    dataset: &RecordBatch,
    selection: &FilterSelection,
) -> Result<String> {
    let batch = filtered_batch(config, dataset, selection);
    let mut buffer = Vec::new();
    batch.write_csv(&mut buffer, config.delimiter()?)?;
    String::from_utf8(buffer).context("Export produced invalid UTF-8")
}

/// Write the filtered subset to `path`, or stdout for `None`/`-`.
pub fn write_export(
    config: &DashboardConfig,
    dataset: &RecordBatch,
    selection: &FilterSelection,
    path: Option<&Path>,
) -> Result<usize> {
    let batch = filtered_batch(config, dataset, selection);
    let writer = io_utils::open_output(path)?;
    batch
        .write_csv(writer, config.delimiter()?)
        .with_context(|| match path {
            Some(p) => format!("Writing export to {p:?}"),
            None => "Writing export to stdout".to_string(),
        })?;
    Ok(batch.row_count())
}

pub fn execute(args: &ExportArgs) -> Result<()> {
    let dashboard = crate::open_dashboard(&args.store)?;
    let state = dashboard.startup();
    let selection = args.filters.selection(dashboard.config())?;
    let path: Option<PathBuf> = match (&args.output, args.default_name) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(PathBuf::from(default_file_name(Local::now().naive_local()))),
        (None, false) => None,
    };
    let rows = write_export(dashboard.config(), &state.dataset, &selection, path.as_deref())?;
    match path.as_deref() {
        Some(p) if !io_utils::is_dash(p) => info!("Exported {rows} row(s) to {p:?}"),
        _ => info!("Exported {rows} row(s) to stdout"),
    }
    Ok(())
}
