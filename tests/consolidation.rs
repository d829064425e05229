mod common;

use std::str::FromStr;

use proptest::prelude::*;
use rust_decimal::Decimal;
use sales_dashboard::{
    aggregate::{AggregateOp, aggregate, column_total, percentage},
    batch::RecordBatch,
    coerce::{coerce, drop_unparseable_dates},
    config::DashboardConfig,
    consolidate::{MergeOutcome, consolidate},
    filter::{FilterSelection, filter_rows},
    ingest::{ReadOptions, Upload, read_upload},
    session::{Dashboard, Event},
    store::{CsvStore, MemoryStore, Store},
};

use common::{APRIL_CSV, MARCH_CSV, TestWorkspace};

fn batch(columns: &[String], rows: Vec<Vec<String>>) -> RecordBatch {
    RecordBatch::new(columns.to_vec(), rows)
}

fn column_set() -> impl Strategy<Value = Vec<String>> {
    proptest::sample::subsequence(
        vec!["date", "total", "size", "status", "state", "fee"],
        1..=6,
    )
    .prop_map(|names| names.into_iter().map(str::to_string).collect())
}

fn rows_for(width: usize) -> impl Strategy<Value = Vec<Vec<String>>> {
    proptest::collection::vec(proptest::collection::vec("[a-z0-9]{0,4}", width), 1..8)
}

fn sized_batch() -> impl Strategy<Value = RecordBatch> {
    column_set().prop_flat_map(|columns| {
        let width = columns.len();
        rows_for(width).prop_map(move |rows| batch(&columns, rows))
    })
}

proptest! {
    #[test]
    fn merge_adds_rows_and_keeps_shared_columns(existing in sized_batch(), incoming in sized_batch()) {
        let shared = existing
            .columns()
            .iter()
            .filter(|c| incoming.has_column(c))
            .cloned()
            .collect::<Vec<_>>();
        let (existing_rows, incoming_rows) = (existing.row_count(), incoming.row_count());
        let original = existing.clone();
        let (merged, outcome) = consolidate(existing, incoming);
        if shared.is_empty() {
            prop_assert_eq!(merged, original);
            let rejected = matches!(outcome, MergeOutcome::Rejected { .. });
            prop_assert!(rejected);
        } else {
            prop_assert_eq!(merged.row_count(), existing_rows + incoming_rows);
            prop_assert_eq!(merged.columns(), shared.as_slice());
            prop_assert_eq!(outcome, MergeOutcome::Merged { rows_added: incoming_rows });
        }
    }

    #[test]
    fn group_sums_add_up_to_the_column_total(
        cells in proptest::collection::vec(("[ABC]?", -1000i64..1000), 0..40)
    ) {
        let rows = cells
            .iter()
            .map(|(size, cents)| vec![size.clone(), format!("{},{:02}", cents / 100, (cents % 100).abs())])
            .collect::<Vec<_>>();
        let raw = batch(&["size".to_string(), "total".to_string()], rows);
        let table = coerce(raw, &DashboardConfig::default()).table;
        let grouped = aggregate(&table, "size", "total", AggregateOp::Sum).unwrap();
        prop_assert_eq!(grouped.total(), column_total(&table, "total"));
        prop_assert_eq!(filter_rows(&table, &FilterSelection::new()), table);
    }

    #[test]
    fn percentage_of_zero_is_zero(part in -1_000_000i64..1_000_000) {
        prop_assert_eq!(percentage(Decimal::from(part), Decimal::ZERO), 0.0);
    }
}

#[test]
fn batch_a_into_empty_dataset_then_batch_b_drops_invalid_date() {
    let config = DashboardConfig::default();
    let options = ReadOptions::from_config(&config).expect("read options");

    let a = read_upload(
        &Upload::new("a.csv", "date,total\n01/03/2024,\"10,50\"\n"),
        &options,
    )
    .expect("batch a");
    let (dataset, outcome) = consolidate(RecordBatch::empty(), a);
    assert!(outcome.is_merged());
    assert_eq!(dataset.row_count(), 1);
    let typed = coerce(dataset.clone(), &config).table;
    assert_eq!(
        column_total(&typed, "total"),
        Some(Decimal::from_str("10.50").unwrap())
    );

    let b = read_upload(
        &Upload::new("b.csv", "date,total\nnot a date,\"1,00\"\n05/03/2024,\"2,00\"\n"),
        &options,
    )
    .expect("batch b");
    let (mut dataset, _) = consolidate(dataset, b);
    let stage = drop_unparseable_dates(&mut dataset, &config);
    assert_eq!(stage.dropped, 1);
    assert_eq!(dataset.row_count(), 2);
    assert!(dataset.rows().iter().all(|row| row[0] != "not a date"));
}

#[test]
fn dashboard_over_csv_store_survives_a_restart() {
    let workspace = TestWorkspace::new();
    let config = DashboardConfig::default();
    let store = CsvStore::new(workspace.store_path());
    let dashboard = Dashboard::new(config.clone(), store);

    let state = dashboard.startup();
    let state = dashboard.update(state, Event::Upload(Upload::new("march.csv", MARCH_CSV)));
    let state = dashboard.update(state, Event::Upload(Upload::new("april.csv", APRIL_CSV)));
    assert_eq!(state.dataset.row_count(), 3);

    let restarted = Dashboard::new(config, CsvStore::new(workspace.store_path()));
    let reloaded = restarted.startup();
    assert_eq!(reloaded.dataset, state.dataset);
    let view = restarted.render(&reloaded);
    assert_eq!(view.overview.records, 3);
    assert_eq!(view.overview.period, "03/2024 - 04/2024");
}

#[test]
fn repeated_upload_event_consolidates_once() {
    let dashboard = Dashboard::new(DashboardConfig::default(), MemoryStore::new());
    let upload = Upload::new("march.csv", MARCH_CSV);
    let mut state = dashboard.startup();
    for _ in 0..3 {
        state = dashboard.update(state, Event::Upload(upload.clone()));
    }
    assert_eq!(state.dataset.row_count(), 2);
    assert_eq!(dashboard.store().load().expect("load").row_count(), 2);
}
