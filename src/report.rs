//! Read-only projection of the dashboard state.
//!
//! [`build_view`] types the consolidated dataset, applies the filter
//! selection and computes every section of the report. Sections whose
//! columns are missing from the data come back as `None` (or are left
//! out) instead of failing.

use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use itertools::Itertools;
use log::info;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    aggregate::{AggregateOp, Grouped, Pivot, aggregate, aggregate_by, column_total, percentage, pivot},
    batch::RecordBatch,
    cli::{ReportArgs, ReportFormat},
    coerce::{TypedTable, coerce},
    config::DashboardConfig,
    data::{Value, format_number},
    error::{Diagnostic, Severity},
    filter::{FilterSelection, filter_rows},
    frequency::{FrequencyRow, value_counts},
    stats::{ColumnSummary, format_metric, summarize},
    store::Store,
    table,
};

pub const EMPTY_HINT: &str = "No data yet: ingest a .csv or .xlsx file to begin.";

#[derive(Debug, Clone, Serialize)]
pub struct View {
    pub overview: Overview,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub filters: Vec<FilterOptions>,
    pub selection: FilterSelection,
    pub filtered: FilteredSummary,
    pub kpis: Vec<Kpi>,
    pub charts: Charts,
    pub tables: Tables,
    pub stats: Vec<ColumnSummary>,
    pub preview: Preview,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub records: usize,
    pub columns: usize,
    /// `MM/YYYY - MM/YYYY`, or `N/A` without dates.
    pub period: String,
    pub store_kb: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterOptions {
    pub column: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilteredSummary {
    pub rows: usize,
    pub total_rows: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Kpi {
    pub label: String,
    pub column: String,
    pub value: Decimal,
    pub formatted: String,
    /// Share of the unfiltered total, in percent.
    pub share: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesPoint {
    pub label: String,
    pub value: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct Series {
    pub label_column: String,
    pub value_column: String,
    pub points: Vec<SeriesPoint>,
}

impl From<Grouped> for Series {
    fn from(grouped: Grouped) -> Self {
        Series {
            label_column: grouped.group_columns.join(" / "),
            value_column: grouped.value_column,
            points: grouped
                .rows
                .into_iter()
                .filter_map(|row| {
                    Some(SeriesPoint {
                        value: row.value?,
                        label: row.keys.join(" / "),
                    })
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Charts {
    pub sales_by_month: Option<Series>,
    pub status_distribution: Option<Vec<FrequencyRow>>,
    pub returns_by_size: Option<Series>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tables {
    pub quantity_by_size: Option<Grouped>,
    pub value_by_size: Option<Grouped>,
    pub month_by_size: Option<Pivot>,
    pub quantity_by_state_product: Option<Grouped>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Which columns and how many rows the preview shows.
#[derive(Debug, Clone, Default)]
pub struct PreviewOptions {
    pub columns: Vec<String>,
    pub rows: Option<usize>,
}

pub fn build_view(
    config: &DashboardConfig,
    dataset: &RecordBatch,
    selection: &FilterSelection,
    store_bytes: u64,
    diagnostics: &[Diagnostic],
) -> View {
    build_view_with(
        config,
        dataset,
        selection,
        store_bytes,
        diagnostics,
        &PreviewOptions::default(),
    )
}

pub fn build_view_with(
    config: &DashboardConfig,
    dataset: &RecordBatch,
    selection: &FilterSelection,
    store_bytes: u64,
    diagnostics: &[Diagnostic],
    preview: &PreviewOptions,
) -> View {
    let coerced = coerce(dataset.clone(), config);
    let full = coerced.table;
    let filtered = filter_rows(&full, selection);
    let mut notes = diagnostics.to_vec();
    notes.extend(coerced.diagnostics);

    let columns = &config.columns;
    let month = config.derived.month.as_str();
    View {
        overview: Overview {
            records: full.row_count(),
            columns: full.columns().len(),
            period: period(&full, coerced.date_column.as_deref()),
            store_kb: store_bytes as f64 / 1024.0,
        },
        hint: full.is_empty().then(|| EMPTY_HINT.to_string()),
        filters: config
            .filter_columns()
            .into_iter()
            .filter_map(|column| {
                let values = full.distinct_keys(&column)?;
                Some(FilterOptions { column, values })
            })
            .collect(),
        selection: selection.clone(),
        filtered: FilteredSummary {
            rows: filtered.row_count(),
            total_rows: full.row_count(),
            percent: percentage(
                Decimal::from(filtered.row_count()),
                Decimal::from(full.row_count()),
            ),
        },
        kpis: kpis(config, &full, &filtered),
        charts: Charts {
            sales_by_month: aggregate(&filtered, month, &columns.total_value, AggregateOp::Sum)
                .map(|g| g.sorted_by_key().into()),
            status_distribution: value_counts(&filtered, &columns.status, config.top_values),
            returns_by_size: aggregate(
                &filtered,
                &columns.size,
                &columns.return_quantity,
                AggregateOp::Sum,
            )
            .map(Into::into),
        },
        tables: Tables {
            quantity_by_size: aggregate(&filtered, &columns.size, &columns.quantity, AggregateOp::Sum),
            value_by_size: aggregate(&filtered, &columns.size, &columns.total_value, AggregateOp::Sum),
            month_by_size: pivot(&filtered, month, &columns.size, &columns.quantity),
            quantity_by_state_product: aggregate_by(
                &filtered,
                &[columns.region.as_str(), columns.product.as_str()],
                &columns.quantity,
                AggregateOp::Sum,
            ),
        },
        stats: summarize(&filtered, &config.numeric_columns),
        preview: build_preview(config, &filtered, preview),
        diagnostics: notes,
    }
}

fn period(table: &TypedTable, date_column: Option<&str>) -> String {
    let dates = date_column
        .and_then(|name| table.column(name))
        .map(|cells| cells.flatten().filter_map(Value::as_date).collect::<Vec<NaiveDate>>())
        .unwrap_or_default();
    match dates.iter().minmax().into_option() {
        Some((first, last)) => format!("{} - {}", first.format("%m/%Y"), last.format("%m/%Y")),
        None => "N/A".to_string(),
    }
}

fn kpis(config: &DashboardConfig, full: &TypedTable, filtered: &TypedTable) -> Vec<Kpi> {
    let columns = &config.columns;
    let cards = [
        ("Total value", &columns.total_value, true),
        ("Quantity", &columns.quantity, false),
        ("Fees", &columns.fee, true),
        ("Estimated income", &columns.estimated_income, true),
        ("Product subtotal", &columns.product_subtotal, true),
    ];
    cards
        .into_iter()
        .filter_map(|(label, column, money)| {
            let value = column_total(filtered, column)?;
            let whole = column_total(full, column)?;
            let number = format_number(value, config.csv.decimal_separator);
            let formatted = if money {
                format!("{} {number}", config.currency_symbol)
            } else {
                number
            };
            Some(Kpi {
                label: label.to_string(),
                column: column.clone(),
                value,
                formatted,
                share: percentage(value, whole),
            })
        })
        .collect()
}

fn build_preview(config: &DashboardConfig, table: &TypedTable, options: &PreviewOptions) -> Preview {
    let names = if options.columns.is_empty() {
        table
            .columns()
            .iter()
            .take(config.preview_columns)
            .cloned()
            .collect::<Vec<_>>()
    } else {
        options.columns.clone()
    };
    let (headers, rows) = table.preview(&names, options.rows.unwrap_or(config.preview_rows));
    Preview { headers, rows }
}

/// Plain-text rendering of `view` into `out`.
pub fn print_view<W: Write>(
    view: &View,
    config: &DashboardConfig,
    out: &mut W,
) -> io::Result<()> {
    let sep = config.csv.decimal_separator;

    for diagnostic in &view.diagnostics {
        let tag = match diagnostic.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        writeln!(out, "[{tag}] {}", diagnostic.message)?;
    }
    if let Some(hint) = &view.hint {
        return writeln!(out, "{hint}");
    }

    let overview = &view.overview;
    writeln!(
        out,
        "Records: {}  Columns: {}  Period: {}  Store: {:.1} KB",
        overview.records, overview.columns, overview.period, overview.store_kb
    )?;
    writeln!(
        out,
        "Filtered: {} of {} row(s) ({:.1}%)",
        view.filtered.rows, view.filtered.total_rows, view.filtered.percent
    )?;
    for (column, values) in view.selection.iter() {
        writeln!(out, "  {column}: {}", values.iter().join(", "))?;
    }
    writeln!(out)?;

    table::print_section(
        out,
        "Indicators",
        &headers(&["indicator", "value", "share"]),
        &view
            .kpis
            .iter()
            .map(|k| vec![k.label.clone(), k.formatted.clone(), format!("{:.1}%", k.share)])
            .collect::<Vec<_>>(),
    )?;

    print_series(out, "Sales by month", &view.charts.sales_by_month, sep)?;
    if let Some(distribution) = &view.charts.status_distribution {
        table::print_section(
            out,
            "Status distribution",
            &headers(&["status", "count", "percent"]),
            &distribution
                .iter()
                .map(|r| vec![r.value.clone(), r.count.to_string(), format!("{:.1}%", r.percent)])
                .collect::<Vec<_>>(),
        )?;
    }
    print_series(out, "Returns by size", &view.charts.returns_by_size, sep)?;

    print_grouped(out, "Quantity by size", &view.tables.quantity_by_size, sep)?;
    print_grouped(out, "Value by size", &view.tables.value_by_size, sep)?;
    if let Some(pivot) = &view.tables.month_by_size {
        let mut names = vec![format!("{} \\ {}", pivot.row_column, pivot.column_column)];
        names.extend(pivot.column_keys.iter().cloned());
        let rows = pivot
            .rows
            .iter()
            .map(|(key, values)| {
                std::iter::once(key.clone())
                    .chain(values.iter().map(|v| v.normalize().to_string()))
                    .collect()
            })
            .collect::<Vec<_>>();
        table::print_section(out, "Quantity by month and size", &names, &rows)?;
    }
    print_grouped(
        out,
        "Quantity by state and product",
        &view.tables.quantity_by_state_product,
        sep,
    )?;

    table::print_section(
        out,
        "Summary statistics",
        &headers(&["column", "count", "mean", "std", "min", "median", "max"]),
        &view
            .stats
            .iter()
            .map(|s| {
                vec![
                    s.column.clone(),
                    s.count.to_string(),
                    format_metric(s.mean),
                    format_metric(s.std_dev),
                    s.min.map(|v| v.normalize().to_string()).unwrap_or_default(),
                    format_metric(s.median),
                    s.max.map(|v| v.normalize().to_string()).unwrap_or_default(),
                ]
            })
            .collect::<Vec<_>>(),
    )?;
    table::print_section(out, "Data preview", &view.preview.headers, &view.preview.rows)
}

fn print_series<W: Write>(
    out: &mut W,
    title: &str,
    series: &Option<Series>,
    sep: char,
) -> io::Result<()> {
    let Some(series) = series else {
        return Ok(());
    };
    table::print_section(
        out,
        title,
        &[series.label_column.clone(), series.value_column.clone()],
        &series
            .points
            .iter()
            .map(|p| vec![p.label.clone(), format_number(p.value, sep)])
            .collect::<Vec<_>>(),
    )
}

fn print_grouped<W: Write>(
    out: &mut W,
    title: &str,
    grouped: &Option<Grouped>,
    sep: char,
) -> io::Result<()> {
    let Some(grouped) = grouped else {
        return Ok(());
    };
    let mut names = grouped.group_columns.clone();
    names.push(grouped.value_column.clone());
    let rows = grouped
        .rows
        .iter()
        .map(|r| {
            let mut cells = r.keys.clone();
            cells.push(r.value.map(|v| format_number(v, sep)).unwrap_or_default());
            cells
        })
        .collect::<Vec<_>>();
    table::print_section(out, title, &names, &rows)
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

pub fn write_json<W: Write>(view: &View, writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, view).context("Serializing report as JSON")
}

pub fn execute(args: &ReportArgs) -> Result<()> {
    let dashboard = crate::open_dashboard(&args.store)?;
    let mut state = dashboard.startup();
    state.selection = args.filters.selection(dashboard.config())?;
    let options = PreviewOptions {
        columns: args
            .columns
            .iter()
            .map(|c| crate::data::normalize_column_name(c))
            .filter(|c| !c.is_empty())
            .collect(),
        rows: args.rows,
    };
    let view = build_view_with(
        dashboard.config(),
        &state.dataset,
        &state.selection,
        dashboard.store().size_bytes(),
        &state.diagnostics,
        &options,
    );
    info!(
        "Report over {} of {} row(s)",
        view.filtered.rows, view.filtered.total_rows
    );
    match args.format {
        ReportFormat::Table => {
            print_view(&view, dashboard.config(), &mut io::stdout().lock())
                .context("Writing report")?;
        }
        ReportFormat::Json => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            write_json(&view, &mut handle)?;
            writeln!(handle).context("Writing report")?;
        }
    }
    Ok(())
}
