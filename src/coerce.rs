//! Type coercion pipeline: raw text batch in, typed table out.
//!
//! Two stages run in order:
//!
//! 1. [`drop_unparseable_dates`] is **destructive**. Rows whose date cell does
//!    not parse (including empty cells) are removed from the batch it is
//!    given. They do not come back; callers that hand over the consolidated
//!    dataset lose those rows for good.
//! 2. Typing: numeric columns become [`Value::Number`] (unparseable cells
//!    become missing), the date column becomes [`Value::Date`], and the month
//!    name and year are derived from it.
//!
//! Neither stage fails. Problems are reported as [`Diagnostic`]s next to the
//! degraded table.

use chrono::Datelike;
use log::warn;

use crate::{
    batch::RecordBatch,
    config::DashboardConfig,
    data::{Value, cell_key, month_name, parse_day_first_date, parse_decimal},
    error::Diagnostic,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<Value>>>,
}

impl TypedTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<Value>>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<Value>>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of `name`, or `None` when the column is absent.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = Option<&Value>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row[idx].as_ref()))
    }

    pub(crate) fn retain_rows<F>(&mut self, keep: F)
    where
        F: FnMut(&Vec<Option<Value>>) -> bool,
    {
        self.rows.retain(keep);
    }

    /// First `limit` rows of the named columns (unknown names skipped), as
    /// display strings.
    pub fn preview(&self, names: &[String], limit: usize) -> (Vec<String>, Vec<Vec<String>>) {
        let indices = names
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect::<Vec<_>>();
        let headers = indices.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .take(limit)
            .map(|row| {
                indices
                    .iter()
                    .map(|&i| row[i].as_ref().map(Value::as_display).unwrap_or_default())
                    .collect()
            })
            .collect();
        (headers, rows)
    }

    /// Back to text cells, missing values as empty strings.
    pub fn to_record_batch(&self) -> RecordBatch {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.as_ref().map(Value::as_display).unwrap_or_default())
                    .collect()
            })
            .collect();
        RecordBatch::new(self.columns.clone(), rows)
    }

    /// Distinct keys of a column (missing cells as `<empty>`).
    pub fn distinct_keys(&self, name: &str) -> Option<Vec<String>> {
        let mut keys = self
            .column(name)?
            .map(cell_key)
            .collect::<Vec<_>>();
        keys.sort_by(|a, b| crate::data::compare_keys(a, b));
        keys.dedup();
        Some(keys)
    }
}

/// Outcome of the destructive date stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateStage {
    pub column: Option<String>,
    pub dropped: usize,
}

#[derive(Debug, Clone)]
pub struct Coerced {
    pub table: TypedTable,
    pub date_column: Option<String>,
    pub dropped_rows: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Find the date column: the configured name first, then a header that
/// contains one of the configured hints and whose non-empty values mostly
/// parse as dates, then the first column whose non-empty values all parse.
pub fn resolve_date_column(batch: &RecordBatch, config: &DashboardConfig) -> Option<usize> {
    if let Some(idx) = batch.column_index(&config.columns.date) {
        return Some(idx);
    }
    let derived = [&config.derived.month, &config.derived.year];
    let candidates = batch
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| !derived.contains(name) && !config.numeric_columns.contains(*name));

    let mut by_hint = None;
    let mut by_parse = None;
    for (idx, name) in candidates {
        if by_hint.is_some() {
            break;
        }
        let hinted = config
            .date_name_hints
            .iter()
            .any(|hint| !hint.is_empty() && name.contains(hint.as_str()));
        let (parsed, filled) = date_parse_counts(batch, idx, &config.date_formats);
        if hinted && parsed * 2 > filled {
            by_hint = Some(idx);
        }
        if by_parse.is_none() && filled > 0 && parsed == filled {
            by_parse = Some(idx);
        }
    }
    by_hint.or(by_parse)
}

/// (cells that parse as dates, non-empty cells) for column `idx`.
fn date_parse_counts(batch: &RecordBatch, idx: usize, formats: &[String]) -> (usize, usize) {
    batch
        .column_values(idx)
        .filter(|value| !value.trim().is_empty())
        .fold((0, 0), |(parsed, filled), value| {
            let ok = parse_day_first_date(value, formats).is_ok();
            (parsed + usize::from(ok), filled + 1)
        })
}

/// Remove, in place, every row whose date cell does not parse.
///
/// This is destructive by contract: the rows are gone from `batch`, not
/// merely hidden from aggregates. Without a date column nothing is removed.
pub fn drop_unparseable_dates(batch: &mut RecordBatch, config: &DashboardConfig) -> DateStage {
    let Some(idx) = resolve_date_column(batch, config) else {
        return DateStage {
            column: None,
            dropped: 0,
        };
    };
    let column = batch.columns()[idx].clone();
    let formats = &config.date_formats;
    let dropped = batch.retain_rows(|row| parse_day_first_date(&row[idx], formats).is_ok());
    if dropped > 0 {
        warn!("Dropped {dropped} row(s) with an unparseable '{column}' value");
    }
    DateStage {
        column: Some(column),
        dropped,
    }
}

/// Run both stages on `batch` and return the typed table.
pub fn coerce(mut batch: RecordBatch, config: &DashboardConfig) -> Coerced {
    let mut diagnostics = Vec::new();
    let stage = drop_unparseable_dates(&mut batch, config);
    if stage.dropped > 0 {
        let column = stage.column.as_deref().unwrap_or_default();
        diagnostics.push(Diagnostic::warning(format!(
            "Dropped {} row(s) whose '{column}' value is not a day-first date",
            stage.dropped
        )));
    }

    let decimal_separator = config.csv.decimal_separator;
    let date_idx = stage.column.as_deref().and_then(|c| batch.column_index(c));
    let numeric = batch
        .columns()
        .iter()
        .map(|name| config.numeric_columns.contains(name))
        .collect::<Vec<_>>();
    let mut numeric_failures = vec![0usize; batch.column_count()];

    let mut columns = batch.columns().to_vec();
    let month_idx = derived_slot(&mut columns, &config.derived.month, date_idx.is_some());
    let year_idx = derived_slot(&mut columns, &config.derived.year, date_idx.is_some());

    let mut rows = Vec::with_capacity(batch.row_count());
    for raw in batch.rows() {
        let mut typed = Vec::with_capacity(columns.len());
        for (idx, cell) in raw.iter().enumerate() {
            let trimmed = cell.trim();
            let value = if trimmed.is_empty() {
                None
            } else if Some(idx) == date_idx {
                parse_day_first_date(trimmed, &config.date_formats)
                    .ok()
                    .map(Value::Date)
            } else if numeric[idx] {
                match parse_decimal(trimmed, decimal_separator) {
                    Ok(number) => Some(Value::Number(number)),
                    Err(_) => {
                        numeric_failures[idx] += 1;
                        None
                    }
                }
            } else {
                Some(Value::Text(trimmed.to_string()))
            };
            typed.push(value);
        }
        typed.resize(columns.len(), None);
        if let (Some(date_idx), Some(month_idx), Some(year_idx)) = (date_idx, month_idx, year_idx)
            && let Some(Value::Date(date)) = typed[date_idx].clone()
        {
            typed[month_idx] = Some(Value::Text(month_name(date).to_string()));
            typed[year_idx] = Some(Value::Integer(i64::from(date.year())));
        }
        rows.push(typed);
    }

    for (idx, failures) in numeric_failures.iter().enumerate() {
        if *failures > 0 {
            diagnostics.push(Diagnostic::warning(format!(
                "{failures} value(s) in '{}' are not numbers and were treated as missing",
                batch.columns()[idx]
            )));
        }
    }

    Coerced {
        table: TypedTable::new(columns, rows),
        date_column: stage.column,
        dropped_rows: stage.dropped,
        diagnostics,
    }
}

/// Index of a derived column, appending it when the batch lacks it.
fn derived_slot(columns: &mut Vec<String>, name: &str, wanted: bool) -> Option<usize> {
    if !wanted {
        return None;
    }
    match columns.iter().position(|c| c == name) {
        Some(idx) => Some(idx),
        None => {
            columns.push(name.to_string());
            Some(columns.len() - 1)
        }
    }
}
