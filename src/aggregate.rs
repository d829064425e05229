//! Group-by reductions over a [`TypedTable`].
//!
//! [`aggregate`] and [`aggregate_by`] return `None` instead of failing when a
//! named column is absent, so callers can skip the section. Missing group
//! keys form their own `<empty>` group, which keeps the sum of all groups
//! equal to the column total.
//!
//! Arithmetic is checked. A sum that leaves the `Decimal` range reads as
//! `None` rather than aborting the report.

use std::{cmp::Ordering, collections::HashMap};

use itertools::Itertools;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::Serialize;

use crate::{
    coerce::TypedTable,
    data::{Value, cell_key, compare_keys},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateOp {
    #[default]
    Sum,
    Count,
    Mean,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub keys: Vec<String>,
    /// `None` for a mean over a group without numeric values, or when the
    /// group's sum overflowed.
    pub value: Option<Decimal>,
}

impl GroupRow {
    pub fn key(&self) -> &str {
        self.keys.first().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grouped {
    pub group_columns: Vec<String>,
    pub value_column: String,
    pub op: AggregateOp,
    pub rows: Vec<GroupRow>,
}

impl Grouped {
    /// Sum over all groups; `None` if any group or the total overflowed.
    pub fn total(&self) -> Option<Decimal> {
        self.rows
            .iter()
            .try_fold(Decimal::ZERO, |acc, row| match (self.op, row.value) {
                (AggregateOp::Mean, None) => Some(acc),
                (_, value) => acc.checked_add(value?),
            })
    }

    /// Re-order rows by calendar/lexicographic key instead of by value.
    pub fn sorted_by_key(mut self) -> Self {
        self.rows.sort_by(|a, b| compare_key_lists(&a.keys, &b.keys));
        self
    }
}

#[derive(Default)]
struct Accumulator {
    sum: Decimal,
    count: usize,
    overflowed: bool,
}

impl Accumulator {
    fn ingest(&mut self, op: AggregateOp, value: Option<&Value>) {
        match op {
            AggregateOp::Count => {
                if value.is_some() {
                    self.count += 1;
                }
            }
            AggregateOp::Sum | AggregateOp::Mean => {
                if let Some(number) = value.and_then(Value::as_decimal) {
                    match self.sum.checked_add(number) {
                        Some(sum) => self.sum = sum,
                        None => self.overflowed = true,
                    }
                    self.count += 1;
                }
            }
        }
    }

    fn finish(&self, op: AggregateOp) -> Option<Decimal> {
        match op {
            AggregateOp::Count => Some(Decimal::from(self.count)),
            _ if self.overflowed => None,
            AggregateOp::Sum => Some(self.sum),
            AggregateOp::Mean => {
                if self.count == 0 {
                    None
                } else {
                    self.sum.checked_div(Decimal::from(self.count))
                }
            }
        }
    }
}

/// Group `table` by `group_column` and reduce `value_column` with `op`.
///
/// Rows come back sorted by value, largest first; ties are ordered by key.
pub fn aggregate(
    table: &TypedTable,
    group_column: &str,
    value_column: &str,
    op: AggregateOp,
) -> Option<Grouped> {
    aggregate_by(table, &[group_column], value_column, op)
}

/// Multi-key variant of [`aggregate`].
pub fn aggregate_by(
    table: &TypedTable,
    group_columns: &[&str],
    value_column: &str,
    op: AggregateOp,
) -> Option<Grouped> {
    let group_indices = group_columns
        .iter()
        .map(|name| table.column_index(name))
        .collect::<Option<Vec<_>>>()?;
    let value_idx = table.column_index(value_column)?;

    let mut groups: HashMap<Vec<String>, Accumulator> = HashMap::new();
    for row in table.rows() {
        let keys = group_indices
            .iter()
            .map(|&idx| cell_key(row[idx].as_ref()))
            .collect::<Vec<_>>();
        groups
            .entry(keys)
            .or_default()
            .ingest(op, row[value_idx].as_ref());
    }

    let rows = groups
        .into_iter()
        .map(|(keys, acc)| GroupRow {
            value: acc.finish(op),
            keys,
        })
        .sorted_by(|a, b| {
            b.value
                .cmp(&a.value)
                .then_with(|| compare_key_lists(&a.keys, &b.keys))
        })
        .collect();

    Some(Grouped {
        group_columns: group_columns.iter().map(|c| c.to_string()).collect(),
        value_column: value_column.to_string(),
        op,
        rows,
    })
}

fn compare_key_lists(left: &[String], right: &[String]) -> Ordering {
    left.iter()
        .zip(right)
        .map(|(a, b)| compare_keys(a, b))
        .find(|ord| ord.is_ne())
        .unwrap_or_else(|| left.len().cmp(&right.len()))
}

/// Sum of the numeric cells of `column`; `None` when the column is absent
/// or the sum overflows.
pub fn column_total(table: &TypedTable, column: &str) -> Option<Decimal> {
    table
        .column(column)?
        .filter_map(|cell| cell.and_then(Value::as_decimal))
        .try_fold(Decimal::ZERO, |acc, number| acc.checked_add(number))
}

/// `part` as a percentage of `whole`.
///
/// A zero `whole` yields `0.0`, as does a quotient outside the `Decimal`
/// range.
pub fn percentage(part: Decimal, whole: Decimal) -> f64 {
    if whole.is_zero() {
        return 0.0;
    }
    part.checked_div(whole)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .and_then(|percent| percent.to_f64())
        .unwrap_or(0.0)
}

/// Two-way table: `row_column` values down, `column_column` values across,
/// `value_column` summed in the cells. Absent combinations read as zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pivot {
    pub row_column: String,
    pub column_column: String,
    pub value_column: String,
    pub column_keys: Vec<String>,
    pub rows: Vec<(String, Vec<Decimal>)>,
}

pub fn pivot(
    table: &TypedTable,
    row_column: &str,
    column_column: &str,
    value_column: &str,
) -> Option<Pivot> {
    let grouped = aggregate_by(
        table,
        &[row_column, column_column],
        value_column,
        AggregateOp::Sum,
    )?;
    let row_keys = grouped
        .rows
        .iter()
        .map(|r| r.keys[0].clone())
        .unique()
        .sorted_by(|a, b| compare_keys(a, b))
        .collect::<Vec<_>>();
    let column_keys = grouped
        .rows
        .iter()
        .map(|r| r.keys[1].clone())
        .unique()
        .sorted_by(|a, b| compare_keys(a, b))
        .collect::<Vec<_>>();
    let cells: HashMap<(&str, &str), Decimal> = grouped
        .rows
        .iter()
        .map(|r| {
            (
                (r.keys[0].as_str(), r.keys[1].as_str()),
                r.value.unwrap_or_default(),
            )
        })
        .collect();
    let rows = row_keys
        .iter()
        .map(|row_key| {
            let values = column_keys
                .iter()
                .map(|col_key| {
                    cells
                        .get(&(row_key.as_str(), col_key.as_str()))
                        .copied()
                        .unwrap_or_default()
                })
                .collect();
            (row_key.clone(), values)
        })
        .collect();
    Some(Pivot {
        row_column: row_column.to_string(),
        column_column: column_column.to_string(),
        value_column: value_column.to_string(),
        column_keys,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn table() -> TypedTable {
        let text = |s: &str| Some(Value::Text(s.to_string()));
        let num = |s: &str| Some(Value::Number(dec(s)));
        TypedTable::new(
            vec!["month".into(), "size".into(), "total".into()],
            vec![
                vec![text("March"), text("38"), num("10.50")],
                vec![text("March"), text("40"), num("4")],
                vec![text("January"), text("38"), num("20")],
                vec![text("January"), None, None],
            ],
        )
    }

    #[test]
    fn sum_sorts_descending() {
        let grouped = aggregate(&table(), "month", "total", AggregateOp::Sum).unwrap();
        let pairs = grouped
            .rows
            .iter()
            .map(|r| (r.key().to_string(), r.value.unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(
            pairs,
            vec![("January".to_string(), dec("20")), ("March".to_string(), dec("14.50"))]
        );
        assert_eq!(grouped.total(), column_total(&table(), "total"));
    }

    #[test]
    fn count_and_mean_skip_missing_values() {
        let count = aggregate(&table(), "month", "total", AggregateOp::Count).unwrap();
        let march = count.rows.iter().find(|r| r.key() == "March").unwrap();
        assert_eq!(march.value, Some(Decimal::from(2)));
        let january = count.rows.iter().find(|r| r.key() == "January").unwrap();
        assert_eq!(january.value, Some(Decimal::from(1)));

        let mean = aggregate(&table(), "size", "total", AggregateOp::Mean).unwrap();
        let size_38 = mean.rows.iter().find(|r| r.key() == "38").unwrap();
        assert_eq!(size_38.value, Some(dec("15.25")));
        let empty = mean.rows.iter().find(|r| r.key() == "<empty>").unwrap();
        assert_eq!(empty.value, None);
        assert_eq!(mean.rows.last().unwrap().key(), "<empty>");
    }

    #[test]
    fn absent_columns_yield_none() {
        assert!(aggregate(&table(), "region", "total", AggregateOp::Sum).is_none());
        assert!(aggregate(&table(), "month", "fee", AggregateOp::Sum).is_none());
        assert!(column_total(&table(), "fee").is_none());
    }

    #[test]
    fn percentage_guards_zero_denominator() {
        assert_eq!(percentage(dec("50"), Decimal::ZERO), 0.0);
        assert_eq!(percentage(Decimal::ZERO, Decimal::ZERO), 0.0);
        assert_eq!(percentage(dec("50"), dec("200")), 25.0);
    }

    #[test]
    fn overflowing_sums_read_as_missing() {
        let huge = "50000000000000000000000000000";
        let table = TypedTable::new(
            vec!["size".into(), "total".into()],
            vec![
                vec![Some(Value::Text("38".into())), Some(Value::Number(dec(huge)))],
                vec![Some(Value::Text("38".into())), Some(Value::Number(dec(huge)))],
                vec![Some(Value::Text("40".into())), Some(Value::Number(dec("3")))],
            ],
        );
        let sum = aggregate(&table, "size", "total", AggregateOp::Sum).unwrap();
        let size_38 = sum.rows.iter().find(|r| r.key() == "38").unwrap();
        assert_eq!(size_38.value, None);
        let size_40 = sum.rows.iter().find(|r| r.key() == "40").unwrap();
        assert_eq!(size_40.value, Some(dec("3")));
        assert_eq!(sum.total(), None);

        let mean = aggregate(&table, "size", "total", AggregateOp::Mean).unwrap();
        assert_eq!(mean.rows.iter().find(|r| r.key() == "38").unwrap().value, None);
        let count = aggregate(&table, "size", "total", AggregateOp::Count).unwrap();
        assert_eq!(count.rows[0].value, Some(Decimal::from(2)));

        assert_eq!(column_total(&table, "total"), None);
        assert_eq!(percentage(Decimal::MAX, dec("0.0001")), 0.0);
    }

    #[test]
    fn multi_key_groups_and_pivot() {
        let grouped = aggregate_by(&table(), &["month", "size"], "total", AggregateOp::Sum).unwrap();
        assert_eq!(grouped.rows.len(), 4);
        assert_eq!(grouped.rows[0].keys, vec!["January", "38"]);

        let pivot = pivot(&table(), "month", "size", "total").unwrap();
        assert_eq!(pivot.column_keys, vec!["38", "40", "<empty>"]);
        assert_eq!(pivot.rows[0].0, "January");
        assert_eq!(pivot.rows[0].1, vec![dec("20"), Decimal::ZERO, Decimal::ZERO]);
        assert_eq!(pivot.rows[1].0, "March");
        assert_eq!(pivot.rows[1].1, vec![dec("10.50"), dec("4"), Decimal::ZERO]);
    }
}
