use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{aggregate::percentage, coerce::TypedTable, data::cell_key};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyRow {
    pub value: String,
    pub count: usize,
    pub percent: f64,
}

/// Value counts of `column`, most frequent first (ties by value), truncated
/// to `top` entries when `top > 0`. Percentages are relative to all rows of
/// `table`, including the truncated tail.
pub fn value_counts(table: &TypedTable, column: &str, top: usize) -> Option<Vec<FrequencyRow>> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut total = 0usize;
    for cell in table.column(column)? {
        *counts.entry(cell_key(cell)).or_insert(0) += 1;
        total += 1;
    }

    let mut items = counts.into_iter().collect::<Vec<_>>();
    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if top > 0 && items.len() > top {
        items.truncate(top);
    }
    let total = Decimal::from(total);
    Some(
        items
            .into_iter()
            .map(|(value, count)| FrequencyRow {
                percent: percentage(Decimal::from(count), total),
                value,
                count,
            })
            .collect(),
    )
}
