use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::Serialize;

use crate::{coerce::TypedTable, data::Value};

/// Summary statistics of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub min: Option<Decimal>,
    pub median: Option<f64>,
    pub max: Option<Decimal>,
}

/// Describe each of `columns` that exists in `table`, in the given order.
pub fn summarize(table: &TypedTable, columns: &[String]) -> Vec<ColumnSummary> {
    columns
        .iter()
        .filter_map(|name| {
            let mut stats = ColumnStats::default();
            for value in table.column(name)?.flatten() {
                stats.add_value(value);
            }
            Some(stats.finish(name))
        })
        .collect()
}

#[derive(Default)]
struct ColumnStats {
    values: Vec<f64>,
    sum: f64,
    sum_squares: f64,
    min: Option<Decimal>,
    max: Option<Decimal>,
}

impl ColumnStats {
    fn add_value(&mut self, value: &Value) {
        let Some(decimal) = value.as_decimal() else {
            return;
        };
        let Some(numeric) = decimal.to_f64() else {
            return;
        };
        self.sum += numeric;
        self.sum_squares += numeric * numeric;
        self.min = Some(self.min.map_or(decimal, |current| current.min(decimal)));
        self.max = Some(self.max.map_or(decimal, |current| current.max(decimal)));
        self.values.push(numeric);
    }

    fn count(&self) -> usize {
        self.values.len()
    }

    fn mean(&self) -> Option<f64> {
        if self.count() > 0 {
            Some(self.sum / self.count() as f64)
        } else {
            None
        }
    }

    fn median(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len().is_multiple_of(2) {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Some(sorted[mid])
        }
    }

    /// Sample standard deviation (n - 1 denominator).
    fn std_dev(&self) -> Option<f64> {
        let count = self.count();
        if count < 2 {
            return None;
        }
        let mean = self.mean()?;
        let variance = (self.sum_squares - count as f64 * mean * mean) / (count as f64 - 1.0);
        Some(variance.max(0.0).sqrt())
    }

    fn finish(&self, column: &str) -> ColumnSummary {
        ColumnSummary {
            column: column.to_string(),
            count: self.count(),
            mean: self.mean(),
            std_dev: self.std_dev(),
            min: self.min,
            median: self.median(),
            max: self.max,
        }
    }
}

pub fn format_metric(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => {
            if v.fract() == 0.0 {
                format!("{v:.0}")
            } else {
                format!("{v:.4}")
            }
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TypedTable {
        let num = |n: i64| Some(Value::Number(Decimal::from(n)));
        TypedTable::new(
            vec!["total".into(), "status".into()],
            vec![
                vec![num(2), Some(Value::Text("paid".into()))],
                vec![num(4), None],
                vec![None, None],
                vec![num(9), None],
            ],
        )
    }

    #[test]
    fn summarize_skips_missing_values() {
        let summary = summarize(&table(), &["total".to_string()]);
        assert_eq!(summary.len(), 1);
        let total = &summary[0];
        assert_eq!(total.count, 3);
        assert_eq!(total.mean, Some(5.0));
        assert_eq!(total.median, Some(4.0));
        assert_eq!(total.min, Some(Decimal::from(2)));
        assert_eq!(total.max, Some(Decimal::from(9)));
        let std_dev = total.std_dev.unwrap();
        assert!((std_dev - 3.605551).abs() < 1e-5);
    }

    #[test]
    fn absent_columns_are_skipped_and_text_is_ignored() {
        let summary = summarize(&table(), &["fee".to_string(), "status".to_string()]);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].column, "status");
        assert_eq!(summary[0].count, 0);
        assert_eq!(summary[0].mean, None);
        assert_eq!(summary[0].std_dev, None);
    }

    #[test]
    fn format_metric_trims_whole_numbers() {
        assert_eq!(format_metric(Some(5.0)), "5");
        assert_eq!(format_metric(Some(1.23456)), "1.2346");
        assert_eq!(format_metric(None), "");
    }
}
