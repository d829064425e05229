use std::{cmp::Ordering, fmt, str::FromStr};

use anyhow::{Result, anyhow, bail};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Label used for missing cells wherever a value has to become a key
/// (group-by keys, filter options, value counts).
pub const EMPTY_LABEL: &str = "<empty>";

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Number(Decimal),
    Date(NaiveDate),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Number(d) => d.normalize().to_string(),
            Value::Date(d) => d.format("%d/%m/%Y").to_string(),
        }
    }

    /// Numeric view of the value; text and dates are not summable.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Number(d) => Some(*d),
            Value::Text(_) | Value::Date(_) => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Key form of an optional cell: missing cells collapse to [`EMPTY_LABEL`].
pub fn cell_key(cell: Option<&Value>) -> String {
    match cell {
        Some(value) => value.as_display(),
        None => EMPTY_LABEL.to_string(),
    }
}

/// Trim and lowercase a header so uploads match regardless of spelling.
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Parse a decimal literal written with `decimal_separator`.
///
/// With `,` as separator, `1.234,56` reads as 1234.56 (dots are grouping).
/// A value without the separator is read as a plain dot-decimal number, so
/// `10.5` still parses when the configured separator is `,`.
pub fn parse_decimal(value: &str, decimal_separator: char) -> Result<Decimal> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("Empty numeric value");
    }
    let mut negative = false;
    let mut body = trimmed;
    if body.starts_with('(') && body.ends_with(')') && body.len() > 2 {
        negative = true;
        body = &body[1..body.len() - 1];
    }
    let body = body.trim_start_matches('+');

    let grouping = if decimal_separator == ',' { '.' } else { ',' };
    let canonical: String = if body.contains(decimal_separator) {
        body.chars()
            .filter(|c| *c != grouping && *c != ' ' && *c != '_')
            .map(|c| if c == decimal_separator { '.' } else { c })
            .collect()
    } else if decimal_separator == ',' {
        body.chars().filter(|c| *c != ' ' && *c != '_').collect()
    } else {
        body.chars()
            .filter(|c| *c != grouping && *c != ' ' && *c != '_')
            .collect()
    };

    let parsed = Decimal::from_str(&canonical)
        .or_else(|_| Decimal::from_scientific(&canonical))
        .map_err(|_| anyhow!("Failed to parse '{value}' as number"))?;
    Ok(if negative { -parsed } else { parsed })
}

/// Parse a day-month-year date, trying `formats` in order.
///
/// Date-time formats are accepted too; the time part is discarded.
pub fn parse_day_first_date(value: &str, formats: &[String]) -> Result<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("Empty date value");
    }
    for fmt in formats {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(parsed);
        }
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(parsed.date());
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn month_name(date: NaiveDate) -> &'static str {
    MONTH_NAMES[date.month0() as usize]
}

/// Calendar position of a month name, used to order months on screen.
pub fn month_position(name: &str) -> Option<usize> {
    MONTH_NAMES
        .iter()
        .position(|month| month.eq_ignore_ascii_case(name))
}

/// Compare two keys so month names sort by calendar, everything else
/// lexicographically (months first).
pub fn compare_keys(left: &str, right: &str) -> Ordering {
    match (month_position(left), month_position(right)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => left.cmp(right),
    }
}

/// Render a number with two decimals and thousands grouping, using the
/// configured decimal separator (`1.234,56` for `,`, `1,234.56` for `.`).
pub fn format_number(value: Decimal, decimal_separator: char) -> String {
    let rounded = value.round_dp(2);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let fixed = format!("{:.2}", rounded.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let grouping = if decimal_separator == ',' { '.' } else { ',' };
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, ch) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(grouping);
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}{grouped}{decimal_separator}{fraction}")
}
