use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::{coerce::TypedTable, data::cell_key};

/// Chosen values per column. A column with no chosen values (or not
/// mentioned at all) lets every row through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterSelection {
    by_column: BTreeMap<String, BTreeSet<String>>,
}

impl FilterSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selection for `column`. An empty `values` clears it.
    pub fn set<I, S>(&mut self, column: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect::<BTreeSet<_>>();
        if values.is_empty() {
            self.by_column.remove(column);
        } else {
            self.by_column.insert(column.to_string(), values);
        }
    }

    pub fn with<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(column, values);
        self
    }

    pub fn clear_column(&mut self, column: &str) {
        self.by_column.remove(column);
    }

    pub fn clear(&mut self) {
        self.by_column.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.by_column.is_empty()
    }

    pub fn selected(&self, column: &str) -> Option<&BTreeSet<String>> {
        self.by_column.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.by_column.iter()
    }
}

/// Keep the rows whose value is selected in every restricted column.
///
/// Each restriction is an independent membership test, so the order in
/// which columns are checked does not matter. A restriction on a column the
/// table lacks matches nothing, which mirrors a filter whose options are
/// all absent from the data.
pub fn filter_rows(table: &TypedTable, selection: &FilterSelection) -> TypedTable {
    let mut subset = table.clone();
    if selection.is_empty() {
        return subset;
    }
    let tests = selection
        .iter()
        .map(|(column, values)| (table.column_index(column), values))
        .collect::<Vec<_>>();
    subset.retain_rows(|row| {
        tests.iter().all(|(idx, values)| match idx {
            Some(idx) => values.contains(&cell_key(row[*idx].as_ref())),
            None => false,
        })
    });
    subset
}

/// Parse `column=v1,v2` into a column name and its values.
pub fn parse_selection(spec: &str) -> Result<(String, Vec<String>)> {
    let trimmed = spec.trim();
    let (column, values) = trimmed
        .split_once('=')
        .ok_or_else(|| anyhow!("Filter '{trimmed}' must look like column=value[,value...]"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(anyhow!("Filter '{trimmed}' is missing a column name"));
    }
    Ok((
        crate::data::normalize_column_name(column),
        split_values(values)?,
    ))
}

/// Split a comma-separated value list, honouring surrounding quotes on
/// individual values.
pub fn split_values(raw: &str) -> Result<Vec<String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| unquote(value).map(str::to_string))
        .collect()
}

fn unquote(value: &str) -> Result<&str> {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return Ok(&value[1..value.len() - 1]);
        }
    }
    if value.starts_with(['"', '\'']) || value.ends_with(['"', '\'']) {
        return Err(anyhow!("Unbalanced quotes in filter value {value}"));
    }
    Ok(value)
}
