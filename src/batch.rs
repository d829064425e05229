//! Raw record batches.
//!
//! A [`RecordBatch`] is one upload's worth of rows with every cell kept as
//! the text it arrived as. The consolidated dataset and the persisted store
//! use the same representation, which keeps reloads lossless: typing only
//! happens later, in [`coerce`](crate::coerce).

use std::io::Write;

use anyhow::{Context, Result};

use crate::{data::normalize_column_name, io_utils};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBatch {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RecordBatch {
    /// Build a batch, normalizing header names and padding or truncating
    /// rows to the header width.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let columns = columns
            .iter()
            .map(|name| normalize_column_name(name))
            .collect::<Vec<_>>();
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// A batch with no rows counts as empty even when it still knows its
    /// header; consolidation treats both the same way.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Values of one column, top to bottom.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(move |row| row.get(index).map(String::as_str).unwrap_or(""))
    }

    /// Project onto `names` (in that order); unknown names are skipped.
    pub fn select(&self, names: &[String]) -> RecordBatch {
        let indices = names
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect::<Vec<_>>();
        let columns = indices.iter().map(|&idx| self.columns[idx].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&idx| row[idx].clone()).collect())
            .collect();
        RecordBatch { columns, rows }
    }

    /// Keep only rows for which `keep` returns true. Returns the number of
    /// rows removed.
    pub fn retain_rows<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&[String]) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|row| keep(row));
        before - self.rows.len()
    }

    /// Append rows of a batch that already has exactly this header.
    pub(crate) fn extend_rows(&mut self, rows: impl IntoIterator<Item = Vec<String>>) {
        self.rows.extend(rows);
    }

    pub fn write_csv<W: Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut writer = io_utils::csv_writer(writer, delimiter);
        writer
            .write_record(&self.columns)
            .context("Writing header row")?;
        for (idx, row) in self.rows.iter().enumerate() {
            writer
                .write_record(row)
                .with_context(|| format!("Writing row {}", idx + 2))?;
        }
        writer.flush().context("Flushing CSV output")?;
        Ok(())
    }
}
