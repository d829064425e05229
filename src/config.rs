//! Dashboard configuration.
//!
//! The configuration is a YAML document deserialized into
//! [`DashboardConfig`]. Every field has a default, so an empty file (or no
//! file at all) yields a working setup. CLI flags override individual
//! fields after loading.
//!
//! Column names listed here are matched against headers *after*
//! normalization (trimmed, lowercased), so they should be written in
//! lowercase.

use std::{fs::File, io::BufReader, path::Path, path::PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::{cli::parse_delimiter, data::normalize_column_name};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    /// Flat file holding the consolidated dataset.
    pub store: PathBuf,
    pub csv: CsvOptions,
    pub columns: ColumnNames,
    /// Columns parsed as decimal numbers during coercion.
    pub numeric_columns: Vec<String>,
    /// Day-first formats tried in order when parsing the date column.
    pub date_formats: Vec<String>,
    /// Substrings that mark a header as a date column when the configured
    /// date column is absent.
    pub date_name_hints: Vec<String>,
    pub derived: DerivedNames,
    pub currency_symbol: String,
    pub preview_rows: usize,
    pub preview_columns: usize,
    pub top_values: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CsvOptions {
    /// Field delimiter (`,`, `;`, `tab`, `|` or any single ASCII character).
    pub delimiter: String,
    pub decimal_separator: char,
    /// Text encoding label understood by `encoding_rs` (defaults to utf-8).
    pub encoding: Option<String>,
}

/// Headers that carry a meaning for KPIs, charts and filters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnNames {
    pub date: String,
    pub total_value: String,
    pub quantity: String,
    pub fee: String,
    pub estimated_income: String,
    pub product_subtotal: String,
    pub size: String,
    pub product: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub return_quantity: String,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DerivedNames {
    pub month: String,
    pub year: String,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
            decimal_separator: ',',
            encoding: None,
        }
    }
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            date: "date".to_string(),
            total_value: "total".to_string(),
            quantity: "quantity".to_string(),
            fee: "fee".to_string(),
            estimated_income: "estimated income".to_string(),
            product_subtotal: "product subtotal".to_string(),
            size: "size".to_string(),
            product: "product".to_string(),
            kind: "type".to_string(),
            status: "status".to_string(),
            return_quantity: "return quantity".to_string(),
            region: "state".to_string(),
        }
    }
}

impl Default for DerivedNames {
    fn default() -> Self {
        Self {
            month: "month".to_string(),
            year: "year".to_string(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        let columns = ColumnNames::default();
        let numeric_columns = vec![
            columns.total_value.clone(),
            columns.quantity.clone(),
            columns.fee.clone(),
            columns.estimated_income.clone(),
            columns.product_subtotal.clone(),
            columns.return_quantity.clone(),
        ];
        Self {
            store: PathBuf::from("consolidated.csv"),
            csv: CsvOptions::default(),
            columns,
            numeric_columns,
            date_formats: vec![
                "%d/%m/%Y".to_string(),
                "%d/%m/%Y %H:%M".to_string(),
                "%d/%m/%Y %H:%M:%S".to_string(),
                "%d-%m-%Y".to_string(),
                "%d.%m.%Y".to_string(),
            ],
            date_name_hints: vec!["date".to_string(), "data".to_string()],
            derived: DerivedNames::default(),
            currency_symbol: "R$".to_string(),
            preview_rows: 20,
            preview_columns: 10,
            top_values: 10,
        }
    }
}

impl DashboardConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: DashboardConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config file {path:?}"))?;
        config.validated()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing config YAML")
    }

    /// Load `path` when given, otherwise fall back to the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Normalize configured names and check the CSV options.
    pub fn validated(mut self) -> Result<Self> {
        self.delimiter()?;
        if self.csv.decimal_separator != ',' && self.csv.decimal_separator != '.' {
            return Err(anyhow!(
                "Decimal separator must be ',' or '.', got '{}'",
                self.csv.decimal_separator
            ));
        }
        if self.date_formats.is_empty() {
            return Err(anyhow!("At least one date format must be configured"));
        }
        let columns = &mut self.columns;
        for name in [
            &mut columns.date,
            &mut columns.total_value,
            &mut columns.quantity,
            &mut columns.fee,
            &mut columns.estimated_income,
            &mut columns.product_subtotal,
            &mut columns.size,
            &mut columns.product,
            &mut columns.kind,
            &mut columns.status,
            &mut columns.return_quantity,
            &mut columns.region,
        ] {
            *name = normalize_column_name(name);
        }
        for name in &mut self.numeric_columns {
            *name = normalize_column_name(name);
        }
        // Renamed semantic measures stay numeric without listing them twice.
        for measure in [
            &columns.total_value,
            &columns.quantity,
            &columns.fee,
            &columns.estimated_income,
            &columns.product_subtotal,
            &columns.return_quantity,
        ] {
            if !self.numeric_columns.contains(measure) {
                self.numeric_columns.push(measure.clone());
            }
        }
        for hint in &mut self.date_name_hints {
            *hint = normalize_column_name(hint);
        }
        Ok(self)
    }

    pub fn delimiter(&self) -> Result<u8> {
        parse_delimiter(&self.csv.delimiter).map_err(|err| anyhow!(err))
    }

    /// Columns offered as sidebar filters, in display order.
    pub fn filter_columns(&self) -> Vec<String> {
        vec![
            self.derived.month.clone(),
            self.columns.size.clone(),
            self.columns.product.clone(),
            self.columns.status.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_valid() {
        let config = DashboardConfig::default().validated().expect("valid defaults");
        assert_eq!(config.delimiter().unwrap(), b',');
        assert!(config.numeric_columns.contains(&"total".to_string()));
        assert_eq!(config.filter_columns()[0], "month");
    }

    #[test]
    fn partial_yaml_keeps_defaults_and_normalizes_names() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "csv:\n  delimiter: semicolon\ncolumns:\n  date: ' Data '\n  total_value: Valor Total").unwrap();
        let config = DashboardConfig::load(file.path()).expect("load config");
        assert_eq!(config.delimiter().unwrap(), b';');
        assert_eq!(config.csv.decimal_separator, ',');
        assert_eq!(config.columns.date, "data");
        assert_eq!(config.columns.total_value, "valor total");
        assert_eq!(config.columns.status, "status");
        assert!(config.numeric_columns.contains(&"valor total".to_string()));
    }

    #[test]
    fn invalid_decimal_separator_is_rejected() {
        let mut config = DashboardConfig::default();
        config.csv.decimal_separator = ';';
        assert!(config.validated().is_err());
    }

    #[test]
    fn save_then_load_preserves_fields() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("dashboard.yml");
        let mut config = DashboardConfig::default();
        config.currency_symbol = "$".to_string();
        config.csv.decimal_separator = '.';
        config.save(&path).expect("save config");
        let loaded = DashboardConfig::load(&path).expect("load config");
        assert_eq!(loaded, config);
    }
}
