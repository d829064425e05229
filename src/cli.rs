use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{
    config::DashboardConfig,
    filter::{FilterSelection, parse_selection, split_values},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Consolidate sales spreadsheets and report on them", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Merge a CSV or Excel file into the consolidated dataset
    Ingest(IngestArgs),
    /// Print indicators, charts and tables for the (filtered) dataset
    Report(ReportArgs),
    /// Write the filtered rows of the dataset as CSV
    Export(ExportArgs),
    /// Delete the consolidated dataset
    Clear(ClearArgs),
    /// Drive the dashboard with commands read from stdin
    Session(SessionArgs),
    /// Write the default configuration to a YAML file
    Config(ConfigArgs),
}

/// Where the dataset lives and how files are read.
#[derive(Debug, Clone, Default, Args)]
pub struct StoreArgs {
    /// YAML configuration file (defaults are used when omitted)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Consolidated dataset file (overrides the configuration)
    #[arg(long)]
    pub store: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Decimal separator of numeric cells (',' or '.')
    #[arg(long = "decimal", value_parser = parse_decimal_separator)]
    pub decimal: Option<char>,
    /// Character encoding of uploaded CSV files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

impl StoreArgs {
    /// Configuration file (or defaults) with the command-line overrides applied.
    pub fn resolve(&self) -> Result<DashboardConfig> {
        let mut config = DashboardConfig::load_or_default(self.config.as_deref())?;
        if let Some(store) = &self.store {
            config.store = store.clone();
        }
        if let Some(delimiter) = self.delimiter {
            config.csv.delimiter = match delimiter {
                b'\t' => "tab".to_string(),
                other => (other as char).to_string(),
            };
        }
        if let Some(decimal) = self.decimal {
            config.csv.decimal_separator = decimal;
        }
        if let Some(encoding) = &self.input_encoding {
            config.csv.encoding = Some(encoding.clone());
        }
        config.validated()
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// Months to keep (e.g. `January,March`)
    #[arg(long = "month", action = clap::ArgAction::Append)]
    pub months: Vec<String>,
    /// Sizes to keep
    #[arg(long = "size", action = clap::ArgAction::Append)]
    pub sizes: Vec<String>,
    /// Products to keep
    #[arg(long = "product", action = clap::ArgAction::Append)]
    pub products: Vec<String>,
    /// Order statuses to keep
    #[arg(long = "status", action = clap::ArgAction::Append)]
    pub statuses: Vec<String>,
    /// Any other column, as `column=value[,value...]`
    #[arg(long = "where", action = clap::ArgAction::Append)]
    pub conditions: Vec<String>,
}

impl FilterArgs {
    /// Build the selection. The named flags resolve against the configured
    /// column names; repeated flags for one column accumulate.
    pub fn selection(&self, config: &DashboardConfig) -> Result<FilterSelection> {
        let mut pairs: Vec<(String, Vec<String>)> = Vec::new();
        for (column, raw) in [
            (&config.derived.month, &self.months),
            (&config.columns.size, &self.sizes),
            (&config.columns.product, &self.products),
            (&config.columns.status, &self.statuses),
        ] {
            for value in raw {
                pairs.push((column.clone(), split_values(value)?));
            }
        }
        for condition in &self.conditions {
            pairs.push(parse_selection(condition)?);
        }

        let mut selection = FilterSelection::new();
        for (column, values) in pairs {
            let mut merged = selection
                .selected(&column)
                .map(|existing| existing.iter().cloned().collect::<Vec<_>>())
                .unwrap_or_default();
            merged.extend(values);
            selection.set(&column, merged);
        }
        Ok(selection)
    }
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// CSV or workbook (.xlsx, .xls, .xlsm, .ods) to merge
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum ReportFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: ReportFormat,
    /// Columns shown in the data preview (defaults to the first ten)
    #[arg(short = 'C', long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
    /// Number of preview rows
    #[arg(long)]
    pub rows: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Output CSV file (stdout if omitted or '-')
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Write to `filtered_YYYYMMDD_HHMMSS.csv` in the current directory
    #[arg(long = "default-name", conflicts_with = "output")]
    pub default_name: bool,
}

#[derive(Debug, Args)]
pub struct ClearArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Confirm that all consolidated data may be deleted
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Destination YAML file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_decimal_separator(value: &str) -> Result<char, String> {
    match value {
        "," | "comma" => Ok(','),
        "." | "dot" | "point" => Ok('.'),
        other => Err(format!("Decimal separator must be ',' or '.', got '{other}'")),
    }
}
