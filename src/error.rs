//! Error taxonomy for ingestion and persistence.
//!
//! Every variant here is local and non-fatal: callers turn them into
//! [`Diagnostic`] messages and keep the prior
//! state. Rejected merges are not errors at all (see
//! [`MergeOutcome`](crate::consolidate::MergeOutcome)), and a zero
//! denominator in [`percentage`](crate::aggregate::percentage) is normalized
//! to `0.0`.

use std::{io, path::PathBuf};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported file format '{extension}' (expected .csv, .xlsx, .xls, .xlsm or .ods)")]
    UnsupportedFormat { extension: String },
    #[error("failed to parse '{name}': {message}")]
    ParseFailure { name: String, message: String },
}

impl IngestError {
    pub(crate) fn parse(name: &str, message: impl Into<String>) -> Self {
        IngestError::ParseFailure {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{action} {path:?}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{action} {path:?}: {source}")]
    Csv {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("stored dataset {path:?} is unreadable: {message}")]
    Corrupt { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A message surfaced to the user instead of aborting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}
