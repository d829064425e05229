//! Turning uploaded files into [`RecordBatch`]es.
//!
//! The format is chosen from the file extension: `.csv` goes through the
//! `csv` crate with the configured delimiter and encoding, workbook
//! extensions go through `calamine` and only the first sheet is read.
//! Headers are normalized by [`RecordBatch::new`].

use std::{fs, io::Cursor, path::Path};

use calamine::{Data, DataType, Reader, open_workbook_auto_from_rs};
use log::debug;
use sha2::{Digest, Sha256};

use crate::{
    batch::RecordBatch,
    config::DashboardConfig,
    error::IngestError,
    io_utils,
};

/// One file handed to the dashboard: its name (for the extension) and
/// its full contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Workbook,
}

/// Content-derived identity of an upload (hex SHA-256 of its bytes).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Fingerprint(digest.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve hex digits, enough to tell uploads apart in logs.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

/// Options for reading uploads, extracted from [`DashboardConfig`].
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub delimiter: u8,
    pub encoding: &'static encoding_rs::Encoding,
}

impl ReadOptions {
    pub fn from_config(config: &DashboardConfig) -> anyhow::Result<Self> {
        Ok(Self {
            delimiter: config.delimiter()?,
            encoding: io_utils::resolve_encoding(config.csv.encoding.as_deref())?,
        })
    }
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.bytes)
    }

    pub fn format(&self) -> Result<SourceFormat, IngestError> {
        let extension = Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Ok(SourceFormat::Workbook),
            _ => Err(IngestError::UnsupportedFormat { extension }),
        }
    }
}

/// Parse an upload into a batch.
pub fn read_upload(upload: &Upload, options: &ReadOptions) -> Result<RecordBatch, IngestError> {
    let batch = match upload.format()? {
        SourceFormat::Csv => read_csv(upload, options)?,
        SourceFormat::Workbook => read_workbook(upload)?,
    };
    debug!(
        "Read {} row(s) x {} column(s) from '{}'",
        batch.row_count(),
        batch.column_count(),
        upload.name
    );
    Ok(batch)
}

fn read_csv(upload: &Upload, options: &ReadOptions) -> Result<RecordBatch, IngestError> {
    let mut reader = io_utils::csv_reader(upload.bytes.as_slice(), options.delimiter);
    let headers = io_utils::reader_headers(&mut reader, options.encoding)
        .map_err(|err| IngestError::parse(&upload.name, format!("{err:#}")))?;
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(IngestError::parse(&upload.name, "missing header row"));
    }

    let mut rows = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.map_err(|err| {
            IngestError::parse(&upload.name, format!("row {}: {err}", row_idx + 2))
        })?;
        let decoded = io_utils::decode_record(&record, options.encoding).map_err(|err| {
            IngestError::parse(&upload.name, format!("row {}: {err:#}", row_idx + 2))
        })?;
        rows.push(decoded);
    }
    Ok(RecordBatch::new(headers, rows))
}

fn read_workbook(upload: &Upload) -> Result<RecordBatch, IngestError> {
    let cursor = Cursor::new(upload.bytes.clone());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|err| IngestError::parse(&upload.name, err.to_string()))?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| IngestError::parse(&upload.name, "workbook has no sheets"))?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|err| IngestError::parse(&upload.name, format!("sheet '{first}': {err}")))?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>());
    let headers = rows
        .next()
        .ok_or_else(|| IngestError::parse(&upload.name, format!("sheet '{first}' is empty")))?;
    let body = rows
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect();
    Ok(RecordBatch::new(headers, body))
}

/// Text form of a workbook cell. Dates are rendered day-first so they go
/// through the same parsing stage as CSV dates.
pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(v) => v.to_string(),
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        Data::Bool(v) => v.to_string(),
        Data::DateTime(_) => cell
            .as_date()
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(v) => v.to_string(),
        Data::DurationIso(v) => v.to_string(),
        Data::Error(v) => format!("{v:?}"),
        Data::Empty => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ReadOptions {
        ReadOptions::from_config(&DashboardConfig::default()).expect("default options")
    }

    #[test]
    fn csv_upload_normalizes_headers() {
        let upload = Upload::new(
            "vendas.CSV",
            "Date , TOTAL,Status\n01/03/2024,\"10,50\",paid\n".as_bytes(),
        );
        let batch = read_upload(&upload, &options()).expect("read csv");
        assert_eq!(batch.columns(), ["date", "total", "status"]);
        assert_eq!(batch.rows()[0], vec!["01/03/2024", "10,50", "paid"]);
    }

    #[test]
    fn semicolon_delimiter_is_configurable() {
        let mut config = DashboardConfig::default();
        config.csv.delimiter = ";".into();
        let options = ReadOptions::from_config(&config).unwrap();
        let upload = Upload::new("a.csv", "date;total\n01/03/2024;10,50\n".as_bytes());
        let batch = read_upload(&upload, &options).expect("read csv");
        assert_eq!(batch.rows()[0], vec!["01/03/2024", "10,50"]);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let upload = Upload::new("report.pdf", b"%PDF".to_vec());
        match read_upload(&upload, &options()) {
            Err(IngestError::UnsupportedFormat { extension }) => assert_eq!(extension, "pdf"),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn ragged_csv_is_a_parse_failure() {
        let upload = Upload::new("bad.csv", "a,b\n1,2,3\n".as_bytes());
        let err = read_upload(&upload, &options()).expect_err("ragged rows");
        assert!(matches!(err, IngestError::ParseFailure { .. }));
        assert!(err.to_string().contains("bad.csv"));
    }

    #[test]
    fn broken_workbook_is_a_parse_failure() {
        let upload = Upload::new("sheet.xlsx", b"definitely not a zip".to_vec());
        assert!(matches!(
            read_upload(&upload, &options()),
            Err(IngestError::ParseFailure { .. })
        ));
    }

    #[test]
    fn fingerprint_depends_on_content_only() {
        let a = Upload::new("a.csv", b"x\n1\n".to_vec());
        let b = Upload::new("b.csv", b"x\n1\n".to_vec());
        let c = Upload::new("a.csv", b"x\n2\n".to_vec());
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().as_str().len(), 64);
        assert_eq!(a.fingerprint().short().len(), 12);
    }

    #[test]
    fn workbook_cells_render_as_text() {
        assert_eq!(cell_to_string(&Data::Float(38.0)), "38");
        assert_eq!(cell_to_string(&Data::Float(10.5)), "10.5");
        assert_eq!(cell_to_string(&Data::Int(7)), "7");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }
}
