//! Durable backing for the consolidated dataset.
//!
//! The dashboard only needs [`Store`]: load everything, save everything,
//! clear. [`CsvStore`] keeps the dataset as a flat CSV file of raw text
//! cells; [`MemoryStore`] is the in-process stand-in.
//!
//! The store file is always comma-delimited, whatever delimiter the uploads
//! use, so any invocation can read what another one saved.
//!
//! Nothing here serializes concurrent writers. `CsvStore::save` replaces the
//! file through a temporary sibling and a rename, so a reader never sees a
//! half-written file, but two processes saving at once still race and the
//! last one wins.

use std::{
    fs::{self, File},
    io::{self, BufReader, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::{debug, info};
use tempfile::NamedTempFile;

use crate::{batch::RecordBatch, error::PersistenceError, io_utils};

/// Field delimiter of the stored CSV file.
pub const STORE_DELIMITER: u8 = b',';

pub trait Store {
    /// The stored dataset, or an empty batch when nothing was saved yet.
    fn load(&self) -> Result<RecordBatch, PersistenceError>;
    fn save(&self, batch: &RecordBatch) -> Result<(), PersistenceError>;
    /// Remove the stored dataset. Returns whether anything was removed.
    fn clear(&self) -> Result<bool, PersistenceError>;
    /// Size of the stored representation in bytes (0 when absent).
    fn size_bytes(&self) -> u64;
}

#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, action: &'static str, source: io::Error) -> PersistenceError {
        PersistenceError::Io {
            action,
            path: self.path.clone(),
            source,
        }
    }

    fn csv_error(&self, action: &'static str, source: csv::Error) -> PersistenceError {
        PersistenceError::Csv {
            action,
            path: self.path.clone(),
            source,
        }
    }
}

impl Store for CsvStore {
    fn load(&self) -> Result<RecordBatch, PersistenceError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("No stored dataset at {:?}", self.path);
                return Ok(RecordBatch::empty());
            }
            Err(err) => return Err(self.io_error("Opening", err)),
        };
        let mut reader = io_utils::csv_reader(BufReader::new(file), STORE_DELIMITER);
        let headers = reader
            .headers()
            .map_err(|err| self.csv_error("Reading header of", err))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(|err| self.csv_error("Reading", err))?;
            if record.len() != headers.len() {
                return Err(PersistenceError::Corrupt {
                    path: self.path.clone(),
                    message: format!(
                        "row {} has {} field(s), expected {}",
                        idx + 2,
                        record.len(),
                        headers.len()
                    ),
                });
            }
            rows.push(record.iter().map(str::to_string).collect());
        }
        let batch = RecordBatch::new(headers, rows);
        info!(
            "Loaded {} stored row(s) from {:?}",
            batch.row_count(),
            self.path
        );
        Ok(batch)
    }

    fn save(&self, batch: &RecordBatch) -> Result<(), PersistenceError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|err| self.io_error("Creating directory for", err))?;
        let mut temp =
            NamedTempFile::new_in(&dir).map_err(|err| self.io_error("Staging", err))?;
        batch
            .write_csv(temp.as_file_mut(), STORE_DELIMITER)
            .map_err(|err| PersistenceError::Io {
                action: "Writing",
                path: self.path.clone(),
                source: io::Error::other(format!("{err:#}")),
            })?;
        temp.as_file_mut()
            .flush()
            .map_err(|err| self.io_error("Flushing", err))?;
        temp.persist(&self.path)
            .map_err(|err| self.io_error("Replacing", err.error))?;
        info!("Saved {} row(s) to {:?}", batch.row_count(), self.path);
        Ok(())
    }

    fn clear(&self) -> Result<bool, PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(self.io_error("Removing", err)),
        }
    }

    fn size_bytes(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }
}

/// Store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Option<Saved>>,
}

#[derive(Debug, Clone)]
struct Saved {
    batch: RecordBatch,
    bytes: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, Option<Saved>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Store for MemoryStore {
    fn load(&self) -> Result<RecordBatch, PersistenceError> {
        Ok(self
            .guard()
            .as_ref()
            .map(|saved| saved.batch.clone())
            .unwrap_or_default())
    }

    fn save(&self, batch: &RecordBatch) -> Result<(), PersistenceError> {
        let mut buffer = Vec::new();
        batch
            .write_csv(&mut buffer, STORE_DELIMITER)
            .map_err(|err| PersistenceError::Io {
                action: "Writing",
                path: PathBuf::from("<memory>"),
                source: io::Error::other(format!("{err:#}")),
            })?;
        *self.guard() = Some(Saved {
            batch: batch.clone(),
            bytes: buffer.len() as u64,
        });
        Ok(())
    }

    fn clear(&self) -> Result<bool, PersistenceError> {
        Ok(self.guard().take().is_some())
    }

    fn size_bytes(&self) -> u64 {
        self.guard().as_ref().map_or(0, |saved| saved.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> RecordBatch {
        RecordBatch::new(
            vec!["date".into(), "total".into()],
            vec![
                vec!["01/03/2024".into(), "10,50".into()],
                vec!["02/03/2024".into(), "".into()],
            ],
        )
    }

    #[test]
    fn csv_store_round_trips_raw_text() {
        let dir = tempdir().unwrap();
        let store = CsvStore::new(dir.path().join("nested").join("data.csv"));
        assert_eq!(store.load().unwrap(), RecordBatch::empty());
        assert_eq!(store.size_bytes(), 0);

        store.save(&sample()).unwrap();
        assert!(store.size_bytes() > 0);
        assert_eq!(store.load().unwrap(), sample());

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn stored_file_is_comma_delimited() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        CsvStore::new(&path).save(&sample()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("date,total\n"));
        assert_eq!(CsvStore::new(&path).load().unwrap(), sample());
    }

    #[test]
    fn csv_store_reports_corrupt_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "a,b\n1,2\n3\n").unwrap();
        let store = CsvStore::new(&path);
        assert!(store.load().is_err());
    }

    #[test]
    fn memory_store_behaves_like_a_store() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_empty());
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());
        let mut expected = Vec::new();
        sample().write_csv(&mut expected, STORE_DELIMITER).unwrap();
        assert_eq!(store.size_bytes(), expected.len() as u64);
        assert!(store.clear().unwrap());
        assert_eq!(store.size_bytes(), 0);
    }
}
