//! CSV persistence for record tables.

use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tracing::{info, warn};

use crate::{
    error::StoreError,
    types::{RecordKind, RecordSet},
};

/// Destination for normalized record sets.
pub trait RecordSink {
    fn write(&mut self, records: &RecordSet) -> Result<(), StoreError>;

    /// Discards any previously stored table of `kind` so a failed run
    /// cannot leave stale rows behind.
    fn invalidate(&mut self, kind: RecordKind) -> Result<(), StoreError>;
}

/// Writes one CSV file per record kind into a directory.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, kind: RecordKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }
}

impl RecordSink for CsvSink {
    fn write(&mut self, records: &RecordSet) -> Result<(), StoreError> {
        let kind = records.kind();
        let path = self.path_for(kind);
        match records {
            RecordSet::PrsOpened(rows) => write_table(&path, kind.columns(), rows)?,
            RecordSet::PrsClosed(rows) => write_table(&path, kind.columns(), rows)?,
            RecordSet::PrsMerged(rows) => write_table(&path, kind.columns(), rows)?,
            RecordSet::IssuesOpened(rows) => write_table(&path, kind.columns(), rows)?,
            RecordSet::IssuesClosed(rows) => write_table(&path, kind.columns(), rows)?,
        }
        info!(path = %path.display(), rows = records.len(), "Wrote {kind}");
        Ok(())
    }

    fn invalidate(&mut self, kind: RecordKind) -> Result<(), StoreError> {
        let path = self.path_for(kind);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                warn!(path = %path.display(), "Removed stale {kind} table");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

fn csv_error(path: &Path, source: csv::Error) -> StoreError {
    StoreError::Csv {
        path: path.display().to_string(),
        source,
    }
}

/// Writes `rows` under an explicit header so empty tables still carry
/// their columns.
pub fn write_table<T: Serialize>(
    path: &Path,
    columns: &[&str],
    rows: &[T],
) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    writer.write_record(columns).map_err(|e| csv_error(path, e))?;
    for row in rows {
        writer.serialize(row).map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;

    Ok(())
}

/// Reads a table written by [`write_table`].
///
/// A missing or zero-byte file reads as an empty table.
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => return Ok(Vec::new()),
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    }

    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| csv_error(path, e))
}
