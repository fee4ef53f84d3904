use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::store::{RecordStore, Row};

/// Every table of the record store, as persisted on disk.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Workbook {
    pub tables: BTreeMap<String, Vec<Row>>,
}

pub fn save_workbook(workbook: &Workbook, filename: &Path) -> Result<(), StoreError> {
    // write next to the target and rename, so readers never see half a file
    let tmp = filename.with_extension("tmp");
    {
        let file = File::create(&tmp)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut writer = std::io::BufWriter::new(encoder);

        serialize_into(&mut writer, workbook).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let encoder = writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        encoder.finish()?.flush()?;
    }
    fs::rename(&tmp, filename)?;

    Ok(())
}

pub fn load_workbook(filename: &Path) -> Result<Workbook, StoreError> {
    if !filename.exists() {
        return Ok(Workbook::default());
    }
    let file = File::open(filename)?;
    let decoder = GzDecoder::new(file);
    let mut reader = std::io::BufReader::new(decoder);

    let workbook: Workbook =
        deserialize_from(&mut reader).map_err(|e| StoreError::Corrupt(e.to_string()))?;

    Ok(workbook)
}

/// Record store persisted as a single gzip-compressed workbook file.
///
/// Every call re-reads the file, so separate processes sharing the file see
/// each other's appends. Within one process the mutex serializes
/// read-modify-write cycles.
#[derive(Debug)]
pub struct WorkbookStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl WorkbookStore {
    /// Open (or lazily create) the workbook at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(WorkbookStore {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn modify<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Workbook),
    {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Unavailable("workbook lock poisoned".to_string()))?;
        let mut workbook = load_workbook(&self.path)?;
        change(&mut workbook);
        save_workbook(&workbook, &self.path)
    }
}

impl RecordStore for WorkbookStore {
    fn read_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Unavailable("workbook lock poisoned".to_string()))?;
        let mut workbook = load_workbook(&self.path)?;
        Ok(workbook.tables.remove(table).unwrap_or_default())
    }

    fn append(&self, table: &str, row: Row) -> Result<(), StoreError> {
        self.modify(|wb| wb.tables.entry(table.to_string()).or_default().push(row))
    }

    fn clear_and_rewrite(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError> {
        self.modify(|wb| {
            wb.tables.insert(table.to_string(), rows);
        })
    }
}
