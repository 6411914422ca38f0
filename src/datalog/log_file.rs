// src/datalog/log_file.rs
//
// CSV data log on disk.
// Layout: header row `timestamp,field1,...`, then one row per record:
// `DD-MM-YYYY HH:MM:SS.mmm,<raw values>`.
// Every appended record is flushed and synced before append returns.

use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::schema::Schema;
use crate::error::LogFileError;

/// Row timestamp, millisecond precision
pub const ROW_TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S%.3f";

/// File name timestamp, second precision
pub const FILE_TIME_FORMAT: &str = "%d-%m-%Y_%H%M%S";

pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format(ROW_TIME_FORMAT).to_string()
}

// ============================================================================
// Naming
// ============================================================================

/// Where log files go and what they are called: `{dir}/{prefix}_{DD-MM-YYYY_HHMMSS}.csv`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogNaming {
    pub dir: PathBuf,
    pub prefix: String,
}

impl LogNaming {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn file_name(&self, at: &DateTime<Local>) -> String {
        format!("{}_{}.csv", self.prefix, at.format(FILE_TIME_FORMAT))
    }

    /// Path for a file created at `at` that does not clash with an existing
    /// file or with `avoid`. Clashes get `_1`, `_2`, ... before the extension.
    pub fn fresh_path(&self, at: &DateTime<Local>, avoid: Option<&Path>) -> PathBuf {
        let stem = format!("{}_{}", self.prefix, at.format(FILE_TIME_FORMAT));
        let taken = |p: &Path| p.exists() || avoid.map_or(false, |a| a == p);

        let mut candidate = self.dir.join(format!("{}.csv", stem));
        let mut n = 1;
        while taken(&candidate) {
            candidate = self.dir.join(format!("{}_{}.csv", stem, n));
            n += 1;
        }
        candidate
    }
}

// ============================================================================
// Log File
// ============================================================================

pub struct LogFile {
    path: PathBuf,
    writer: csv::Writer<File>,
    schema: Schema,
    data_rows: u64,
}

impl LogFile {
    /// Create a new timestamped file under `naming` and write the header.
    pub fn create(naming: &LogNaming, schema: &Schema) -> Result<Self, LogFileError> {
        Self::create_avoiding(naming, schema, None)
    }

    pub(crate) fn create_avoiding(
        naming: &LogNaming,
        schema: &Schema,
        avoid: Option<&Path>,
    ) -> Result<Self, LogFileError> {
        let path = naming.fresh_path(&Local::now(), avoid);
        Self::create_at(path, schema)
    }

    /// Create `path` and write the header for `schema`. Fails if `path` exists.
    pub fn create_at(path: PathBuf, schema: &Schema) -> Result<Self, LogFileError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| LogFileError::io("creating", &path, source))?;

        let writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(file);

        let mut log = LogFile {
            path,
            writer,
            schema: schema.clone(),
            data_rows: 0,
        };
        log.write_header()?;
        log.flush()?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Data rows written to this file (header excluded)
    pub fn data_rows(&self) -> u64 {
        self.data_rows
    }

    /// Replace the header of a file that has no data rows yet.
    pub(crate) fn rewrite_header(&mut self, schema: &Schema) -> Result<(), LogFileError> {
        self.writer
            .flush()
            .map_err(|source| LogFileError::io("flushing", &self.path, source))?;

        // The duplicate shares the file offset with the writer's handle
        let mut file = self
            .writer
            .get_ref()
            .try_clone()
            .map_err(|source| LogFileError::io("truncating", &self.path, source))?;
        file.set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)).map(|_| ()))
            .map_err(|source| LogFileError::io("truncating", &self.path, source))?;

        self.schema = schema.clone();
        self.write_header()?;
        self.flush()
    }

    /// Append one record as `[timestamp, values...]` and make it durable.
    pub fn append_record(&mut self, timestamp: &str, values: &[String]) -> Result<(), LogFileError> {
        self.writer
            .write_record(std::iter::once(timestamp).chain(values.iter().map(String::as_str)))
            .map_err(|source| LogFileError::csv("writing row to", &self.path, source))?;
        self.data_rows += 1;
        self.flush()
    }

    /// Write a complete row without flushing (bulk transfer during migration)
    pub(crate) fn write_row(&mut self, row: &[String]) -> Result<(), LogFileError> {
        self.writer
            .write_record(row)
            .map_err(|source| LogFileError::csv("writing row to", &self.path, source))?;
        self.data_rows += 1;
        Ok(())
    }

    /// Push buffered rows to the OS and sync file data to storage.
    pub fn flush(&mut self) -> Result<(), LogFileError> {
        self.writer
            .flush()
            .map_err(|source| LogFileError::io("flushing", &self.path, source))?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|source| LogFileError::io("syncing", &self.path, source))
    }

    /// Flush and close, returning the file's path.
    pub fn close(mut self) -> Result<PathBuf, LogFileError> {
        self.flush()?;
        Ok(self.path)
    }

    fn write_header(&mut self) -> Result<(), LogFileError> {
        self.writer
            .write_record(self.schema.field_names())
            .map_err(|source| LogFileError::csv("writing header to", &self.path, source))
    }
}

/// Read every data row (header excluded) of a log file.
pub fn read_data_rows(path: &Path) -> Result<Vec<Vec<String>>, LogFileError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|source| LogFileError::csv("opening", path, source))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| LogFileError::csv("reading", path, source))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}
