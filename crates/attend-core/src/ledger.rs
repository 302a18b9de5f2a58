//! Append-only attendance ledger.
//!
//! Every `mark_if_absent` re-reads the whole store, so dedup always agrees
//! with what is durable, including records written by an earlier run. There is
//! no locking: one writer at a time is assumed.

use chrono::{Local, NaiveDateTime};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_LEDGER_PATH: &str = "attendance.csv";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NAME_FIELD: &str = "name";
const TIMESTAMP_FIELD: &str = "timestamp";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger io: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("ledger {0} has no `name` column")]
    MissingColumn(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub name: String,
    /// Local time, formatted with [`TIMESTAMP_FORMAT`].
    pub timestamp: String,
}

/// Durable backing for the ledger.
pub trait LedgerStore {
    /// Every record currently persisted, in write order.
    fn load(&self) -> Result<Vec<AttendanceRecord>, LedgerError>;

    fn append(&mut self, record: &AttendanceRecord) -> Result<(), LedgerError>;
}

/// Source of "now" for timestamps.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

pub struct AttendanceLedger<S, C = SystemClock> {
    store: S,
    clock: C,
}

impl<S: LedgerStore> AttendanceLedger<S, SystemClock> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: LedgerStore, C: Clock> AttendanceLedger<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    /// Record `name` unless the ledger already holds it.
    ///
    /// Returns `true` if a record was written.
    pub fn mark_if_absent(&mut self, name: &str) -> Result<bool, LedgerError> {
        if self.store.load()?.iter().any(|r| r.name == name) {
            tracing::debug!(name, "already marked");
            return Ok(false);
        }

        let record = AttendanceRecord {
            name: name.to_string(),
            timestamp: self.clock.now().format(TIMESTAMP_FORMAT).to_string(),
        };
        self.store.append(&record)?;

        tracing::info!(name, timestamp = %record.timestamp, "attendance recorded");
        Ok(true)
    }

    pub fn records(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        self.store.load()
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// CSV file with a `name,timestamp` header. Rows are appended in whatever
/// column order the existing header uses.
#[derive(Debug, Clone)]
pub struct CsvLedgerStore {
    path: PathBuf,
}

impl CsvLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reader over an existing, non-empty ledger file.
    fn reader(&self) -> Result<Option<csv::Reader<fs::File>>, LedgerError> {
        if !self.path.exists() || fs::metadata(&self.path)?.len() == 0 {
            return Ok(None);
        }
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;
        Ok(Some(reader))
    }
}

impl Default for CsvLedgerStore {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_PATH)
    }
}

impl LedgerStore for CsvLedgerStore {
    fn load(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let Some(mut reader) = self.reader()? else {
            return Ok(Vec::new());
        };

        let headers = reader.headers()?.clone();
        let name_idx = headers
            .iter()
            .position(|h| h == NAME_FIELD)
            .ok_or_else(|| LedgerError::MissingColumn(self.path.clone()))?;
        let ts_idx = headers.iter().position(|h| h == TIMESTAMP_FIELD);

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let Some(name) = row.get(name_idx) else {
                continue;
            };
            records.push(AttendanceRecord {
                name: name.to_string(),
                timestamp: ts_idx.and_then(|i| row.get(i)).unwrap_or_default().to_string(),
            });
        }
        Ok(records)
    }

    fn append(&mut self, record: &AttendanceRecord) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let headers = match self.reader()? {
            Some(mut reader) => Some(reader.headers()?.clone()),
            None => None,
        };

        // Buffer the header and row so they reach the file in one write.
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        match &headers {
            Some(headers) => {
                let row = fields_in_header_order(headers, record)
                    .ok_or_else(|| LedgerError::MissingColumn(self.path.clone()))?;
                writer.write_record(&row)?;
            }
            None => {
                writer.write_record([NAME_FIELD, TIMESTAMP_FIELD])?;
                writer.write_record([record.name.as_str(), record.timestamp.as_str()])?;
            }
        }
        writer.flush()?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        let mut bytes = Vec::with_capacity(writer.get_ref().len() + 1);
        if headers.is_some() && !ends_with_newline(&mut file)? {
            bytes.push(b'\n');
        }
        bytes.extend_from_slice(writer.get_ref());

        file.write_all(&bytes)?;
        file.flush()?;
        Ok(())
    }
}

/// Lay `record` out in the file's column order. `None` if there is no `name` column.
fn fields_in_header_order<'r>(headers: &csv::StringRecord, record: &'r AttendanceRecord) -> Option<Vec<&'r str>> {
    headers.iter().position(|h| h == NAME_FIELD)?;
    let row = headers
        .iter()
        .map(|h| match h {
            NAME_FIELD => record.name.as_str(),
            TIMESTAMP_FIELD => record.timestamp.as_str(),
            _ => "",
        })
        .collect();
    Some(row)
}

fn ends_with_newline(file: &mut fs::File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// In-memory ledger, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    records: Vec<AttendanceRecord>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        Ok(self.records.clone())
    }

    fn append(&mut self, record: &AttendanceRecord) -> Result<(), LedgerError> {
        self.records.push(record.clone());
        Ok(())
    }
}
