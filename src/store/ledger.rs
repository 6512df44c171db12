//! Append-only calibration ledger
//!
//! Records are stored one JSON object per line, oldest first. A line only
//! counts once its terminating newline is on disk, so a reader racing an
//! append sees either the whole record or nothing.
//!
//! Writers take an exclusive advisory lock on the file for the duration of
//! an append. Under that lock an unterminated tail left by a crashed writer
//! is cut off, and a write that fails is truncated away again, so a failed
//! append never becomes a valid record later.

use crate::error::{GasCalError, Result};
use crate::types::{CalibrationRecord, Gains};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// Calibration ledger stored as JSON Lines
#[derive(Debug)]
pub struct CalibrationLedger {
    path: PathBuf,
    /// Serialises appends made through this handle
    append_lock: Mutex<()>,
}

impl CalibrationLedger {
    /// Open a ledger at a path; the file is created on first append
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_lock: Mutex::new(()),
        }
    }

    /// Path of the ledger file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record; durable when this returns `Ok`
    pub fn append(&self, record: &CalibrationRecord) -> Result<()> {
        self.write_record(record, None).map(|_| ())
    }

    /// Append a record unless its request already has one
    ///
    /// The lookup and the write happen under the same exclusive lock, so any
    /// number of handles and processes record a request id at most once.
    /// Returns false, writing nothing, when an earlier record was found.
    pub fn append_once(&self, record: &CalibrationRecord) -> Result<bool> {
        self.write_record(record, record.request_id)
    }

    fn write_record(&self, record: &CalibrationRecord, request_id: Option<Uuid>) -> Result<bool> {
        if let Some(gain) = record.gains.iter().find(|g| !g.gain.is_finite()) {
            return Err(GasCalError::Ledger(format!(
                "Refusing to record non-finite gain {} for channel {}",
                gain.gain, gain.channel
            )));
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| GasCalError::Ledger("Append lock poisoned".to_string()))?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.ledger_error("open", e))?;

        // Released when `file` is closed
        file.lock().map_err(|e| self.ledger_error("lock", e))?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| self.ledger_error("read", e))?;

        let valid_len = complete_len(&bytes);
        if valid_len < bytes.len() {
            tracing::warn!(
                "Ledger {} ends with {} bytes of an incomplete record, discarding them",
                self.path.display(),
                bytes.len() - valid_len
            );
            file.set_len(valid_len as u64)
                .map_err(|e| self.ledger_error("truncate", e))?;
        }

        if let Some(id) = request_id {
            let seen = parse_records(&bytes[..valid_len])
                .iter()
                .any(|r| r.request_id == Some(id));
            if seen {
                tracing::debug!("Ledger already holds a record for request {}", id);
                return Ok(false);
            }
        }

        if let Err(e) = write_line(&mut file, valid_len as u64, &line) {
            // Take the partial or unsynced record back out
            if let Err(undo) = file.set_len(valid_len as u64) {
                tracing::error!(
                    "Failed to roll back ledger {} after a failed append: {}",
                    self.path.display(),
                    undo
                );
            }
            return Err(self.ledger_error("append to", e));
        }

        tracing::info!(
            "Appended {} calibration record ({} channels) to {}",
            record.status,
            record.gains.len(),
            self.path.display()
        );
        Ok(true)
    }

    fn ledger_error(&self, action: &str, e: std::io::Error) -> GasCalError {
        GasCalError::Ledger(format!("Failed to {} {}: {}", action, self.path.display(), e))
    }

    /// All valid records, oldest first
    ///
    /// Unparseable lines and an unterminated tail are skipped.
    pub fn history(&self) -> Result<Vec<CalibrationRecord>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(GasCalError::Ledger(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        Ok(parse_records(&bytes))
    }

    /// Gains of the newest accepted record, empty if there is none
    pub fn current_gains(&self) -> Result<Gains> {
        Ok(self
            .latest_accepted()?
            .map(|r| r.gain_table())
            .unwrap_or_default())
    }

    /// The newest accepted record
    pub fn latest_accepted(&self) -> Result<Option<CalibrationRecord>> {
        Ok(self.history()?.into_iter().rev().find(|r| r.is_accepted()))
    }

    /// Number of valid records
    pub fn len(&self) -> Result<usize> {
        Ok(self.history()?.len())
    }

    /// Check if the ledger holds no valid record
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Check if a request already produced a record
    pub fn contains_request(&self, request_id: Uuid) -> Result<bool> {
        Ok(self
            .history()?
            .iter()
            .any(|r| r.request_id == Some(request_id)))
    }
}

/// Parse newline-terminated records, skipping anything malformed
pub(crate) fn parse_records(bytes: &[u8]) -> Vec<CalibrationRecord> {
    let mut records = Vec::new();
    let mut lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();

    // Everything after the last newline is not a complete record
    if let Some(tail) = lines.pop() {
        if !tail.iter().all(u8::is_ascii_whitespace) {
            tracing::warn!("Ignoring unterminated ledger tail ({} bytes)", tail.len());
        }
    }

    for (index, line) in lines.into_iter().enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<CalibrationRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("Skipping malformed ledger line {}: {}", index + 1, e),
        }
    }

    records
}

/// Length of the prefix made of complete, newline-terminated lines
fn complete_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i + 1)
}

fn write_line(file: &mut File, offset: u64, line: &[u8]) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(line)?;
    file.sync_data()
}
