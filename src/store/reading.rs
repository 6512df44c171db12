//! Reading store implementations

use crate::error::{GasCalError, Result, ResultExt};
use crate::types::SampleSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tempfile::NamedTempFile;

use super::ReadingStore;

/// Reading store backed by a JSON file
///
/// Every publish writes a complete document to a temporary file in the same
/// directory and renames it over the live file, so another process opening
/// the path gets one whole document.
#[derive(Debug, Clone)]
pub struct FileReadingStore {
    path: PathBuf,
}

impl FileReadingStore {
    /// Create a store for a file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the live file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

impl ReadingStore for FileReadingStore {
    fn publish(&self, sample: &SampleSet) -> Result<()> {
        let bytes = serde_json::to_vec(sample)?;

        let mut tmp = NamedTempFile::new_in(self.dir())
            .map_err(|e| GasCalError::Store(format!("Failed to create temp file: {}", e)))?;
        tmp.write_all(&bytes).context("Failed to write sample set")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to sync sample set")?;

        tmp.persist(&self.path).map_err(|e| {
            GasCalError::Store(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e.error
            ))
        })?;

        tracing::trace!("Published sample set to {}", self.path.display());
        Ok(())
    }

    fn current(&self) -> Result<Option<SampleSet>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            GasCalError::Store(format!("Corrupt reading file {}: {}", self.path.display(), e))
        })
    }
}

/// In-process reading store
///
/// Readers get their own copy of the sample set; publishing swaps the shared
/// pointer under a write lock.
#[derive(Debug, Default)]
pub struct MemoryReadingStore {
    slot: RwLock<Option<Arc<SampleSet>>>,
}

impl MemoryReadingStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadingStore for MemoryReadingStore {
    fn publish(&self, sample: &SampleSet) -> Result<()> {
        let next = Arc::new(sample.clone());
        let mut slot = self
            .slot
            .write()
            .map_err(|_| GasCalError::Store("Reading slot poisoned".to_string()))?;
        *slot = Some(next);
        Ok(())
    }

    fn current(&self) -> Result<Option<SampleSet>> {
        let slot = self
            .slot
            .read()
            .map_err(|_| GasCalError::Store("Reading slot poisoned".to_string()))?;
        Ok(slot.as_deref().cloned())
    }
}
