//! Shared state between the acquisition loop, the calibration engine and
//! any independent reader
//!
//! Two stores make up the contract between processes:
//!
//! - [`ReadingStore`] - single-slot holder of the latest [`SampleSet`].
//!   [`FileReadingStore`] replaces `sample_set.json` atomically (temp file +
//!   rename), [`MemoryReadingStore`] keeps it in process.
//! - [`CalibrationLedger`] - append-only `calibration.jsonl`, one record per
//!   line. The effective calibration is always derived by scanning it.
//!
//! Neither store takes a lock that another process has to honour. Readers
//! see either the state before or after a write, never a mix.
//!
//! # Layout
//!
//! ```text
//! sample_set.json     {"timestamp":"2025-03-01T12:00:00Z","readings":[{"channel":0,"millivolts":500.1}, ...]}
//! calibration.jsonl   {"timestamp":...,"gains":[{"channel":0,"gain":0.0418}],"status":"accepted",...}
//! ```

pub mod ledger;
pub mod reading;

pub use ledger::CalibrationLedger;
pub use reading::{FileReadingStore, MemoryReadingStore};

use crate::error::Result;
use crate::types::SampleSet;

/// Single-slot store for the current sample set
///
/// `publish` must be atomic with respect to `current`: a reader observes
/// either the previous set or the new one in full.
pub trait ReadingStore: Send + Sync {
    /// Install a new current sample set
    fn publish(&self, sample: &SampleSet) -> Result<()>;

    /// The most recently published set, `None` before the first publish
    fn current(&self) -> Result<Option<SampleSet>>;
}

impl<T: ReadingStore + ?Sized> ReadingStore for std::sync::Arc<T> {
    fn publish(&self, sample: &SampleSet) -> Result<()> {
        (**self).publish(sample)
    }

    fn current(&self) -> Result<Option<SampleSet>> {
        (**self).current()
    }
}
