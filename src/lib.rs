//! # GasCal-RS: Gas Sensor Acquisition and Calibration Store
//!
//! Continuously samples electrochemical gas sensors through an ADC, publishes
//! averaged readings for any number of independent readers, and keeps an
//! append-only ledger of operator-confirmed calibrations.
//!
//! ## Architecture
//!
//! - **Backend**: Acquisition loop in a worker thread, with one ADC lane
//!   thread per channel so every transaction can time out
//! - **Store**: Single-slot reading store and JSON Lines calibration ledger,
//!   shared between processes (the ledger appends under a file lock)
//! - **Calibration**: Two-phase propose/commit engine with drift and
//!   low-signal health checks
//! - **Communication**: Crossbeam channels between the worker and its
//!   controller
//!
//! ## Data directory
//!
//! `sample_set.json` and `calibration.jsonl` live in the platform data
//! directory under `dev.gascal.gascal-rs` unless `storage.data_dir` is set:
//!
//! - **Linux**: `~/.local/share/dev.gascal.gascal-rs/`
//! - **macOS**: `~/Library/Application Support/dev.gascal.gascal-rs/`
//! - **Windows**: `%APPDATA%\dev.gascal.gascal-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use gascal_rs::{
//!     backend::{AcquisitionService, SimulatedAdc},
//!     calibration::Decision,
//!     config::AppConfig,
//!     Instrument,
//! };
//!
//! let config = AppConfig::default();
//! let instrument = Instrument::open(config.clone())?;
//!
//! let (service, handle) = AcquisitionService::new(
//!     config,
//!     Box::new(SimulatedAdc::reference_instrument()),
//!     instrument.store(),
//! );
//! std::thread::spawn(move || service.run());
//!
//! // Later, with the sensors in air
//! let proposal = instrument.request_calibration(20.9)?;
//! instrument.decide(&proposal, Decision::Accept)?;
//! println!("{}", instrument.readout()?.unwrap());
//! ```

pub mod backend;
pub mod calibration;
pub mod config;
pub mod error;
pub mod instrument;
pub mod readout;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use backend::{AcquisitionCommand, AcquisitionEvent, AcquisitionService, VoltageSource};
pub use calibration::{CalibrationEngine, CalibrationRequest, CommitOutcome, Decision};
pub use config::AppConfig;
pub use error::{GasCalError, Result};
pub use instrument::Instrument;
pub use readout::Readout;
pub use store::{CalibrationLedger, FileReadingStore, MemoryReadingStore, ReadingStore};
pub use types::{CalibrationRecord, CalibrationStatus, ChannelReading, Gains, SampleSet};
