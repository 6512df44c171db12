//! Calibration engine
//!
//! Recalibration is a two-phase, operator-gated operation:
//!
//! 1. [`CalibrationEngine::propose`] reads the current sample set, computes
//!    a new gain per channel (`reference_pct / millivolts`) and runs the
//!    [`health`] checks against the effective calibration.
//! 2. [`CalibrationEngine::commit`] persists the outcome of the operator's
//!    decision: an accepted record, a rejected record, or nothing.
//!
//! Every request carries a [`Uuid`]; a request that already produced a
//! ledger record (or was declined through this engine) is never applied a
//! second time, so a repeated command from the presentation layer is
//! harmless.
//!
//! # Example
//!
//! ```ignore
//! use gascal_rs::calibration::{CalibrationEngine, CalibrationRequest, Decision};
//!
//! let request = CalibrationRequest::new(20.9);
//! let (proposal, outcome) = engine.calibrate_with(request, |proposal| {
//!     for line in proposal.report_lines() {
//!         println!("{}", line);
//!     }
//!     Decision::Accept
//! })?;
//! ```

pub mod health;

pub use health::{Diagnostic, HealthLimits, Severity};

use crate::config::CalibrationConfig;
use crate::error::{GasCalError, Result};
use crate::store::{CalibrationLedger, ReadingStore};
use crate::types::{
    CalibrationRecord, CalibrationStatus, ChannelGain, ChannelId, Gains, SampleSet,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Placeholder gain used when a channel reads exactly 0 mV
pub const ZERO_SIGNAL_GAIN: f64 = 1.0;

/// Operator request to recalibrate against a reference gas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationRequest {
    /// Unique request identifier
    pub id: Uuid,
    /// Reference gas concentration in percent
    pub reference_pct: f64,
}

impl CalibrationRequest {
    /// Create a request with a fresh identifier
    pub fn new(reference_pct: f64) -> Self {
        Self::with_id(Uuid::new_v4(), reference_pct)
    }

    /// Create a request with a caller-chosen identifier
    pub fn with_id(id: Uuid, reference_pct: f64) -> Self {
        Self { id, reference_pct }
    }
}

/// Computed calibration for one channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelCalibration {
    /// Channel
    pub channel: ChannelId,
    /// Averaged voltage the gain was computed from
    pub millivolts: Option<f64>,
    /// Effective gain before this calibration (0 if never calibrated)
    pub previous_gain: f64,
    /// Newly computed gain
    pub new_gain: f64,
    /// Health findings
    pub diagnostics: Vec<Diagnostic>,
}

impl ChannelCalibration {
    /// Implied voltage at 100% concentration
    pub fn full_scale_mv(&self) -> f64 {
        health::full_scale_mv(self.new_gain)
    }

    /// Check if any finding is an error
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity() == Severity::Error)
    }
}

/// Result of the compute phase, awaiting the operator's decision
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationProposal {
    /// Request this proposal answers
    pub request: CalibrationRequest,
    /// Sample set the gains were computed from
    pub sample: SampleSet,
    /// Per-channel results in sample order
    pub channels: Vec<ChannelCalibration>,
}

impl CalibrationProposal {
    /// Build the ledger record for a decision
    pub fn record(&self, status: CalibrationStatus, timestamp: DateTime<Utc>) -> CalibrationRecord {
        CalibrationRecord {
            timestamp,
            gains: self
                .channels
                .iter()
                .map(|c| ChannelGain {
                    channel: c.channel,
                    gain: c.new_gain,
                })
                .collect(),
            status,
            reference_pct: Some(self.request.reference_pct),
            request_id: Some(self.request.id),
        }
    }

    /// The proposed gains as a lookup
    pub fn gains(&self) -> Gains {
        self.channels.iter().map(|c| (c.channel, c.new_gain)).collect()
    }

    /// All findings with their channel
    pub fn diagnostics(&self) -> impl Iterator<Item = (ChannelId, &Diagnostic)> {
        self.channels
            .iter()
            .flat_map(|c| c.diagnostics.iter().map(move |d| (c.channel, d)))
    }

    /// Check if any channel has an error finding
    pub fn has_errors(&self) -> bool {
        self.channels.iter().any(|c| c.has_errors())
    }

    /// Human-readable summary, one line per channel followed by its findings
    pub fn report_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for c in &self.channels {
            let reading = match c.millivolts {
                Some(mv) => format!("{:.1} mV", mv),
                None => "unavailable".to_string(),
            };
            lines.push(format!(
                "Sensor {}: {}, Gain: {:.4} (old gain {:.4})",
                c.channel, reading, c.new_gain, c.previous_gain
            ));
            for d in &c.diagnostics {
                lines.push(format!("  {}", d));
            }
        }
        lines
    }
}

/// Operator decision on a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Decline,
}

/// What [`CalibrationEngine::commit`] did
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// An accepted record was appended and is now in force
    Accepted(CalibrationRecord),
    /// Declined; the rejected record if one was persisted
    Rejected(Option<CalibrationRecord>),
    /// The request was applied before, nothing was written
    AlreadyApplied,
}

/// Computes, checks and records calibrations
pub struct CalibrationEngine {
    /// Source of the sample to calibrate against
    store: Arc<dyn ReadingStore>,
    /// Ledger of calibration events
    ledger: Arc<CalibrationLedger>,
    /// Health check thresholds
    limits: HealthLimits,
    /// Staleness bound for the sample
    max_sample_age: Duration,
    /// Persist declined calibrations as rejected records
    record_rejections: bool,
    /// Requests declined without a ledger record
    declined: Mutex<HashSet<Uuid>>,
}

impl CalibrationEngine {
    /// Create an engine from the calibration configuration
    pub fn new(
        store: Arc<dyn ReadingStore>,
        ledger: Arc<CalibrationLedger>,
        config: &CalibrationConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            limits: HealthLimits::from(config),
            max_sample_age: config.max_sample_age(),
            record_rejections: config.record_rejections,
            declined: Mutex::new(HashSet::new()),
        }
    }

    /// The ledger this engine appends to
    pub fn ledger(&self) -> &CalibrationLedger {
        &self.ledger
    }

    /// Compute new gains and diagnostics; writes nothing
    pub fn propose(
        &self,
        request: CalibrationRequest,
        now: DateTime<Utc>,
    ) -> Result<CalibrationProposal> {
        let reference = request.reference_pct;
        if !reference.is_finite() || reference <= 0.0 || reference > 100.0 {
            return Err(GasCalError::InvalidReference(reference));
        }

        let sample = self.store.current()?.ok_or(GasCalError::NoSample)?;

        let age = sample.age(now);
        if age > self.max_sample_age {
            tracing::warn!(
                "Refusing calibration {}: sample is {:?} old (limit {:?})",
                request.id,
                age,
                self.max_sample_age
            );
            return Err(GasCalError::StaleSample {
                age,
                limit: self.max_sample_age,
            });
        }

        let previous = self.ledger.current_gains()?;

        let channels = sample
            .readings
            .iter()
            .map(|reading| {
                compute_channel(
                    reading.channel,
                    reading.millivolts,
                    previous.gain(reading.channel),
                    reference,
                    &self.limits,
                )
            })
            .collect();

        let proposal = CalibrationProposal {
            request,
            sample,
            channels,
        };

        for (channel, diagnostic) in proposal.diagnostics() {
            match diagnostic.severity() {
                Severity::Error => tracing::warn!("Channel {}: {}", channel, diagnostic),
                Severity::Warning => tracing::info!("Channel {}: {}", channel, diagnostic),
            }
        }

        Ok(proposal)
    }

    /// Persist the operator's decision on a proposal
    pub fn commit(
        &self,
        proposal: &CalibrationProposal,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        let id = proposal.request.id;

        let mut declined = self
            .declined
            .lock()
            .map_err(|_| GasCalError::Ledger("Request registry poisoned".to_string()))?;
        if declined.contains(&id) {
            tracing::info!("Calibration request {} already declined, ignoring", id);
            return Ok(CommitOutcome::AlreadyApplied);
        }

        match decision {
            Decision::Accept => {
                let record = proposal.record(CalibrationStatus::Accepted, now);
                if !self.ledger.append_once(&record)? {
                    tracing::info!("Calibration request {} already applied, ignoring", id);
                    return Ok(CommitOutcome::AlreadyApplied);
                }
                tracing::info!(
                    "Calibration {} accepted against {:.1}%",
                    id,
                    proposal.request.reference_pct
                );
                Ok(CommitOutcome::Accepted(record))
            }
            Decision::Decline if self.record_rejections => {
                let record = proposal.record(CalibrationStatus::Rejected, now);
                if !self.ledger.append_once(&record)? {
                    tracing::info!("Calibration request {} already applied, ignoring", id);
                    return Ok(CommitOutcome::AlreadyApplied);
                }
                tracing::info!("Calibration {} declined, rejected record kept", id);
                Ok(CommitOutcome::Rejected(Some(record)))
            }
            Decision::Decline => {
                if self.ledger.contains_request(id)? {
                    tracing::info!("Calibration request {} already applied, ignoring", id);
                    return Ok(CommitOutcome::AlreadyApplied);
                }
                declined.insert(id);
                tracing::info!("Calibration {} declined and discarded", id);
                Ok(CommitOutcome::Rejected(None))
            }
        }
    }

    /// Propose, ask the caller, and commit in one go
    pub fn calibrate_with<F>(
        &self,
        request: CalibrationRequest,
        confirm: F,
    ) -> Result<(CalibrationProposal, CommitOutcome)>
    where
        F: FnOnce(&CalibrationProposal) -> Decision,
    {
        let proposal = self.propose(request, Utc::now())?;
        let decision = confirm(&proposal);
        let outcome = self.commit(&proposal, decision, Utc::now())?;
        Ok((proposal, outcome))
    }
}

fn compute_channel(
    channel: ChannelId,
    millivolts: Option<f64>,
    previous_gain: f64,
    reference_pct: f64,
    limits: &HealthLimits,
) -> ChannelCalibration {
    let (new_gain, diagnostics) = match millivolts {
        None => (
            previous_gain,
            vec![Diagnostic::ChannelUnavailable {
                kept_gain: previous_gain,
            }],
        ),
        Some(mv) if mv == 0.0 => (ZERO_SIGNAL_GAIN, vec![Diagnostic::ZeroSignal]),
        Some(mv) => match reference_pct / mv {
            gain if gain.is_finite() => (gain, health::evaluate(previous_gain, gain, limits)),
            _ => (
                previous_gain,
                vec![Diagnostic::InvalidSignal {
                    millivolts: mv,
                    kept_gain: previous_gain,
                }],
            ),
        },
    };

    ChannelCalibration {
        channel,
        millivolts,
        previous_gain,
        new_gain,
        diagnostics,
    }
}
