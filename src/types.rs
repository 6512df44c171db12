//! Core data types for gascal-rs
//!
//! This module contains the values exchanged between the acquisition loop,
//! the stores and the calibration engine. Everything here is plain data and
//! serializes to the persisted layouts described in [`crate::store`].

use crate::backend::AdcStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// ADC input number identifying a sensor channel
pub type ChannelId = u8;

/// One channel's averaged voltage within a sample set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelReading {
    /// Channel the value was read from
    pub channel: ChannelId,
    /// Averaged voltage in millivolts, `None` when the channel faulted for the
    /// whole cycle
    pub millivolts: Option<f64>,
    /// Raw ADC count from the end of the cycle, when the source reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_count: Option<i64>,
}

impl ChannelReading {
    /// A reading with a valid voltage
    pub fn available(channel: ChannelId, millivolts: f64) -> Self {
        Self {
            channel,
            millivolts: Some(millivolts),
            raw_count: None,
        }
    }

    /// The sentinel for a channel that produced no data this cycle
    pub fn unavailable(channel: ChannelId) -> Self {
        Self {
            channel,
            millivolts: None,
            raw_count: None,
        }
    }

    /// Attach the raw ADC count
    pub fn with_raw_count(mut self, raw_count: Option<i64>) -> Self {
        self.raw_count = raw_count;
        self
    }

    /// Check if the channel produced data
    pub fn is_available(&self) -> bool {
        self.millivolts.is_some()
    }
}

/// One timestamped batch of per-channel averaged readings
///
/// Channel order matches the configured channel list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    /// End of the acquisition cycle that produced the set
    pub timestamp: DateTime<Utc>,
    /// Readings in configured channel order
    pub readings: Vec<ChannelReading>,
}

impl SampleSet {
    /// Create a new sample set
    pub fn new(timestamp: DateTime<Utc>, readings: Vec<ChannelReading>) -> Self {
        Self {
            timestamp,
            readings,
        }
    }

    /// Time elapsed between the sample timestamp and `now`
    ///
    /// A timestamp in the future (clock adjustments) counts as zero age.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }

    /// Voltage for a channel, `None` if unknown or unavailable
    pub fn millivolts(&self, channel: ChannelId) -> Option<f64> {
        self.readings
            .iter()
            .find(|r| r.channel == channel)
            .and_then(|r| r.millivolts)
    }

    /// Channels in this set, in order
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.readings.iter().map(|r| r.channel)
    }
}

/// Acceptance status of a calibration record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationStatus {
    /// Confirmed by the operator, in force until superseded
    Accepted,
    /// Declined by the operator, kept for audit only
    Rejected,
}

impl std::fmt::Display for CalibrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationStatus::Accepted => write!(f, "accepted"),
            CalibrationStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Gain of one channel within a calibration record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelGain {
    /// Channel the gain applies to
    pub channel: ChannelId,
    /// Percent per millivolt
    pub gain: f64,
}

/// One calibration event in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// When the record was created
    pub timestamp: DateTime<Utc>,
    /// Gains in configured channel order
    pub gains: Vec<ChannelGain>,
    /// Whether the operator accepted the calibration
    pub status: CalibrationStatus,
    /// Reference gas concentration used, in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_pct: Option<f64>,
    /// Request that produced this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

impl CalibrationRecord {
    /// Create a record without request metadata
    pub fn new(
        timestamp: DateTime<Utc>,
        gains: Vec<ChannelGain>,
        status: CalibrationStatus,
    ) -> Self {
        Self {
            timestamp,
            gains,
            status,
            reference_pct: None,
            request_id: None,
        }
    }

    /// Check if the record is in force-eligible state
    pub fn is_accepted(&self) -> bool {
        self.status == CalibrationStatus::Accepted
    }

    /// The gains as a channel lookup
    pub fn gain_table(&self) -> Gains {
        Gains(self.gains.iter().map(|g| (g.channel, g.gain)).collect())
    }
}

/// Effective gains by channel
///
/// A channel missing from the table has gain 0: readings are shown but the
/// concentration is unknown until the first calibration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gains(BTreeMap<ChannelId, f64>);

impl Gains {
    /// An empty table (no accepted calibration)
    pub fn new() -> Self {
        Self::default()
    }

    /// Gain for a channel, 0 when never calibrated
    pub fn gain(&self, channel: ChannelId) -> f64 {
        self.0.get(&channel).copied().unwrap_or(0.0)
    }

    /// Concentration in percent for a raw voltage
    pub fn concentration(&self, channel: ChannelId, millivolts: f64) -> f64 {
        millivolts * self.gain(channel)
    }

    /// Number of calibrated channels
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no channel is calibrated
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(channel, gain)` pairs in channel order
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, f64)> + '_ {
        self.0.iter().map(|(c, g)| (*c, *g))
    }
}

impl FromIterator<(ChannelId, f64)> for Gains {
    fn from_iter<I: IntoIterator<Item = (ChannelId, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Acquisition loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    /// Paused, nothing is published
    Idle,
    /// Publishing one sample set per cycle
    #[default]
    Sampling,
}

impl std::fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionState::Idle => write!(f, "Idle"),
            AcquisitionState::Sampling => write!(f, "Sampling"),
        }
    }
}

/// Statistics about the acquisition loop
#[derive(Debug, Clone, Default)]
pub struct AcquisitionStats {
    /// Number of sample sets published
    pub cycles_published: u64,
    /// Number of publishes that failed
    pub publish_failures: u64,
    /// Number of successful channel sub-reads
    pub successful_reads: u64,
    /// Number of failed channel sub-reads (including timeouts)
    pub failed_reads: u64,
    /// Number of channel slots published as unavailable
    pub unavailable_channels: u64,
    /// Duration of the last cycle in milliseconds
    pub last_cycle_ms: f64,
    /// Number of events dropped due to queue backpressure
    pub dropped_events: u64,
    /// Transaction statistics per channel
    pub channels: BTreeMap<ChannelId, AdcStats>,
}

impl AcquisitionStats {
    /// Calculate the sub-read success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.successful_reads + self.failed_reads;
        if total == 0 {
            100.0
        } else {
            (self.successful_reads as f64 / total as f64) * 100.0
        }
    }
}
