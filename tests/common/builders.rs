//! Test data builders for creating test objects

use chrono::{DateTime, Utc};
use gascal_rs::config::{AcquisitionConfig, AppConfig};
use gascal_rs::types::{CalibrationRecord, CalibrationStatus, ChannelGain, ChannelReading, SampleSet};

/// Builder for sample sets
pub struct SampleSetBuilder {
    timestamp: DateTime<Utc>,
    readings: Vec<ChannelReading>,
}

impl SampleSetBuilder {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            readings: Vec::new(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn aged(mut self, age: chrono::Duration) -> Self {
        self.timestamp = Utc::now() - age;
        self
    }

    pub fn channel(mut self, channel: u8, millivolts: f64) -> Self {
        self.readings.push(ChannelReading::available(channel, millivolts));
        self
    }

    pub fn unavailable(mut self, channel: u8) -> Self {
        self.readings.push(ChannelReading::unavailable(channel));
        self
    }

    pub fn build(self) -> SampleSet {
        SampleSet::new(self.timestamp, self.readings)
    }
}

/// Builder for ledger records
pub struct RecordBuilder {
    gains: Vec<ChannelGain>,
    status: CalibrationStatus,
}

impl RecordBuilder {
    pub fn accepted() -> Self {
        Self {
            gains: Vec::new(),
            status: CalibrationStatus::Accepted,
        }
    }

    pub fn rejected() -> Self {
        Self {
            gains: Vec::new(),
            status: CalibrationStatus::Rejected,
        }
    }

    pub fn gain(mut self, channel: u8, gain: f64) -> Self {
        self.gains.push(ChannelGain { channel, gain });
        self
    }

    pub fn build(self) -> CalibrationRecord {
        CalibrationRecord::new(Utc::now(), self.gains, self.status)
    }
}

/// Reference instrument configuration with a fast acquisition cycle
pub fn fast_config(data_dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.acquisition = AcquisitionConfig {
        cycle_ms: 30,
        sub_samples: 3,
        channel_timeout_ms: 20,
    };
    config.storage.data_dir = Some(data_dir.to_path_buf());
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_set_builder() {
        let set = SampleSetBuilder::new()
            .channel(0, 500.0)
            .unavailable(3)
            .build();

        assert_eq!(set.millivolts(0), Some(500.0));
        assert!(!set.readings[1].is_available());
    }

    #[test]
    fn test_record_builder() {
        let record = RecordBuilder::rejected().gain(0, 0.04).build();
        assert!(!record.is_accepted());
        assert_eq!(record.gain_table().gain(0), 0.04);
    }
}
