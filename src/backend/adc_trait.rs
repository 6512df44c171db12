//! VoltageSource trait for the hardware collaborator
//!
//! This module provides the common interface for everything that can produce
//! a channel voltage, enabling both the real ADC (via Linux IIO) and the
//! simulated ADC used for bench runs and tests.

use crate::error::Result;
use crate::types::ChannelId;
use std::collections::VecDeque;

/// Size of the rolling window for recent transaction times
const RECENT_WINDOW_SIZE: usize = 100;

/// Statistics for ADC transactions
///
/// Tracks success rates and timing for one channel or for a whole reader.
#[derive(Debug, Clone)]
pub struct AdcStats {
    /// Total number of successful reads
    pub successful_reads: u64,
    /// Total number of failed reads (excluding timeouts)
    pub failed_reads: u64,
    /// Total number of reads that timed out
    pub timeouts: u64,
    /// Total read time in microseconds
    pub total_read_time_us: u64,
    /// Last read time in microseconds
    pub last_read_time_us: u64,
    /// Rolling window of recent read times
    pub recent_read_times: VecDeque<u64>,
}

impl Default for AdcStats {
    fn default() -> Self {
        Self {
            successful_reads: 0,
            failed_reads: 0,
            timeouts: 0,
            total_read_time_us: 0,
            last_read_time_us: 0,
            recent_read_times: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
        }
    }
}

impl AdcStats {
    /// Calculate average read time in microseconds
    pub fn avg_read_time_us(&self) -> f64 {
        if self.successful_reads == 0 {
            0.0
        } else {
            self.total_read_time_us as f64 / self.successful_reads as f64
        }
    }

    /// Calculate success rate as percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.successful_reads + self.failed_reads + self.timeouts;
        if total == 0 {
            100.0
        } else {
            (self.successful_reads as f64 / total as f64) * 100.0
        }
    }

    /// Record a successful read
    pub fn record_success(&mut self, time_us: u64) {
        self.successful_reads += 1;
        self.total_read_time_us += time_us;
        self.last_read_time_us = time_us;

        self.recent_read_times.push_back(time_us);
        if self.recent_read_times.len() > RECENT_WINDOW_SIZE {
            self.recent_read_times.pop_front();
        }
    }

    /// Record a failed read
    pub fn record_failure(&mut self) {
        self.failed_reads += 1;
    }

    /// Record a read that did not answer in time
    pub fn record_timeout(&mut self) {
        self.timeouts += 1;
    }

    /// Calculate jitter (max - min) over the recent window in microseconds
    pub fn jitter_us(&self) -> u64 {
        let min = self.recent_read_times.iter().min().copied().unwrap_or(0);
        let max = self.recent_read_times.iter().max().copied().unwrap_or(0);
        max.saturating_sub(min)
    }
}

/// Unified interface for ADC hardware
///
/// Implementations perform one blocking transaction per call and never
/// retry or average. The channel reader calls them from one thread per
/// channel, so a transaction hanging on one channel must not hold state the
/// other channels need.
///
/// # Example
///
/// ```ignore
/// fn read_all(adc: &dyn VoltageSource, channels: &[ChannelId]) -> Vec<Result<f64>> {
///     channels.iter().map(|c| adc.read_voltage(*c)).collect()
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait VoltageSource: Send + Sync {
    /// Read one instantaneous voltage in millivolts
    fn read_voltage(&self, channel: ChannelId) -> Result<f64>;

    /// Read the raw ADC count, for display only
    ///
    /// Sources without a meaningful raw count return `Ok(None)`.
    fn read_raw(&self, _channel: ChannelId) -> Result<Option<i64>> {
        Ok(None)
    }

    /// Short description for logs
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GasCalError;

    #[test]
    fn test_stats_rates() {
        let mut stats = AdcStats::default();
        assert_eq!(stats.success_rate(), 100.0);

        stats.record_success(100);
        stats.record_success(300);
        stats.record_failure();
        stats.record_timeout();

        assert_eq!(stats.success_rate(), 50.0);
        assert_eq!(stats.avg_read_time_us(), 200.0);
        assert_eq!(stats.jitter_us(), 200);
        assert_eq!(stats.last_read_time_us, 300);
    }

    #[test]
    fn test_recent_window_is_bounded() {
        let mut stats = AdcStats::default();
        for i in 0..(RECENT_WINDOW_SIZE as u64 + 20) {
            stats.record_success(i);
        }
        assert_eq!(stats.recent_read_times.len(), RECENT_WINDOW_SIZE);
        assert_eq!(stats.recent_read_times.front().copied(), Some(20));
    }

    #[test]
    fn test_mock_source() {
        let mut mock = MockVoltageSource::new();
        mock.expect_read_voltage()
            .withf(|c| *c == 3)
            .returning(|_| Ok(412.0));
        mock.expect_read_voltage()
            .withf(|c| *c == 1)
            .returning(|c| Err(GasCalError::hardware(c, "no ack")));

        assert_eq!(mock.read_voltage(3).unwrap(), 412.0);
        assert!(mock.read_voltage(1).unwrap_err().is_hardware_fault());
    }
}
