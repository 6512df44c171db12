//! Presentation values for the current reading
//!
//! A [`Readout`] joins the latest sample set with the effective gains. It is
//! computed on demand; nothing here is cached between calls, so a newly
//! accepted calibration shows up on the next read.

use crate::config::AppConfig;
use crate::types::{ChannelId, Gains, SampleSet};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// One channel of a readout
#[derive(Debug, Clone, PartialEq)]
pub struct ReadoutRow {
    pub channel: ChannelId,
    pub label: String,
    /// Averaged voltage, `None` if the channel was unavailable
    pub millivolts: Option<f64>,
    pub raw_count: Option<i64>,
    /// Effective gain, 0 when never calibrated
    pub gain: f64,
    /// `millivolts * gain`, `None` if the channel was unavailable
    pub concentration_pct: Option<f64>,
}

impl ReadoutRow {
    /// Check if the channel has an accepted calibration
    pub fn is_calibrated(&self) -> bool {
        self.gain != 0.0
    }
}

/// Current reading with concentrations
#[derive(Debug, Clone, PartialEq)]
pub struct Readout {
    /// Timestamp of the underlying sample set
    pub timestamp: DateTime<Utc>,
    /// Age of the sample set when the readout was computed
    pub age: Duration,
    pub rows: Vec<ReadoutRow>,
}

impl Readout {
    /// Combine a sample set with the effective gains
    pub fn compute(sample: &SampleSet, gains: &Gains, config: &AppConfig, now: DateTime<Utc>) -> Self {
        let rows = sample
            .readings
            .iter()
            .map(|reading| {
                let gain = gains.gain(reading.channel);
                ReadoutRow {
                    channel: reading.channel,
                    label: config.channel_label(reading.channel),
                    millivolts: reading.millivolts,
                    raw_count: reading.raw_count,
                    gain,
                    concentration_pct: reading
                        .millivolts
                        .map(|mv| gains.concentration(reading.channel, mv)),
                }
            })
            .collect();

        Self {
            timestamp: sample.timestamp,
            age: sample.age(now),
            rows,
        }
    }

    /// Row for a channel
    pub fn row(&self, channel: ChannelId) -> Option<&ReadoutRow> {
        self.rows.iter().find(|r| r.channel == channel)
    }

    /// Check if the sample is older than `limit`
    pub fn is_stale(&self, limit: Duration) -> bool {
        self.age > limit
    }
}

impl fmt::Display for Readout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Measured {} ({:.1} s ago)",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.age.as_secs_f64()
        )?;
        writeln!(f, "{:<28} {:>6} {:>10} {:>8}", "Sensor", "Raw", "mV", "O2 %")?;
        writeln!(f, "{}", "-".repeat(55))?;

        for row in &self.rows {
            let raw = row
                .raw_count
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string());
            match (row.millivolts, row.concentration_pct) {
                (Some(mv), Some(pct)) if row.is_calibrated() => writeln!(
                    f,
                    "{:<28} {:>6} {:>10.1} {:>7.2}%",
                    row.label, raw, mv, pct
                )?,
                (Some(mv), _) => writeln!(
                    f,
                    "{:<28} {:>6} {:>10.1} {:>8}",
                    row.label, raw, mv, "uncal."
                )?,
                (None, _) => writeln!(
                    f,
                    "{:<28} {:>6} {:>10} {:>8}",
                    row.label, raw, "n/a", "n/a"
                )?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelReading;

    fn sample(now: DateTime<Utc>) -> SampleSet {
        SampleSet::new(
            now - chrono::Duration::seconds(2),
            vec![
                ChannelReading::available(0, 500.0).with_raw_count(Some(4000)),
                ChannelReading::unavailable(3),
            ],
        )
    }

    #[test]
    fn test_concentration_uses_gain() {
        let now = Utc::now();
        let gains: Gains = [(0, 0.0418), (3, 0.05)].into_iter().collect();
        let readout = Readout::compute(&sample(now), &gains, &AppConfig::default(), now);

        let row = readout.row(0).unwrap();
        assert!((row.concentration_pct.unwrap() - 20.9).abs() < 1e-9);
        assert_eq!(row.raw_count, Some(4000));
        assert_eq!(row.label, "Sensor 0 (Soldered sensor)");

        let unavailable = readout.row(3).unwrap();
        assert_eq!(unavailable.concentration_pct, None);
        assert_eq!(readout.age, Duration::from_secs(2));
    }

    #[test]
    fn test_uncalibrated_channel() {
        let now = Utc::now();
        let readout = Readout::compute(&sample(now), &Gains::new(), &AppConfig::default(), now);

        let row = readout.row(0).unwrap();
        assert!(!row.is_calibrated());
        assert_eq!(row.concentration_pct, Some(0.0));
        assert!(readout.to_string().contains("uncal."));
    }

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        let readout = Readout::compute(&sample(now), &Gains::new(), &AppConfig::default(), now);
        assert!(readout.is_stale(Duration::from_secs(1)));
        assert!(!readout.is_stale(Duration::from_secs(5)));
    }

    #[test]
    fn test_display_marks_unavailable() {
        let now = Utc::now();
        let gains: Gains = [(0, 0.0418)].into_iter().collect();
        let text = Readout::compute(&sample(now), &gains, &AppConfig::default(), now).to_string();

        assert!(text.contains("20.90%"));
        assert!(text.contains("n/a"));
    }
}
