//! Sensor health checks run at recalibration time
//!
//! All checks are advisory: they describe the new gain relative to the
//! previous one and to the sensor's implied full-scale output, but never
//! decide acceptance.

use crate::config::CalibrationConfig;
use serde::{Deserialize, Serialize};

/// Thresholds for the health checks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthLimits {
    /// Relative gain change above which drift is reported
    pub change_limit: f64,
    /// Minimum implied 100% voltage in millivolts
    pub mv_limit: f64,
}

impl Default for HealthLimits {
    fn default() -> Self {
        Self::from(&CalibrationConfig::default())
    }
}

impl From<&CalibrationConfig> for HealthLimits {
    fn from(config: &CalibrationConfig) -> Self {
        Self {
            change_limit: config.change_limit,
            mv_limit: config.mv_limit,
        }
    }
}

/// Margin above `mv_limit` in which a low-signal warning is raised
pub const LOW_SIGNAL_MARGIN_MV: f64 = 5.0;

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

/// Finding about one channel's new calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// Gain moved further from the previous effective gain than allowed
    Drift {
        previous_gain: f64,
        new_gain: f64,
        /// Change relative to the previous gain, in percent
        change_pct: f64,
    },
    /// Implied 100% voltage is close to the limit
    LowSignalWarning { full_scale_mv: f64, mv_limit: f64 },
    /// Implied 100% voltage is below the limit, the cell is spent
    LowSignalError { full_scale_mv: f64, mv_limit: f64 },
    /// Raw reading was exactly zero; the placeholder gain 1 was used
    ZeroSignal,
    /// No reading for the channel; the previous gain was carried over
    ChannelUnavailable { kept_gain: f64 },
    /// The reading gives no finite gain; the previous gain was carried over
    InvalidSignal { millivolts: f64, kept_gain: f64 },
}

impl Diagnostic {
    /// Severity of the finding
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::Drift { .. } | Diagnostic::LowSignalWarning { .. } => Severity::Warning,
            Diagnostic::LowSignalError { .. }
            | Diagnostic::ZeroSignal
            | Diagnostic::ChannelUnavailable { .. }
            | Diagnostic::InvalidSignal { .. } => Severity::Error,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::Drift { change_pct, .. } => {
                write!(f, "Warning: calibration has changed by {:+.1}%", change_pct)
            }
            Diagnostic::LowSignalWarning {
                full_scale_mv,
                mv_limit,
            } => write!(
                f,
                "Warning: corresponding 100% voltage {:.1} mV (should be over {} mV)",
                full_scale_mv, mv_limit
            ),
            Diagnostic::LowSignalError {
                full_scale_mv,
                mv_limit,
            } => write!(
                f,
                "Error: corresponding 100% voltage {:.1} mV (should be over {} mV). Sensor needs replacement",
                full_scale_mv, mv_limit
            ),
            Diagnostic::ZeroSignal => write!(
                f,
                "Error: sensor reads 0 mV, gain cannot be computed (placeholder gain 1)"
            ),
            Diagnostic::ChannelUnavailable { kept_gain } => write!(
                f,
                "Error: no reading from sensor, previous gain {:.4} kept",
                kept_gain
            ),
            Diagnostic::InvalidSignal {
                millivolts,
                kept_gain,
            } => write!(
                f,
                "Error: sensor reads {} mV, no usable gain, previous gain {:.4} kept",
                millivolts, kept_gain
            ),
        }
    }
}

/// Voltage the sensor would output at 100% concentration with this gain
pub fn full_scale_mv(gain: f64) -> f64 {
    100.0 / gain
}

/// Drift and low-signal checks for a newly computed gain
pub fn evaluate(previous_gain: f64, new_gain: f64, limits: &HealthLimits) -> Vec<Diagnostic> {
    let mut findings = Vec::new();

    if previous_gain != 0.0 {
        // Magnitude of the new gain, so a sign flip still counts as drift
        let relative = (new_gain - previous_gain).abs() / new_gain.abs();
        if relative > limits.change_limit {
            findings.push(Diagnostic::Drift {
                previous_gain,
                new_gain,
                change_pct: (new_gain - previous_gain) / previous_gain * 100.0,
            });
        }
    }

    let full_scale = full_scale_mv(new_gain);
    if full_scale < limits.mv_limit {
        findings.push(Diagnostic::LowSignalError {
            full_scale_mv: full_scale,
            mv_limit: limits.mv_limit,
        });
    } else if full_scale < limits.mv_limit + LOW_SIGNAL_MARGIN_MV {
        findings.push(Diagnostic::LowSignalWarning {
            full_scale_mv: full_scale,
            mv_limit: limits.mv_limit,
        });
    }

    findings
}
