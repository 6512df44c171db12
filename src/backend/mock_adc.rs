//! Simulated ADC for bench runs and testing
//!
//! This module provides a voltage source that can be used to run the
//! acquisition loop and calibration workflow without real hardware. Each
//! channel follows a configurable pattern and can be told to fail or hang so
//! fault handling can be exercised.
//!
//! # Data Patterns
//!
//! - [`SimulatedPattern::Constant`] - Fixed voltage (calibration tests)
//! - [`SimulatedPattern::Sine`] - Slow oscillation around an offset
//! - [`SimulatedPattern::Random`] - Uniform values within a range
//! - [`SimulatedPattern::Decay`] - Exponential decay, mimicking an ageing cell
//!
//! # Example
//!
//! ```ignore
//! use gascal_rs::backend::mock_adc::{SimulatedAdc, SimulatedFault, SimulatedPattern};
//!
//! let adc = SimulatedAdc::new()
//!     .with_channel(0, SimulatedPattern::Constant(500.0))
//!     .with_channel(3, SimulatedPattern::Constant(430.0));
//!
//! // Keep a handle to change behaviour after the ADC moved into the reader
//! let control = adc.control();
//! control.set_fault(3, Some(SimulatedFault::Error));
//! ```

use crate::error::{GasCalError, Result};
use crate::types::ChannelId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::adc_trait::VoltageSource;

/// LSB of an ADS1015 at its highest programmable gain (+/-256 mV range)
pub const ADS1015_LSB_MV: f64 = 0.125;

/// Pattern for generating simulated voltages
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimulatedPattern {
    /// Constant voltage in millivolts
    Constant(f64),
    /// Sine wave around an offset
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Random values within range
    Random { min: f64, max: f64 },
    /// Exponential decay from `start` towards `floor` with a time constant
    Decay {
        start: f64,
        floor: f64,
        time_constant_secs: f64,
    },
}

impl Default for SimulatedPattern {
    fn default() -> Self {
        SimulatedPattern::Constant(0.0)
    }
}

impl SimulatedPattern {
    /// Generate a value based on the pattern and elapsed time
    pub fn generate_value(&self, elapsed_secs: f64) -> f64 {
        match *self {
            SimulatedPattern::Constant(v) => v,
            SimulatedPattern::Sine {
                frequency,
                amplitude,
                offset,
            } => offset + amplitude * (2.0 * std::f64::consts::PI * frequency * elapsed_secs).sin(),
            SimulatedPattern::Random { min, max } => min + rand_simple() * (max - min),
            SimulatedPattern::Decay {
                start,
                floor,
                time_constant_secs,
            } => {
                if time_constant_secs <= 0.0 {
                    floor
                } else {
                    floor + (start - floor) * (-elapsed_secs / time_constant_secs).exp()
                }
            }
        }
    }
}

/// Injected misbehaviour for a channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimulatedFault {
    /// Every read fails immediately
    Error,
    /// Every read blocks for the given time before answering
    Hang(Duration),
}

/// Simple pseudo-random number generator (no external dependency)
fn rand_simple() -> f64 {
    use std::cell::Cell;
    thread_local! {
        static SEED: Cell<u64> = const { Cell::new(12345) };
    }
    SEED.with(|seed| {
        let mut s = seed.get();
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        seed.set(s);
        (s as f64) / (u64::MAX as f64)
    })
}

#[derive(Debug, Clone, Default)]
struct SimulatedChannel {
    pattern: SimulatedPattern,
    fault: Option<SimulatedFault>,
    noise_amplitude: f64,
}

/// Shared per-channel behaviour
type ChannelTable = Arc<Mutex<HashMap<ChannelId, SimulatedChannel>>>;

/// Simulated ADC
pub struct SimulatedAdc {
    /// Channel behaviour, shared with [`SimulatedAdcControl`]
    channels: ChannelTable,
    /// Start time for pattern generation
    start_time: Instant,
    /// Simulated transaction delay
    read_delay: Duration,
    /// Millivolts per raw count
    lsb_mv: f64,
}

impl Default for SimulatedAdc {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAdc {
    /// Create a simulated ADC with no configured channels
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            start_time: Instant::now(),
            read_delay: Duration::ZERO,
            lsb_mv: ADS1015_LSB_MV,
        }
    }

    /// A simulated copy of the reference instrument: two healthy cells in air
    pub fn reference_instrument() -> Self {
        let adc = Self::new()
            .with_channel(
                0,
                SimulatedPattern::Sine {
                    frequency: 0.05,
                    amplitude: 1.5,
                    offset: 500.0,
                },
            )
            .with_channel(
                3,
                SimulatedPattern::Random {
                    min: 428.0,
                    max: 432.0,
                },
            )
            // One-shot conversion at the ADS1015's default 1600 SPS
            .with_read_delay(Duration::from_micros(700));
        adc.control().set_noise(0, 0.25);
        adc
    }

    /// Configure a channel pattern
    pub fn with_channel(self, channel: ChannelId, pattern: SimulatedPattern) -> Self {
        self.control().set_pattern(channel, pattern);
        self
    }

    /// Set the simulated transaction delay
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Handle for changing channel behaviour from another thread
    pub fn control(&self) -> SimulatedAdcControl {
        SimulatedAdcControl {
            channels: Arc::clone(&self.channels),
        }
    }

    fn channel(&self, channel: ChannelId) -> Result<SimulatedChannel> {
        let table = self
            .channels
            .lock()
            .map_err(|_| GasCalError::hardware(channel, "simulated ADC state poisoned"))?;
        table
            .get(&channel)
            .cloned()
            .ok_or_else(|| GasCalError::hardware(channel, "channel not wired"))
    }
}

impl VoltageSource for SimulatedAdc {
    fn read_voltage(&self, channel: ChannelId) -> Result<f64> {
        let config = self.channel(channel)?;

        match config.fault {
            Some(SimulatedFault::Error) => {
                return Err(GasCalError::hardware(channel, "simulated read failure"));
            }
            Some(SimulatedFault::Hang(duration)) => std::thread::sleep(duration),
            None => {}
        }

        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }

        let elapsed = self.start_time.elapsed().as_secs_f64();
        let value = config.pattern.generate_value(elapsed);

        if config.noise_amplitude > 0.0 {
            Ok(value + (rand_simple() - 0.5) * 2.0 * config.noise_amplitude)
        } else {
            Ok(value)
        }
    }

    fn read_raw(&self, channel: ChannelId) -> Result<Option<i64>> {
        let mv = self.read_voltage(channel)?;
        Ok(Some((mv / self.lsb_mv).round() as i64))
    }

    fn describe(&self) -> String {
        let count = self.channels.lock().map(|t| t.len()).unwrap_or(0);
        format!("Simulated ADC ({} channels)", count)
    }
}

/// Cloneable controller for a [`SimulatedAdc`]
#[derive(Clone)]
pub struct SimulatedAdcControl {
    channels: ChannelTable,
}

impl SimulatedAdcControl {
    fn update(&self, channel: ChannelId, f: impl FnOnce(&mut SimulatedChannel)) {
        if let Ok(mut table) = self.channels.lock() {
            f(table.entry(channel).or_default());
        }
    }

    /// Change the pattern of a channel
    pub fn set_pattern(&self, channel: ChannelId, pattern: SimulatedPattern) {
        self.update(channel, |c| c.pattern = pattern);
    }

    /// Inject or clear a fault
    pub fn set_fault(&self, channel: ChannelId, fault: Option<SimulatedFault>) {
        self.update(channel, |c| c.fault = fault);
    }

    /// Add noise to generated values
    pub fn set_noise(&self, channel: ChannelId, amplitude: f64) {
        self.update(channel, |c| c.noise_amplitude = amplitude);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_channel() {
        let adc = SimulatedAdc::new().with_channel(0, SimulatedPattern::Constant(500.0));
        assert_eq!(adc.read_voltage(0).unwrap(), 500.0);
        assert_eq!(adc.read_raw(0).unwrap(), Some(4000));
    }

    #[test]
    fn test_unwired_channel_is_hardware_fault() {
        let adc = SimulatedAdc::new();
        let err = adc.read_voltage(2).unwrap_err();
        assert!(err.is_hardware_fault());
    }

    #[test]
    fn test_fault_injection_via_control() {
        let adc = SimulatedAdc::new().with_channel(1, SimulatedPattern::Constant(10.0));
        let control = adc.control();

        control.set_fault(1, Some(SimulatedFault::Error));
        assert!(adc.read_voltage(1).is_err());

        control.set_fault(1, None);
        assert_eq!(adc.read_voltage(1).unwrap(), 10.0);
    }

    #[test]
    fn test_patterns() {
        let sine = SimulatedPattern::Sine {
            frequency: 1.0,
            amplitude: 10.0,
            offset: 100.0,
        };
        assert!((sine.generate_value(0.0) - 100.0).abs() < 1e-9);
        assert!((sine.generate_value(0.25) - 110.0).abs() < 1e-9);

        let random = SimulatedPattern::Random {
            min: 400.0,
            max: 410.0,
        };
        for _ in 0..100 {
            let v = random.generate_value(0.0);
            assert!((400.0..=410.0).contains(&v));
        }

        let decay = SimulatedPattern::Decay {
            start: 500.0,
            floor: 100.0,
            time_constant_secs: 10.0,
        };
        assert_eq!(decay.generate_value(0.0), 500.0);
        assert!(decay.generate_value(10.0) < 300.0);
        assert!(decay.generate_value(1000.0) - 100.0 < 1e-6);
    }

    #[test]
    fn test_reference_instrument() {
        let adc = SimulatedAdc::reference_instrument();
        let v0 = adc.read_voltage(0).unwrap();
        let v3 = adc.read_voltage(3).unwrap();
        assert!((498.0..=502.0).contains(&v0));
        assert!((428.0..=432.0).contains(&v3));
        assert!(adc.describe().contains("2 channels"));
    }
}
