//! Linux IIO backend for the ADC
//!
//! On the reference instrument the ADS1015 is driven by the kernel's
//! `ti-ads1015` driver, which exposes every input as a pair of sysfs
//! attributes under the IIO device directory:
//!
//! - `in_voltage{N}_raw` - signed conversion result
//! - `in_voltage{N}_scale` - millivolts per count for the selected gain
//!
//! The voltage is `raw * scale`. Each read triggers a one-shot conversion in
//! the driver, so a call blocks for one I2C transaction. The driver
//! serialises conversions itself; reads may be issued from several threads.
//!
//! # Example
//!
//! ```ignore
//! use gascal_rs::backend::IioAdc;
//!
//! let adc = IioAdc::new("/sys/bus/iio/devices/iio:device0");
//! let mv = adc.read_voltage(0)?;
//! ```

use crate::error::{GasCalError, Result};
use crate::types::ChannelId;
use std::path::PathBuf;

use super::adc_trait::VoltageSource;

/// ADC exposed through the Linux Industrial I/O subsystem
pub struct IioAdc {
    /// IIO device directory
    device_dir: PathBuf,
}

impl IioAdc {
    /// Create a backend for an IIO device directory
    pub fn new(device_dir: impl Into<PathBuf>) -> Self {
        Self {
            device_dir: device_dir.into(),
        }
    }

    /// Check if the device directory exists
    pub fn is_present(&self) -> bool {
        self.device_dir.is_dir()
    }

    fn attribute(&self, channel: ChannelId, suffix: &str) -> PathBuf {
        self.device_dir
            .join(format!("in_voltage{}_{}", channel, suffix))
    }

    fn read_attribute<T: std::str::FromStr>(&self, channel: ChannelId, suffix: &str) -> Result<T> {
        let path = self.attribute(channel, suffix);
        let text = std::fs::read_to_string(&path).map_err(|e| {
            GasCalError::hardware(channel, format!("reading {}: {}", path.display(), e))
        })?;

        text.trim().parse::<T>().map_err(|_| {
            GasCalError::hardware(
                channel,
                format!("unparseable value {:?} in {}", text.trim(), path.display()),
            )
        })
    }
}

impl VoltageSource for IioAdc {
    fn read_voltage(&self, channel: ChannelId) -> Result<f64> {
        let raw: i64 = self.read_attribute(channel, "raw")?;
        let scale: f64 = self.read_attribute(channel, "scale")?;
        Ok(raw as f64 * scale)
    }

    fn read_raw(&self, channel: ChannelId) -> Result<Option<i64>> {
        self.read_attribute(channel, "raw").map(Some)
    }

    fn describe(&self) -> String {
        format!("IIO ADC at {}", self.device_dir.display())
    }
}
