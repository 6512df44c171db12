//! Configuration module for gascal-rs
//!
//! This module handles instrument configuration including:
//! - The sensor channel list and labels
//! - Acquisition cadence and hardware timeouts
//! - Calibration health limits and staleness bound
//! - Where the shared reading file and calibration ledger live
//!
//! # Data Location
//!
//! Unless `storage.data_dir` is set, shared state is stored in the
//! platform-appropriate data directory under `dev.gascal.gascal-rs`:
//!
//! - **Linux**: `~/.local/share/dev.gascal.gascal-rs/`
//! - **macOS**: `~/Library/Application Support/dev.gascal.gascal-rs/`
//! - **Windows**: `%APPDATA%\dev.gascal.gascal-rs\`
//!
//! # Files
//!
//! - `gascal.toml` - Instrument configuration (this module)
//! - `sample_set.json` - Latest averaged readings, replaced every cycle
//! - `calibration.jsonl` - Append-only calibration ledger
//!
//! # Example
//!
//! ```ignore
//! use gascal_rs::config::AppConfig;
//!
//! let config = AppConfig::load_or_default("gascal.toml")?;
//! let data_dir = config.storage.resolve_data_dir()?;
//! ```

use crate::error::{GasCalError, Result};
use crate::types::ChannelId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.gascal.gascal-rs";

/// Configuration filename
pub const CONFIG_FILE: &str = "gascal.toml";

/// Live reading filename
pub const SAMPLE_FILE: &str = "sample_set.json";

/// Calibration ledger filename
pub const LEDGER_FILE: &str = "calibration.jsonl";

/// Default acquisition cycle length in milliseconds
pub const DEFAULT_CYCLE_MS: u64 = 1000;

/// Default number of sub-samples averaged per cycle
pub const DEFAULT_SUB_SAMPLES: u32 = 10;

/// Default timeout for a single ADC transaction in milliseconds
pub const DEFAULT_CHANNEL_TIMEOUT_MS: u64 = 100;

/// Default relative gain change that raises a drift warning
pub const DEFAULT_CHANGE_LIMIT: f64 = 0.05;

/// Default minimum implied full-scale voltage in millivolts
pub const DEFAULT_MV_LIMIT: f64 = 40.0;

/// Default maximum sample age accepted for calibration in milliseconds
pub const DEFAULT_MAX_SAMPLE_AGE_MS: u64 = 5000;

/// Oxygen content of ambient air, the usual reference gas
pub const DEFAULT_REFERENCE_PCT: f64 = 20.9;

/// Default Linux IIO device exposing the ADC
pub const DEFAULT_IIO_DEVICE: &str = "/sys/bus/iio/devices/iio:device0";

// ==================== Data Directory ====================

/// Get the default data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure a directory exists, creating it if needed
pub fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| {
            GasCalError::Config(format!(
                "Failed to create data directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    }

    Ok(dir.to_path_buf())
}

// ==================== App Config ====================

/// Complete instrument configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Sensor channels, in display and persistence order
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,

    /// Sampling loop settings
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Calibration engine settings
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Shared state locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Hardware collaborator settings
    #[serde(default)]
    pub hardware: HardwareConfig,
}

fn default_channels() -> Vec<ChannelConfig> {
    vec![
        ChannelConfig::new(0).with_label("Soldered sensor"),
        ChannelConfig::new(3).with_label("Needle adapter"),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            acquisition: AcquisitionConfig::default(),
            calibration: CalibrationConfig::default(),
            storage: StorageConfig::default(),
            hardware: HardwareConfig::default(),
        }
    }
}

impl AppConfig {
    /// Create the reference instrument configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GasCalError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GasCalError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, or the defaults if there is none
    ///
    /// A file that exists but cannot be read or parsed is an error, never a
    /// silent fallback to the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::new());
        }
        Self::load(path)
    }

    /// Save the configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GasCalError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| GasCalError::Config(format!("Failed to write config: {}", e)))
    }

    /// Check the configuration for values the loop and engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(GasCalError::Config("No channels configured".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for ch in &self.channels {
            if !seen.insert(ch.id) {
                return Err(GasCalError::Config(format!(
                    "Channel {} configured twice",
                    ch.id
                )));
            }
        }

        if self.acquisition.cycle_ms == 0 {
            return Err(GasCalError::Config("cycle_ms must be positive".to_string()));
        }
        if self.acquisition.sub_samples == 0 {
            return Err(GasCalError::Config(
                "sub_samples must be at least 1".to_string(),
            ));
        }
        let change_limit = self.calibration.change_limit;
        if change_limit.is_nan() || change_limit <= 0.0 {
            return Err(GasCalError::Config(
                "change_limit must be positive".to_string(),
            ));
        }
        let mv_limit = self.calibration.mv_limit;
        if mv_limit.is_nan() || mv_limit < 0.0 {
            return Err(GasCalError::Config(
                "mv_limit must not be negative".to_string(),
            ));
        }
        if self.storage.sample_file == self.storage.ledger_file {
            return Err(GasCalError::Config(
                "sample_file and ledger_file must differ".to_string(),
            ));
        }

        Ok(())
    }

    /// Configured channel ids in order
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.iter().map(|c| c.id).collect()
    }

    /// Find a channel by id
    pub fn find_channel(&self, id: ChannelId) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Display name for a channel
    pub fn channel_label(&self, id: ChannelId) -> String {
        match self.find_channel(id).and_then(|c| c.label.as_deref()) {
            Some(label) => format!("Sensor {} ({})", id, label),
            None => format!("Sensor {}", id),
        }
    }
}

// ==================== Channel Config ====================

/// One sensor channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// ADC input number
    pub id: ChannelId,

    /// Optional human-readable label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ChannelConfig {
    /// Create an unlabelled channel
    pub fn new(id: ChannelId) -> Self {
        Self { id, label: None }
    }

    /// Attach a label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

// ==================== Acquisition Config ====================

/// Sampling loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Length of one acquisition cycle in milliseconds
    #[serde(default = "default_cycle_ms")]
    pub cycle_ms: u64,

    /// Sub-samples per channel, evenly spaced within the cycle
    #[serde(default = "default_sub_samples")]
    pub sub_samples: u32,

    /// Timeout for a single ADC transaction in milliseconds
    #[serde(default = "default_channel_timeout_ms")]
    pub channel_timeout_ms: u64,
}

fn default_cycle_ms() -> u64 {
    DEFAULT_CYCLE_MS
}

fn default_sub_samples() -> u32 {
    DEFAULT_SUB_SAMPLES
}

fn default_channel_timeout_ms() -> u64 {
    DEFAULT_CHANNEL_TIMEOUT_MS
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            cycle_ms: DEFAULT_CYCLE_MS,
            sub_samples: DEFAULT_SUB_SAMPLES,
            channel_timeout_ms: DEFAULT_CHANNEL_TIMEOUT_MS,
        }
    }
}

impl AcquisitionConfig {
    /// Cycle length
    pub fn cycle(&self) -> Duration {
        Duration::from_millis(self.cycle_ms)
    }

    /// Spacing between sub-samples
    pub fn sub_sample_interval(&self) -> Duration {
        self.cycle() / self.sub_samples.max(1)
    }

    /// Per-transaction timeout
    pub fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }
}

// ==================== Calibration Config ====================

/// Calibration engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Relative gain change above which a drift warning is raised
    #[serde(default = "default_change_limit")]
    pub change_limit: f64,

    /// Minimum implied 100% voltage in millivolts
    #[serde(default = "default_mv_limit")]
    pub mv_limit: f64,

    /// Maximum age of the sample used for calibration in milliseconds
    #[serde(default = "default_max_sample_age_ms")]
    pub max_sample_age_ms: u64,

    /// Reference concentration offered by default, in percent
    #[serde(default = "default_reference_pct")]
    pub default_reference_pct: f64,

    /// Persist declined calibrations as rejected ledger entries
    #[serde(default = "default_true")]
    pub record_rejections: bool,
}

fn default_change_limit() -> f64 {
    DEFAULT_CHANGE_LIMIT
}

fn default_mv_limit() -> f64 {
    DEFAULT_MV_LIMIT
}

fn default_max_sample_age_ms() -> u64 {
    DEFAULT_MAX_SAMPLE_AGE_MS
}

fn default_reference_pct() -> f64 {
    DEFAULT_REFERENCE_PCT
}

fn default_true() -> bool {
    true
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            change_limit: DEFAULT_CHANGE_LIMIT,
            mv_limit: DEFAULT_MV_LIMIT,
            max_sample_age_ms: DEFAULT_MAX_SAMPLE_AGE_MS,
            default_reference_pct: DEFAULT_REFERENCE_PCT,
            record_rejections: true,
        }
    }
}

impl CalibrationConfig {
    /// Staleness bound for calibration samples
    pub fn max_sample_age(&self) -> Duration {
        Duration::from_millis(self.max_sample_age_ms)
    }
}

// ==================== Storage Config ====================

/// Locations of the shared state files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the reading file and ledger (platform default if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// File name of the current sample set
    #[serde(default = "default_sample_file")]
    pub sample_file: String,

    /// File name of the calibration ledger
    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,
}

fn default_sample_file() -> String {
    SAMPLE_FILE.to_string()
}

fn default_ledger_file() -> String {
    LEDGER_FILE.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sample_file: default_sample_file(),
            ledger_file: default_ledger_file(),
        }
    }
}

impl StorageConfig {
    /// Resolve and create the data directory
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        let dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => app_data_dir().ok_or_else(|| {
                GasCalError::Config("Could not determine app data directory".to_string())
            })?,
        };
        ensure_dir(&dir)
    }
}

// ==================== Hardware Config ====================

/// Hardware collaborator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// IIO device directory of the ADC
    #[serde(default = "default_iio_device")]
    pub iio_device: PathBuf,
}

fn default_iio_device() -> PathBuf {
    PathBuf::from(DEFAULT_IIO_DEVICE)
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            iio_device: default_iio_device(),
        }
    }
}

// ==================== Tests ====================
