//! Error handling for gascal-rs
//!
//! This module defines the crate error type and a Result alias for use
//! throughout the acquisition loop, the stores and the calibration engine.

use std::time::Duration;
use thiserror::Error;

use crate::types::ChannelId;

/// Main error type for gascal-rs operations
#[derive(Error, Debug)]
pub enum GasCalError {
    /// The hardware collaborator could not produce a reading
    #[error("Hardware fault on channel {channel}: {message}")]
    Hardware { channel: ChannelId, message: String },

    /// A hardware transaction did not answer in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Calibration attempted against a sample older than the staleness bound
    #[error("Stale sample: measured {age:?} ago (limit {limit:?})")]
    StaleSample { age: Duration, limit: Duration },

    /// Calibration attempted before any sample was published
    #[error("No sample has been published yet")]
    NoSample,

    /// Reference concentration outside (0, 100] or not finite
    #[error("Invalid reference concentration: {0}")]
    InvalidReference(f64),

    /// Errors related to the calibration ledger
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Errors related to the reading store
    #[error("Reading store error: {0}")]
    Store(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<GasCalError>,
    },
}

impl GasCalError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        GasCalError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Build a hardware fault for a channel
    pub fn hardware(channel: ChannelId, message: impl Into<String>) -> Self {
        GasCalError::Hardware {
            channel,
            message: message.into(),
        }
    }

    /// Whether this error (or the error it wraps) is a hardware-side fault
    pub fn is_hardware_fault(&self) -> bool {
        match self {
            GasCalError::Hardware { .. } | GasCalError::Timeout(_) => true,
            GasCalError::WithContext { source, .. } => source.is_hardware_fault(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for GasCalError {
    fn from(err: serde_json::Error) -> Self {
        GasCalError::Serialization(err.to_string())
    }
}

/// Result type alias for gascal-rs operations
pub type Result<T> = std::result::Result<T, GasCalError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| GasCalError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| GasCalError::Io(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GasCalError::Ledger("truncated".to_string());
        assert_eq!(err.to_string(), "Ledger error: truncated");
    }

    #[test]
    fn test_error_with_context() {
        let err = GasCalError::NoSample;
        let with_ctx = err.with_context("Calibration refused");
        assert!(with_ctx.to_string().contains("Calibration refused"));
    }

    #[test]
    fn test_hardware_error() {
        let err = GasCalError::hardware(3, "I2C NACK");
        assert!(err.to_string().contains("channel 3"));
        assert!(err.to_string().contains("I2C NACK"));
        assert!(err.is_hardware_fault());
        assert!(err.with_context("cycle").is_hardware_fault());
    }

    #[test]
    fn test_io_context() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        ));
        let err = res.context("Opening ledger").unwrap_err();
        assert!(err.to_string().starts_with("Opening ledger"));
        assert!(!err.is_hardware_fault());
    }
}
