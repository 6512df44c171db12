//! Pull-based query surface for presentation layers
//!
//! [`Instrument`] is what a dashboard or the terminal tool talks to. Every
//! query goes back to the stores, so values written by another process
//! (the acquisition loop, an earlier calibration) are picked up without a
//! restart.

use crate::calibration::{
    CalibrationEngine, CalibrationProposal, CalibrationRequest, CommitOutcome, Decision,
};
use crate::config::AppConfig;
use crate::error::Result;
use crate::readout::Readout;
use crate::store::{CalibrationLedger, FileReadingStore, ReadingStore};
use crate::types::{CalibrationRecord, Gains, SampleSet};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

/// Read access to the shared state plus the calibration workflow
pub struct Instrument {
    config: AppConfig,
    store: Arc<dyn ReadingStore>,
    ledger: Arc<CalibrationLedger>,
    engine: CalibrationEngine,
}

impl Instrument {
    /// Open the file-backed stores in the configured data directory
    pub fn open(config: AppConfig) -> Result<Self> {
        let data_dir = config.storage.resolve_data_dir()?;
        Ok(Self::open_in(config, &data_dir))
    }

    /// Open the file-backed stores in a specific directory
    pub fn open_in(config: AppConfig, data_dir: &Path) -> Self {
        tracing::debug!("Using data directory {}", data_dir.display());
        let store = Arc::new(FileReadingStore::new(
            data_dir.join(&config.storage.sample_file),
        ));
        let ledger = Arc::new(CalibrationLedger::open(
            data_dir.join(&config.storage.ledger_file),
        ));
        Self::with_stores(config, store, ledger)
    }

    /// Build on explicit stores
    pub fn with_stores(
        config: AppConfig,
        store: Arc<dyn ReadingStore>,
        ledger: Arc<CalibrationLedger>,
    ) -> Self {
        let engine = CalibrationEngine::new(store.clone(), ledger.clone(), &config.calibration);
        Self {
            config,
            store,
            ledger,
            engine,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The reading store, for wiring up an acquisition service
    pub fn store(&self) -> Arc<dyn ReadingStore> {
        self.store.clone()
    }

    /// The calibration engine
    pub fn engine(&self) -> &CalibrationEngine {
        &self.engine
    }

    /// Latest published sample set
    pub fn current_reading(&self) -> Result<Option<SampleSet>> {
        self.store.current()
    }

    /// Effective gains
    pub fn current_calibration(&self) -> Result<Gains> {
        self.ledger.current_gains()
    }

    /// All calibration records, oldest first
    pub fn history(&self) -> Result<Vec<CalibrationRecord>> {
        self.ledger.history()
    }

    /// Current reading with concentrations, `None` before the first publish
    pub fn readout(&self) -> Result<Option<Readout>> {
        let Some(sample) = self.current_reading()? else {
            return Ok(None);
        };
        let gains = self.current_calibration()?;
        Ok(Some(Readout::compute(&sample, &gains, &self.config, Utc::now())))
    }

    /// Start a calibration against a reference gas
    pub fn request_calibration(&self, reference_pct: f64) -> Result<CalibrationProposal> {
        self.engine
            .propose(CalibrationRequest::new(reference_pct), Utc::now())
    }

    /// Record the operator's decision on a proposal
    pub fn decide(&self, proposal: &CalibrationProposal, decision: Decision) -> Result<CommitOutcome> {
        self.engine.commit(proposal, decision, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SAMPLE_FILE;
    use crate::types::ChannelReading;

    #[test]
    fn test_empty_instrument() {
        let dir = tempfile::tempdir().unwrap();
        let instrument = Instrument::open_in(AppConfig::default(), dir.path());

        assert!(instrument.current_reading().unwrap().is_none());
        assert!(instrument.readout().unwrap().is_none());
        assert!(instrument.current_calibration().unwrap().is_empty());
        assert!(instrument.history().unwrap().is_empty());
    }

    #[test]
    fn test_open_uses_configured_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.data_dir = Some(dir.path().join("state"));

        let instrument = Instrument::open(config).unwrap();
        instrument
            .store()
            .publish(&SampleSet::new(
                Utc::now(),
                vec![ChannelReading::available(0, 500.0)],
            ))
            .unwrap();

        assert!(dir.path().join("state").join(SAMPLE_FILE).exists());
    }

    #[test]
    fn test_calibration_reflected_in_readout() {
        let dir = tempfile::tempdir().unwrap();
        let instrument = Instrument::open_in(AppConfig::default(), dir.path());
        instrument
            .store()
            .publish(&SampleSet::new(
                Utc::now(),
                vec![
                    ChannelReading::available(0, 500.0),
                    ChannelReading::available(3, 418.0),
                ],
            ))
            .unwrap();

        let before = instrument.readout().unwrap().unwrap();
        assert_eq!(before.row(0).unwrap().concentration_pct, Some(0.0));

        let proposal = instrument.request_calibration(20.9).unwrap();
        instrument.decide(&proposal, Decision::Accept).unwrap();

        let after = instrument.readout().unwrap().unwrap();
        let pct = after.row(3).unwrap().concentration_pct.unwrap();
        assert!((pct - 20.9).abs() < 1e-9);
        assert_eq!(instrument.history().unwrap().len(), 1);
    }
}
