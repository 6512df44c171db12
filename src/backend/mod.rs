//! Acquisition backend
//!
//! This module handles all ADC communication in background threads. It uses
//! crossbeam channels for thread-safe communication with whoever controls
//! the acquisition (the `gascal acquire` command, tests, a future dashboard).
//!
//! # Architecture
//!
//! - [`AcquisitionCommand`] - Messages sent to the worker (start, stop, ...)
//! - [`AcquisitionEvent`] - Messages sent from the worker (published sets,
//!   faults, statistics)
//! - [`AcquisitionHandle`] - Controller-side handle for commands and events
//! - [`AcquisitionService`] - Entry point that owns the worker configuration
//!
//! # Components
//!
//! - [`VoltageSource`] - Hardware collaborator trait
//! - [`IioAdc`] - Linux IIO sysfs ADC (ADS1015 via `ti-ads1015`)
//! - [`SimulatedAdc`] - Pattern generator for bench runs and tests
//! - [`ChannelReader`] - Per-channel lanes giving every transaction a timeout
//! - [`AcquisitionWorker`] - The sampling loop
//!
//! # Example
//!
//! ```ignore
//! use gascal_rs::backend::{AcquisitionService, SimulatedAdc};
//! use gascal_rs::config::AppConfig;
//! use gascal_rs::store::MemoryReadingStore;
//! use std::sync::Arc;
//!
//! let config = AppConfig::default();
//! let store = Arc::new(MemoryReadingStore::new());
//! let (service, handle) = AcquisitionService::new(
//!     config,
//!     Box::new(SimulatedAdc::reference_instrument()),
//!     store,
//! );
//!
//! let worker = std::thread::spawn(move || service.run());
//!
//! for event in handle.drain() {
//!     if let AcquisitionEvent::Published(sample) = event {
//!         println!("{:?}", sample);
//!     }
//! }
//! handle.shutdown();
//! ```

pub mod adc_trait;
pub mod channel_reader;
pub mod iio_adc;
pub mod mock_adc;
pub mod worker;

pub use adc_trait::{AdcStats, VoltageSource};
pub use channel_reader::ChannelReader;
pub use iio_adc::IioAdc;
pub use mock_adc::{SimulatedAdc, SimulatedAdcControl, SimulatedFault, SimulatedPattern};
pub use worker::{AcquisitionWorker, CycleOutcome};

use crate::config::AppConfig;
use crate::error::Result;
use crate::store::ReadingStore;
use crate::types::{AcquisitionState, AcquisitionStats, ChannelId, SampleSet};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Command sent to the acquisition worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionCommand {
    /// Enter the Sampling state
    Start,
    /// Enter the Idle state
    Stop,
    /// Request current statistics
    RequestStats,
    /// Shutdown the worker
    Shutdown,
}

/// Event sent from the acquisition worker
#[derive(Debug, Clone)]
pub enum AcquisitionEvent {
    /// The worker switched state
    StateChanged(AcquisitionState),
    /// A sample set was published
    Published(SampleSet),
    /// A channel failed at least once during a cycle
    ChannelFault { channel: ChannelId, error: String },
    /// The store refused a sample set
    PublishFailed(String),
    /// Statistics update
    Stats(AcquisitionStats),
    /// Worker is shutting down
    Shutdown,
}

/// Controller-side handle for the acquisition worker
pub struct AcquisitionHandle {
    /// Receiver for worker events
    pub receiver: Receiver<AcquisitionEvent>,
    /// Sender for commands to the worker
    pub command_sender: Sender<AcquisitionCommand>,
}

impl AcquisitionHandle {
    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<AcquisitionEvent> {
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<AcquisitionEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Receive all pending events
    pub fn drain(&self) -> Vec<AcquisitionEvent> {
        self.receiver.try_iter().collect()
    }

    /// Send a command to the worker
    pub fn send_command(&self, cmd: AcquisitionCommand) -> bool {
        self.command_sender.send(cmd).is_ok()
    }

    /// Resume sampling
    pub fn start(&self) {
        self.send_command(AcquisitionCommand::Start);
    }

    /// Pause sampling
    pub fn stop(&self) {
        self.send_command(AcquisitionCommand::Stop);
    }

    /// Ask for a stats event
    pub fn request_stats(&self) {
        self.send_command(AcquisitionCommand::RequestStats);
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        self.send_command(AcquisitionCommand::Shutdown);
    }
}

/// The acquisition service that runs in a separate thread
pub struct AcquisitionService {
    /// Configuration
    config: AppConfig,
    /// Hardware collaborator, handed to the channel reader by `run`
    source: Box<dyn VoltageSource>,
    /// Destination of published sample sets
    store: Arc<dyn ReadingStore>,
    /// Receiver for commands
    command_receiver: Receiver<AcquisitionCommand>,
    /// Sender for events
    event_sender: Sender<AcquisitionEvent>,
    /// Running flag
    running: Arc<AtomicBool>,
}

impl AcquisitionService {
    /// Create a new acquisition service with communication channels
    pub fn new(
        config: AppConfig,
        source: Box<dyn VoltageSource>,
        store: Arc<dyn ReadingStore>,
    ) -> (Self, AcquisitionHandle) {
        let (cmd_tx, cmd_rx) = bounded(64);
        // Bounded for backpressure; a slow consumer loses events, never cycles
        let (event_tx, event_rx) = bounded(1_024);

        let service = Self {
            config,
            source,
            store,
            command_receiver: cmd_rx,
            event_sender: event_tx,
            running: Arc::new(AtomicBool::new(true)),
        };

        let handle = AcquisitionHandle {
            receiver: event_rx,
            command_sender: cmd_tx,
        };

        (service, handle)
    }

    /// Run the acquisition loop until shutdown
    pub fn run(self) -> Result<()> {
        let reader = ChannelReader::spawn(self.source, self.config.acquisition.channel_timeout())?;
        let mut worker = AcquisitionWorker::new(
            self.config.acquisition.clone(),
            self.config.channel_ids(),
            reader,
            self.store,
            self.command_receiver,
            self.event_sender,
            self.running,
        );
        worker.run();
        Ok(())
    }
}
