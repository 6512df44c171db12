//! Acquisition worker thread implementation
//!
//! This module contains the loop that turns instantaneous channel reads into
//! published sample sets. It runs on its own thread and is controlled through
//! crossbeam channels.
//!
//! # Cycle
//!
//! While [`AcquisitionState::Sampling`], each cycle of `cycle_ms`:
//!
//! 1. takes `sub_samples` reads per channel, evenly spaced within the cycle
//!    window (sub-sample `i` starts at `i * cycle / sub_samples`),
//! 2. averages the successful reads per channel,
//! 3. publishes one [`SampleSet`] timestamped at the cycle end.
//!
//! A fault on one channel never aborts the cycle. A channel that times out is
//! not read again until the next cycle, and a channel without a single
//! successful read is published as unavailable. Stopping mid-cycle discards
//! the partial cycle.

use crate::backend::channel_reader::ChannelReader;
use crate::backend::{AcquisitionCommand, AcquisitionEvent};
use crate::config::AcquisitionConfig;
use crate::error::GasCalError;
use crate::store::ReadingStore;
use crate::types::{AcquisitionState, AcquisitionStats, ChannelId, ChannelReading, SampleSet};
use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long the idle loop waits for a command before re-checking the flag
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Interval between unsolicited stats events
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Mean of the successful sub-samples, `None` when there are none
pub fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Outcome of one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The set was published
    Published(SampleSet),
    /// The set was built but the store refused it
    PublishFailed,
    /// Stop or shutdown arrived mid-cycle, nothing was published
    Interrupted,
}

/// The acquisition worker that runs the sampling loop
pub struct AcquisitionWorker {
    /// Timing configuration
    config: AcquisitionConfig,
    /// Channels in publish order
    channels: Vec<ChannelId>,
    /// Timed access to the hardware
    reader: ChannelReader,
    /// Where sample sets are published
    store: Arc<dyn ReadingStore>,
    /// Command receiver
    command_rx: Receiver<AcquisitionCommand>,
    /// Event sender
    event_tx: Sender<AcquisitionEvent>,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Current state
    state: AcquisitionState,
    /// Statistics
    stats: AcquisitionStats,
    /// Last time stats were sent
    last_stats_time: Instant,
}

impl AcquisitionWorker {
    /// Create a new acquisition worker
    pub fn new(
        config: AcquisitionConfig,
        channels: Vec<ChannelId>,
        reader: ChannelReader,
        store: Arc<dyn ReadingStore>,
        command_rx: Receiver<AcquisitionCommand>,
        event_tx: Sender<AcquisitionEvent>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            channels,
            reader,
            store,
            command_rx,
            event_tx,
            running,
            state: AcquisitionState::Sampling,
            stats: AcquisitionStats::default(),
            last_stats_time: Instant::now(),
        }
    }

    /// Current state
    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Statistics so far
    pub fn stats(&self) -> &AcquisitionStats {
        &self.stats
    }

    /// Run the main worker loop until shutdown
    pub fn run(&mut self) {
        tracing::info!(
            "Acquisition started on {} ({} channels, {} ms cycle, {} sub-samples)",
            self.reader.source_name(),
            self.channels.len(),
            self.config.cycle_ms,
            self.config.sub_samples
        );

        while self.running.load(Ordering::SeqCst) {
            self.process_commands();
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            match self.state {
                AcquisitionState::Sampling => {
                    self.run_cycle();

                    if self.last_stats_time.elapsed() >= STATS_INTERVAL {
                        self.send_stats();
                        self.last_stats_time = Instant::now();
                    }
                }
                AcquisitionState::Idle => self.wait_for_command(),
            }
        }

        let _ = self.event_tx.send(AcquisitionEvent::Shutdown);
        tracing::info!(
            "Acquisition stopped after {} published cycles",
            self.stats.cycles_published
        );
    }

    /// Run one acquisition cycle and publish the result
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let cycle_start = Instant::now();
        let interval = self.config.sub_sample_interval();
        let channels = self.channels.clone();
        let mut samples: Vec<Vec<f64>> = vec![Vec::new(); channels.len()];
        let mut faulted = vec![false; channels.len()];
        let mut timed_out = vec![false; channels.len()];

        for i in 0..self.config.sub_samples {
            if !self.sleep_until(cycle_start + interval * i) {
                tracing::debug!("Cycle interrupted after {} sub-samples", i);
                return CycleOutcome::Interrupted;
            }

            for (slot, &channel) in channels.iter().enumerate() {
                if timed_out[slot] {
                    continue;
                }
                match self.reader.sample(channel) {
                    Ok(mv) => {
                        self.stats.successful_reads += 1;
                        samples[slot].push(mv);
                    }
                    Err(e) => {
                        self.stats.failed_reads += 1;
                        if matches!(e, GasCalError::Timeout(_)) {
                            timed_out[slot] = true;
                        }
                        // Report each faulting channel once per cycle
                        if !faulted[slot] {
                            faulted[slot] = true;
                            tracing::warn!("Channel {} read failed: {}", channel, e);
                            self.try_send_event(AcquisitionEvent::ChannelFault {
                                channel,
                                error: e.to_string(),
                            });
                        }
                    }
                }
            }
        }

        if !self.sleep_until(cycle_start + self.config.cycle()) {
            return CycleOutcome::Interrupted;
        }

        let readings = channels
            .iter()
            .zip(&samples)
            .zip(&timed_out)
            .map(|((&channel, values), &timed_out)| match average(values) {
                Some(mv) => {
                    let raw = if timed_out {
                        None
                    } else {
                        self.reader.sample_raw(channel).unwrap_or_else(|e| {
                            tracing::trace!("No raw count for channel {}: {}", channel, e);
                            None
                        })
                    };
                    ChannelReading::available(channel, mv).with_raw_count(raw)
                }
                None => {
                    self.stats.unavailable_channels += 1;
                    ChannelReading::unavailable(channel)
                }
            })
            .collect();

        let sample = SampleSet::new(Utc::now(), readings);
        self.stats.last_cycle_ms = cycle_start.elapsed().as_secs_f64() * 1000.0;

        match self.store.publish(&sample) {
            Ok(()) => {
                self.stats.cycles_published += 1;
                tracing::debug!(
                    "Published sample set ({} channels, {:.1} ms)",
                    sample.readings.len(),
                    self.stats.last_cycle_ms
                );
                self.try_send_event(AcquisitionEvent::Published(sample.clone()));
                CycleOutcome::Published(sample)
            }
            Err(e) => {
                self.stats.publish_failures += 1;
                tracing::error!("Failed to publish sample set: {}", e);
                self.try_send_event(AcquisitionEvent::PublishFailed(e.to_string()));
                CycleOutcome::PublishFailed
            }
        }
    }

    /// Sleep until `deadline` while staying responsive to commands
    ///
    /// Returns false if sampling should not continue.
    fn sleep_until(&mut self, deadline: Instant) -> bool {
        loop {
            self.process_commands();
            if !self.is_sampling() {
                return false;
            }

            let now = Instant::now();
            if now >= deadline {
                return true;
            }

            match self.command_rx.recv_timeout(deadline - now) {
                Ok(cmd) => self.handle_command(cmd),
                Err(RecvTimeoutError::Timeout) => return self.is_sampling(),
                Err(RecvTimeoutError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                    return false;
                }
            }
        }
    }

    fn is_sampling(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.state == AcquisitionState::Sampling
    }

    /// Block briefly for a command while idle
    fn wait_for_command(&mut self) {
        match self.command_rx.recv_timeout(IDLE_POLL) {
            Ok(cmd) => self.handle_command(cmd),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => self.running.store(false, Ordering::SeqCst),
        }
    }

    /// Process pending commands
    fn process_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    /// Handle a single command
    fn handle_command(&mut self, cmd: AcquisitionCommand) {
        match cmd {
            AcquisitionCommand::Start => self.set_state(AcquisitionState::Sampling),
            AcquisitionCommand::Stop => self.set_state(AcquisitionState::Idle),
            AcquisitionCommand::RequestStats => self.send_stats(),
            AcquisitionCommand::Shutdown => {
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    fn set_state(&mut self, state: AcquisitionState) {
        if self.state != state {
            tracing::info!("Acquisition {} -> {}", self.state, state);
            self.state = state;
            self.try_send_event(AcquisitionEvent::StateChanged(state));
        }
    }

    /// Send statistics (using try_send for backpressure)
    fn send_stats(&mut self) {
        let mut stats = self.stats.clone();
        stats.channels = self.reader.channel_stats().clone();
        self.try_send_event(AcquisitionEvent::Stats(stats));
    }

    /// Try to send an event, counting it as dropped if the queue is full
    fn try_send_event(&mut self, event: AcquisitionEvent) {
        if self.event_tx.try_send(event).is_err() {
            self.stats.dropped_events += 1;
        }
    }
}
