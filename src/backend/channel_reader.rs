//! Channel reader: timed access to the hardware collaborator
//!
//! The [`ChannelReader`] runs every transaction on a lane thread owned by the
//! channel being read, and talks to the lanes through crossbeam channels.
//! This gives every transaction a timeout even though the hardware primitive
//! itself is blocking, and keeps a hung channel from delaying the others.
//!
//! # Timeouts
//!
//! Each request carries a sequence number. When a request does not answer
//! within the channel timeout the caller gets [`GasCalError::Timeout`] and
//! moves on. Until the late answer arrives the lane counts as in flight and
//! further reads of that channel fail immediately instead of queueing behind
//! the hung transaction; the late answer itself is discarded.

use crate::error::{GasCalError, Result};
use crate::types::ChannelId;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::adc_trait::{AdcStats, VoltageSource};

/// Request sent to a lane thread
enum LaneRequest {
    Voltage { seq: u64 },
    Raw { seq: u64 },
}

/// Answer from a lane thread
enum LaneResult {
    Voltage(Result<f64>),
    Raw(Result<Option<i64>>),
}

struct LaneReply {
    seq: u64,
    result: LaneResult,
}

/// One channel's thread and its mailboxes
struct Lane {
    request_tx: Sender<LaneRequest>,
    reply_rx: Receiver<LaneReply>,
    /// Sequence number of a request that has not answered yet
    in_flight: Option<u64>,
}

impl Lane {
    fn spawn(source: Arc<dyn VoltageSource>, channel: ChannelId) -> Result<Self> {
        let (request_tx, request_rx) = bounded::<LaneRequest>(1);
        let (reply_tx, reply_rx) = bounded::<LaneReply>(1);

        std::thread::Builder::new()
            .name(format!("adc-ch{}", channel))
            .spawn(move || lane_loop(source, channel, request_rx, reply_tx))
            .map_err(|e| {
                GasCalError::Channel(format!("Failed to spawn lane for channel {}: {}", channel, e))
            })?;

        Ok(Self {
            request_tx,
            reply_rx,
            in_flight: None,
        })
    }

    /// Collect answers that arrived after their caller gave up
    fn discard_late_replies(&mut self) {
        while let Ok(reply) = self.reply_rx.try_recv() {
            tracing::trace!("Discarding late ADC reply (seq {})", reply.seq);
            if self.in_flight == Some(reply.seq) {
                self.in_flight = None;
            }
        }
    }
}

/// Timed access to a voltage source
pub struct ChannelReader {
    /// Shared by all lanes
    source: Arc<dyn VoltageSource>,
    /// Lanes, spawned on first use of a channel
    lanes: HashMap<ChannelId, Lane>,
    /// Sequence number of the last request
    seq: u64,
    /// Per-transaction timeout
    timeout: Duration,
    /// Per-channel statistics
    stats: BTreeMap<ChannelId, AdcStats>,
    /// Source description for logs
    source_name: String,
}

impl ChannelReader {
    /// Wrap a source
    ///
    /// Lane threads exit once the reader is dropped and any in-flight
    /// hardware transaction has returned.
    pub fn spawn(source: Box<dyn VoltageSource>, timeout: Duration) -> Result<Self> {
        let source_name = source.describe();
        tracing::debug!("Channel reader ready for {}", source_name);

        Ok(Self {
            source: Arc::from(source),
            lanes: HashMap::new(),
            seq: 0,
            timeout,
            stats: BTreeMap::new(),
            source_name,
        })
    }

    /// Read one instantaneous voltage in millivolts
    pub fn sample(&mut self, channel: ChannelId) -> Result<f64> {
        self.seq += 1;
        let seq = self.seq;
        let start = Instant::now();

        let outcome = self
            .transact(channel, LaneRequest::Voltage { seq }, seq)
            .and_then(|result| match result {
                LaneResult::Voltage(r) => r,
                LaneResult::Raw(_) => Err(GasCalError::Channel("Mismatched lane reply".to_string())),
            });

        let stats = self.stats.entry(channel).or_default();
        match &outcome {
            Ok(_) => stats.record_success(start.elapsed().as_micros() as u64),
            Err(GasCalError::Timeout(_)) => stats.record_timeout(),
            Err(_) => stats.record_failure(),
        }

        outcome
    }

    /// Read the raw ADC count for display
    pub fn sample_raw(&mut self, channel: ChannelId) -> Result<Option<i64>> {
        self.seq += 1;
        let seq = self.seq;

        match self.transact(channel, LaneRequest::Raw { seq }, seq)? {
            LaneResult::Raw(r) => r,
            LaneResult::Voltage(_) => Err(GasCalError::Channel("Mismatched lane reply".to_string())),
        }
    }

    /// Check if a channel still has an unanswered transaction
    pub fn is_in_flight(&mut self, channel: ChannelId) -> bool {
        match self.lanes.get_mut(&channel) {
            Some(lane) => {
                lane.discard_late_replies();
                lane.in_flight.is_some()
            }
            None => false,
        }
    }

    fn transact(&mut self, channel: ChannelId, request: LaneRequest, seq: u64) -> Result<LaneResult> {
        let timeout = self.timeout;
        if !self.lanes.contains_key(&channel) {
            let lane = Lane::spawn(Arc::clone(&self.source), channel)?;
            self.lanes.insert(channel, lane);
        }
        let lane = self
            .lanes
            .get_mut(&channel)
            .ok_or_else(|| GasCalError::Channel(format!("No lane for channel {}", channel)))?;

        lane.discard_late_replies();
        if let Some(pending) = lane.in_flight {
            return Err(GasCalError::Timeout(format!(
                "channel {}: transaction {} still in flight",
                channel, pending
            )));
        }

        match lane.request_tx.try_send(request) {
            Ok(()) => lane.in_flight = Some(seq),
            Err(TrySendError::Full(_)) => {
                return Err(GasCalError::Timeout(format!("channel {}: lane busy", channel)));
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(GasCalError::Channel(format!("channel {}: lane is gone", channel)));
            }
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match lane.reply_rx.recv_timeout(remaining) {
                Ok(reply) if reply.seq == seq => {
                    lane.in_flight = None;
                    return Ok(reply.result);
                }
                Ok(reply) => {
                    tracing::trace!("Discarding late ADC reply (seq {})", reply.seq);
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(GasCalError::Timeout(format!(
                        "channel {}: no answer within {:?}",
                        channel, timeout
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    lane.in_flight = None;
                    return Err(GasCalError::Channel(format!("channel {}: lane is gone", channel)));
                }
            }
        }
    }

    /// Statistics per channel, in channel order
    pub fn channel_stats(&self) -> &BTreeMap<ChannelId, AdcStats> {
        &self.stats
    }

    /// Description of the wrapped source
    pub fn source_name(&self) -> &str {
        &self.source_name
    }
}

fn lane_loop(
    source: Arc<dyn VoltageSource>,
    channel: ChannelId,
    request_rx: Receiver<LaneRequest>,
    reply_tx: Sender<LaneReply>,
) {
    while let Ok(request) = request_rx.recv() {
        let reply = match request {
            LaneRequest::Voltage { seq } => LaneReply {
                seq,
                result: LaneResult::Voltage(source.read_voltage(channel)),
            },
            LaneRequest::Raw { seq } => LaneReply {
                seq,
                result: LaneResult::Raw(source.read_raw(channel)),
            },
        };

        if reply_tx.send(reply).is_err() {
            break;
        }
    }

    tracing::debug!("ADC lane for channel {} stopped", channel);
}
