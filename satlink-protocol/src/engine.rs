//! Link engine
//!
//! [`LinkEngine`] is the single entry point a host drives. It pairs a
//! transmitter with a receiver according to the configured [`Mode`], owns
//! the timer arena both sides arm timers in, and keeps local statistics.

use crate::ack::AckMessage;
use crate::arq_receiver::{ArqReceiver, ArqRxOutcome};
use crate::arq_sender::{ArqSender, RetransmitOutcome};
use crate::assembler::{BufferError, SegmentAssembler};
use crate::config::{ConfigError, LinkConfig, Mode};
use crate::context::LinkContext;
use crate::reassembly::ReassemblyError;
use crate::reorder::ReorderingWindow;
use crate::segment::{FrameError, Segment};
use crate::time::Timestamp;
use crate::timer::{TimerArena, TimerHandle, TimerKind};
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Engine errors
///
/// Only buffer overflow is an ordinary outcome. The others mean the peer or
/// the host broke the protocol and the engine should not be driven further.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Malformed frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Reassembly error: {0}")]
    Reassembly(#[from] ReassemblyError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Engine statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub sdus_enqueued: u64,
    pub sdus_dropped_overflow: u64,
    pub pdus_sent: u64,
    pub bytes_sent: u64,
    pub retransmissions: u64,
    pub pdus_dropped_max_retx: u64,
    pub pdus_received: u64,
    pub pdus_discarded: u64,
    pub sdus_delivered: u64,
    pub bytes_delivered: u64,
    pub acks_sent: u64,
    pub acks_received: u64,
}

#[derive(Debug)]
enum Transmitter {
    Plain(SegmentAssembler),
    Arq(ArqSender),
}

#[derive(Debug)]
enum Receiver {
    Reordering(ReorderingWindow),
    Arq(ArqReceiver),
}

/// Host wrapper counting deliveries and acknowledgments
struct Counting<'a, C> {
    inner: &'a mut C,
    delivered: u64,
    delivered_bytes: u64,
    acks: u64,
}

impl<'a, C: LinkContext> Counting<'a, C> {
    fn new(inner: &'a mut C) -> Self {
        Counting {
            inner,
            delivered: 0,
            delivered_bytes: 0,
            acks: 0,
        }
    }

    fn record(&self, stats: &mut LinkStats) {
        stats.sdus_delivered += self.delivered;
        stats.bytes_delivered += self.delivered_bytes;
        stats.acks_sent += self.acks;
    }
}

impl<C: LinkContext> LinkContext for Counting<'_, C> {
    fn now(&self) -> Timestamp {
        self.inner.now()
    }

    fn schedule(&mut self, timer: TimerHandle, after: Duration) {
        self.inner.schedule(timer, after)
    }

    fn deliver(&mut self, sdu: Bytes) {
        self.delivered += 1;
        self.delivered_bytes += sdu.len() as u64;
        self.inner.deliver(sdu)
    }

    fn send_ack(&mut self, ack: AckMessage) {
        self.acks += 1;
        self.inner.send_ack(ack)
    }
}

/// Segmentation and ARQ engine for one flow
#[derive(Debug)]
pub struct LinkEngine {
    config: LinkConfig,
    transmitter: Transmitter,
    receiver: Receiver,
    timers: TimerArena<TimerKind>,
    stats: LinkStats,
}

impl LinkEngine {
    /// Create an engine, validating the configuration first
    pub fn new(config: LinkConfig) -> Result<Self, LinkError> {
        config.validate()?;

        let assembler = SegmentAssembler::new(config.max_tx_buffer_bytes);
        let (transmitter, receiver) = match config.mode {
            Mode::Unacknowledged => (
                Transmitter::Plain(assembler),
                Receiver::Reordering(ReorderingWindow::new(
                    config.reordering_window,
                    config.reordering_timeout,
                )),
            ),
            Mode::Acknowledged => (
                Transmitter::Arq(ArqSender::new(
                    assembler,
                    config.arq_window,
                    config.arq_header_size,
                    config.max_retransmissions,
                    config.retransmission_timeout,
                )),
                Receiver::Arq(ArqReceiver::new(
                    config.flow_id,
                    config.arq_window,
                    config.arq_header_size,
                    config.rx_waiting_timeout,
                )),
            ),
        };

        debug!(mode = ?config.mode, flow_id = config.flow_id, "link engine created");
        Ok(LinkEngine {
            config,
            transmitter,
            receiver,
            timers: TimerArena::new(),
            stats: LinkStats::default(),
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Timers armed and not yet fired or cancelled
    pub fn live_timers(&self) -> usize {
        self.timers.live()
    }

    /// Reordering window, in unacknowledged mode
    pub fn reordering_window(&self) -> Option<&ReorderingWindow> {
        match &self.receiver {
            Receiver::Reordering(window) => Some(window),
            Receiver::Arq(_) => None,
        }
    }

    /// ARQ sender, in acknowledged mode
    pub fn arq_sender(&self) -> Option<&ArqSender> {
        match &self.transmitter {
            Transmitter::Arq(sender) => Some(sender),
            Transmitter::Plain(_) => None,
        }
    }

    fn assembler_mut(&mut self) -> &mut SegmentAssembler {
        match &mut self.transmitter {
            Transmitter::Plain(assembler) => assembler,
            Transmitter::Arq(sender) => sender.assembler_mut(),
        }
    }

    /// Buffer an SDU for transmission
    ///
    /// On overflow the SDU is dropped whole and the error is returned for
    /// information only; the engine state is unaffected.
    pub fn enqueue(&mut self, sdu: Bytes, now: Timestamp) -> Result<(), BufferError> {
        let len = sdu.len();
        match self.assembler_mut().enqueue(sdu, now) {
            Ok(()) => {
                self.stats.sdus_enqueued += 1;
                trace!(len, "SDU enqueued");
                Ok(())
            }
            Err(err) => {
                if matches!(err, BufferError::Overflow { .. }) {
                    self.stats.sdus_dropped_overflow += 1;
                }
                debug!(len, %err, "SDU dropped");
                Err(err)
            }
        }
    }

    /// Produce at most one frame fitting in `budget` bytes
    pub fn notify_tx_opportunity<C: LinkContext>(
        &mut self,
        budget: usize,
        cx: &mut C,
    ) -> Result<Option<Bytes>, LinkError> {
        let frame = match &mut self.transmitter {
            Transmitter::Plain(assembler) => match assembler.notify_tx_opportunity(budget) {
                Some(segment) => Some(segment.to_bytes()?),
                None => None,
            },
            Transmitter::Arq(sender) => {
                match sender.notify_tx_opportunity(budget, &mut self.timers, cx)? {
                    Some(transmission) => {
                        if transmission.retransmission {
                            self.stats.retransmissions += 1;
                        }
                        Some(transmission.frame)
                    }
                    None => None,
                }
            }
        };

        if let Some(frame) = &frame {
            self.stats.pdus_sent += 1;
            self.stats.bytes_sent += frame.len() as u64;
        }
        Ok(frame)
    }

    /// Process one frame from the peer
    ///
    /// Ordinary loss, reordering and duplication are absorbed silently. An
    /// error means the frame could not have come from a conforming sender.
    pub fn receive_pdu<C: LinkContext>(&mut self, frame: Bytes, cx: &mut C) -> Result<(), LinkError> {
        self.stats.pdus_received += 1;
        let mut counting = Counting::new(cx);

        let result = match &mut self.receiver {
            Receiver::Reordering(window) => Segment::from_bytes(&frame)
                .map_err(LinkError::from)
                .and_then(|segment| {
                    window
                        .receive(segment, &mut self.timers, &mut counting)
                        .map_err(LinkError::from)
                })
                .map(|stored| !stored),
            Receiver::Arq(receiver) => receiver
                .receive(&frame, &mut self.timers, &mut counting)
                .map(|outcome| outcome != ArqRxOutcome::Stored),
        };

        counting.record(&mut self.stats);
        if result? {
            self.stats.pdus_discarded += 1;
        }
        Ok(())
    }

    /// Process an acknowledgment from the peer
    ///
    /// Returns true if it retired an outstanding PDU.
    pub fn receive_ack(&mut self, ack: AckMessage) -> bool {
        self.stats.acks_received += 1;

        if ack.flow_id != self.config.flow_id {
            warn!(flow_id = ack.flow_id, expected = self.config.flow_id, "acknowledgment for another flow");
            return false;
        }

        match &mut self.transmitter {
            Transmitter::Arq(sender) => sender.on_ack(ack.seq, &mut self.timers),
            Transmitter::Plain(_) => {
                warn!(seq = ack.seq.as_raw(), "acknowledgment on an unacknowledged link");
                false
            }
        }
    }

    /// Parse and process a serialized acknowledgment
    pub fn receive_control(&mut self, message: &[u8]) -> Result<bool, LinkError> {
        let ack = AckMessage::from_bytes(message)?;
        Ok(self.receive_ack(ack))
    }

    /// Handle a timer the host scheduled on behalf of this engine
    ///
    /// Timers cancelled since they were scheduled are ignored.
    pub fn on_timer<C: LinkContext>(&mut self, handle: TimerHandle, cx: &mut C) -> Result<(), LinkError> {
        let kind = match self.timers.expire(handle) {
            Some(kind) => kind,
            None => {
                trace!(?handle, "stale timer");
                return Ok(());
            }
        };

        let mut counting = Counting::new(cx);
        let result = match (kind, &mut self.transmitter, &mut self.receiver) {
            (TimerKind::Reordering, _, Receiver::Reordering(window)) => window
                .on_timeout(handle, &mut self.timers, &mut counting)
                .map_err(LinkError::from),
            (TimerKind::Retransmit(seq), Transmitter::Arq(sender), _) => {
                if sender.on_retransmit_timeout(seq, handle) == RetransmitOutcome::Dropped {
                    self.stats.pdus_dropped_max_retx += 1;
                }
                Ok(())
            }
            (TimerKind::RxWaiting(counter), _, Receiver::Arq(receiver)) => {
                receiver.on_waiting_timeout(counter, handle, &mut counting)
            }
            (kind, _, _) => {
                warn!(?kind, mode = ?self.config.mode, "timer kind does not match the link mode");
                Ok(())
            }
        };

        counting.record(&mut self.stats);
        result
    }

    /// Bytes waiting in the engine's transmit path
    ///
    /// In acknowledged mode this includes unacknowledged and queued
    /// retransmission frames.
    pub fn tx_buffer_size_bytes(&self) -> usize {
        match &self.transmitter {
            Transmitter::Plain(assembler) => assembler.buffered_bytes(),
            Transmitter::Arq(sender) => sender.buffered_bytes(),
        }
    }

    /// Smallest opportunity that sends the head-of-line data whole
    pub fn min_tx_opportunity_bytes(&self) -> usize {
        match &self.transmitter {
            Transmitter::Plain(assembler) => assembler.min_tx_opportunity(),
            Transmitter::Arq(sender) => sender.min_tx_opportunity(),
        }
    }

    /// Age of the oldest SDU not yet segmented
    pub fn head_of_line_delay(&self, now: Timestamp) -> Duration {
        match &self.transmitter {
            Transmitter::Plain(assembler) => assembler.head_of_line_delay(now),
            Transmitter::Arq(sender) => sender.head_of_line_delay(now),
        }
    }
}
