//! ARQ transmit side
//!
//! Every segment the assembler produces is wrapped in an ARQ header and
//! kept in a [`SendWindow`] slot until acknowledged. A slot moves between
//! `Transmitted` (retransmission timer running) and `RetransmitQueued`
//! (waiting for an opportunity) and is freed on acknowledgment or once the
//! retry budget is spent. A sequence number can only be in one slot state
//! at a time, so the transmitted and retransmit sets can never overlap.

use crate::assembler::SegmentAssembler;
use crate::context::LinkContext;
use crate::segment::{FrameError, Segment};
use crate::sequence::ArqSeqNo;
use crate::time::Timestamp;
use crate::timer::{TimerArena, TimerHandle, TimerKind};
use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A sent, unacknowledged PDU
#[derive(Debug, Clone)]
pub struct RetxContext {
    /// ARQ sequence number
    pub seq: ArqSeqNo,
    /// The complete frame, ARQ header included, resent verbatim
    pub pdu: Bytes,
    /// Retransmissions so far
    pub retransmissions: u32,
    timer: Option<TimerHandle>,
}

/// Ownership state of one ARQ sequence number
#[derive(Debug, Clone, Default)]
pub enum Slot {
    #[default]
    Free,
    /// Sent, retransmission timer running
    Transmitted(RetxContext),
    /// Timer expired, waiting for an opportunity to resend
    RetransmitQueued(RetxContext),
}

impl Slot {
    fn context(&self) -> Option<&RetxContext> {
        match self {
            Slot::Free => None,
            Slot::Transmitted(ctx) | Slot::RetransmitQueued(ctx) => Some(ctx),
        }
    }
}

/// Allocator of ARQ sequence numbers
///
/// Numbers are handed out in order and released in any order. A new number
/// is only available while it is free and lies within `window_size` of the
/// oldest number still in use.
#[derive(Debug)]
pub struct SendWindow {
    slots: Vec<Slot>,
    next: ArqSeqNo,
    oldest: ArqSeqNo,
    in_use: usize,
    window_size: u16,
}

impl SendWindow {
    pub fn new(window_size: u16) -> Self {
        SendWindow {
            slots: vec![Slot::Free; ArqSeqNo::MODULUS as usize],
            next: ArqSeqNo::new(0),
            oldest: ArqSeqNo::new(0),
            in_use: 0,
            window_size,
        }
    }

    /// Check whether a new sequence number can be allocated
    pub fn available(&self) -> bool {
        matches!(self.slots[self.next.index()], Slot::Free)
            && (self.in_use == 0 || self.next.distance_from(self.oldest) < self.window_size)
    }

    /// Sequence numbers currently held
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Sequence number the next allocation will return
    pub fn next_seq(&self) -> ArqSeqNo {
        self.next
    }

    pub fn slot(&self, seq: ArqSeqNo) -> &Slot {
        &self.slots[seq.index()]
    }

    fn slot_mut(&mut self, seq: ArqSeqNo) -> &mut Slot {
        &mut self.slots[seq.index()]
    }

    /// Allocate the next sequence number
    fn allocate(&mut self) -> ArqSeqNo {
        let seq = self.next;
        if self.in_use == 0 {
            self.oldest = seq;
        }
        self.in_use += 1;
        self.next.increment();
        seq
    }

    /// Free a sequence number, returning the context it held
    fn release(&mut self, seq: ArqSeqNo) -> Option<RetxContext> {
        let ctx = match std::mem::take(self.slot_mut(seq)) {
            Slot::Free => return None,
            Slot::Transmitted(ctx) | Slot::RetransmitQueued(ctx) => ctx,
        };

        self.in_use -= 1;
        if self.in_use == 0 {
            self.oldest = self.next;
        } else if seq == self.oldest {
            while matches!(self.slots[self.oldest.index()], Slot::Free) {
                self.oldest.increment();
            }
        }
        Some(ctx)
    }

    /// Occupied sequence numbers, oldest first
    fn occupied(&self) -> impl Iterator<Item = ArqSeqNo> + '_ {
        let span = if self.in_use == 0 {
            0
        } else {
            self.next.distance_from(self.oldest)
        };
        (0..span)
            .map(move |offset| self.oldest + offset)
            .filter(move |seq| !matches!(self.slots[seq.index()], Slot::Free))
    }
}

/// A frame chosen for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArqTransmission {
    pub seq: ArqSeqNo,
    pub frame: Bytes,
    pub retransmission: bool,
}

/// Result of a retransmission timer expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetransmitOutcome {
    /// Queued for retransmission
    Queued,
    /// Retry budget spent, sequence number released
    Dropped,
    /// Timer no longer relevant
    Stale,
}

/// Transmit side of an acknowledged link
#[derive(Debug)]
pub struct ArqSender {
    assembler: SegmentAssembler,
    window: SendWindow,
    header_size: usize,
    max_retransmissions: u32,
    retransmission_timeout: Duration,
}

impl ArqSender {
    pub fn new(
        assembler: SegmentAssembler,
        window_size: u16,
        header_size: usize,
        max_retransmissions: u32,
        retransmission_timeout: Duration,
    ) -> Self {
        ArqSender {
            assembler,
            window: SendWindow::new(window_size),
            header_size,
            max_retransmissions,
            retransmission_timeout,
        }
    }

    pub fn assembler(&self) -> &SegmentAssembler {
        &self.assembler
    }

    pub fn assembler_mut(&mut self) -> &mut SegmentAssembler {
        &mut self.assembler
    }

    pub fn window(&self) -> &SendWindow {
        &self.window
    }

    /// Pick a frame for a transmission opportunity of `budget` bytes
    ///
    /// The oldest queued retransmission goes first if it fits. Otherwise a
    /// new segment is built, provided a sequence number is available.
    pub fn notify_tx_opportunity<C: LinkContext>(
        &mut self,
        budget: usize,
        timers: &mut TimerArena<TimerKind>,
        cx: &mut C,
    ) -> Result<Option<ArqTransmission>, FrameError> {
        if let Some(transmission) = self.retransmit(budget, timers, cx) {
            return Ok(Some(transmission));
        }

        if budget <= self.header_size || self.assembler.is_empty() {
            return Ok(None);
        }

        if !self.window.available() {
            trace!(
                next = self.window.next_seq().as_raw(),
                in_use = self.window.in_use(),
                "no ARQ sequence number available, transmission stalled"
            );
            return Ok(None);
        }

        let segment = match self.assembler.notify_tx_opportunity(budget - self.header_size) {
            Some(segment) => segment,
            None => return Ok(None),
        };

        self.transmit_new(segment, timers, cx).map(Some)
    }

    /// Frame `segment` under the next sequence number and start its timer
    ///
    /// The sequence number is only taken once the frame is encoded.
    fn transmit_new<C: LinkContext>(
        &mut self,
        segment: Segment,
        timers: &mut TimerArena<TimerKind>,
        cx: &mut C,
    ) -> Result<ArqTransmission, FrameError> {
        let seq = self.window.next_seq();
        let mut buf = BytesMut::with_capacity(self.header_size + segment.encoded_len());
        buf.put_bytes(0, self.header_size - 1);
        buf.put_u8(seq.as_raw() as u8);
        segment.encode(&mut buf)?;
        let frame = buf.freeze();

        let allocated = self.window.allocate();
        debug_assert_eq!(allocated, seq);

        let timer = timers.start(TimerKind::Retransmit(seq), self.retransmission_timeout, cx);
        *self.window.slot_mut(seq) = Slot::Transmitted(RetxContext {
            seq,
            pdu: frame.clone(),
            retransmissions: 0,
            timer: Some(timer),
        });

        trace!(seq = seq.as_raw(), len = frame.len(), "ARQ PDU sent");
        Ok(ArqTransmission {
            seq,
            frame,
            retransmission: false,
        })
    }

    fn retransmit<C: LinkContext>(
        &mut self,
        budget: usize,
        timers: &mut TimerArena<TimerKind>,
        cx: &mut C,
    ) -> Option<ArqTransmission> {
        let seq = self
            .window
            .occupied()
            .find(|seq| matches!(self.window.slot(*seq), Slot::RetransmitQueued(_)))?;

        let slot = self.window.slot_mut(seq);
        let fits = matches!(slot, Slot::RetransmitQueued(ctx) if ctx.pdu.len() <= budget);
        if !fits {
            trace!(seq = seq.as_raw(), budget, "queued retransmission does not fit");
            return None;
        }

        let mut ctx = match std::mem::take(slot) {
            Slot::RetransmitQueued(ctx) => ctx,
            _ => return None,
        };
        ctx.retransmissions += 1;
        ctx.timer = Some(timers.start(TimerKind::Retransmit(seq), self.retransmission_timeout, cx));
        let frame = ctx.pdu.clone();
        debug!(seq = seq.as_raw(), retransmissions = ctx.retransmissions, "ARQ PDU retransmitted");
        *self.window.slot_mut(seq) = Slot::Transmitted(ctx);

        Some(ArqTransmission {
            seq,
            frame,
            retransmission: true,
        })
    }

    /// Handle expiry of the retransmission timer armed for `seq`
    pub fn on_retransmit_timeout(&mut self, seq: ArqSeqNo, handle: TimerHandle) -> RetransmitOutcome {
        let ctx = match self.window.slot_mut(seq) {
            Slot::Transmitted(ctx) if ctx.timer == Some(handle) => ctx,
            _ => {
                warn!(seq = seq.as_raw(), ?handle, "retransmission timeout for a retired PDU");
                return RetransmitOutcome::Stale;
            }
        };

        if ctx.retransmissions < self.max_retransmissions {
            ctx.timer = None;
            let ctx = match std::mem::take(self.window.slot_mut(seq)) {
                Slot::Transmitted(ctx) => ctx,
                _ => return RetransmitOutcome::Stale,
            };
            trace!(seq = seq.as_raw(), "ARQ PDU queued for retransmission");
            *self.window.slot_mut(seq) = Slot::RetransmitQueued(ctx);
            RetransmitOutcome::Queued
        } else {
            debug!(
                seq = seq.as_raw(),
                retransmissions = ctx.retransmissions,
                "ARQ PDU dropped after maximum retransmissions"
            );
            self.window.release(seq);
            RetransmitOutcome::Dropped
        }
    }

    /// Handle an acknowledgment for `seq`
    ///
    /// Returns false if nothing was outstanding under that number.
    pub fn on_ack(&mut self, seq: ArqSeqNo, timers: &mut TimerArena<TimerKind>) -> bool {
        match self.window.release(seq) {
            Some(ctx) => {
                if let Some(timer) = ctx.timer {
                    timers.cancel(timer);
                }
                trace!(seq = seq.as_raw(), retransmissions = ctx.retransmissions, "ARQ PDU acknowledged");
                true
            }
            None => {
                debug!(seq = seq.as_raw(), "acknowledgment for a free sequence number");
                false
            }
        }
    }

    /// Bytes awaiting transmission, acknowledgment or retransmission
    pub fn buffered_bytes(&self) -> usize {
        let held: usize = self
            .window
            .occupied()
            .filter_map(|seq| self.window.slot(seq).context())
            .map(|ctx| ctx.pdu.len())
            .sum();
        self.assembler.buffered_bytes() + held
    }

    /// Smallest opportunity that sends the head-of-line frame whole
    pub fn min_tx_opportunity(&self) -> usize {
        let queued = self.window.occupied().find_map(|seq| match self.window.slot(seq) {
            Slot::RetransmitQueued(ctx) => Some(ctx.pdu.len()),
            _ => None,
        });

        match queued {
            Some(len) => len,
            None if self.assembler.is_empty() => 0,
            None => self.header_size + self.assembler.min_tx_opportunity(),
        }
    }

    pub fn head_of_line_delay(&self, now: Timestamp) -> Duration {
        self.assembler.head_of_line_delay(now)
    }
}
