//! ARQ receive side
//!
//! Every well-formed ARQ frame is acknowledged as soon as it is parsed,
//! before its fate in the receive buffer is known. A frame that is then
//! discarded as old or duplicate has still been acknowledged.
//!
//! The 8-bit ARQ sequence number is mapped onto a continuous counter. Frames
//! ahead of the next expected counter wait in an ordered buffer; every
//! skipped counter gets a placeholder with its own waiting timer. When that
//! timer fires the placeholder is abandoned so delivery can move past it.

use crate::ack::AckMessage;
use crate::context::LinkContext;
use crate::engine::LinkError;
use crate::reassembly::Reassembler;
use crate::segment::{FrameError, Segment};
use crate::sequence::{ArqSeqNo, Unwrapper};
use crate::timer::{TimerArena, TimerHandle, TimerKind};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Receive buffer entry at one counter value
#[derive(Debug)]
enum RxEntry {
    /// Not received yet, waiting timer running
    Pending(TimerHandle),
    /// Received, waiting for earlier entries
    Received(Segment),
    /// Waiting timer fired, given up on
    Abandoned,
}

/// What happened to a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArqRxOutcome {
    /// Stored (and possibly delivered)
    Stored,
    /// Older than the next expected counter
    Old,
    /// Already received
    Duplicate,
}

/// Receive side of an acknowledged link
#[derive(Debug)]
pub struct ArqReceiver {
    flow_id: u8,
    header_size: usize,
    waiting_timeout: Duration,
    unwrapper: Unwrapper,
    next_expected: u64,
    buffer: BTreeMap<u64, RxEntry>,
    reassembler: Reassembler,
}

impl ArqReceiver {
    pub fn new(flow_id: u8, window_size: u16, header_size: usize, waiting_timeout: Duration) -> Self {
        ArqReceiver {
            flow_id,
            header_size,
            waiting_timeout,
            unwrapper: Unwrapper::new(window_size),
            next_expected: 0,
            buffer: BTreeMap::new(),
            reassembler: Reassembler::new(),
        }
    }

    /// Next counter value awaited for in-order delivery
    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Entries held in the receive buffer, placeholders included
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Parse, acknowledge and store one ARQ frame
    pub fn receive<C: LinkContext>(
        &mut self,
        frame: &Bytes,
        timers: &mut TimerArena<TimerKind>,
        cx: &mut C,
    ) -> Result<ArqRxOutcome, LinkError> {
        if frame.len() <= self.header_size {
            return Err(FrameError::Truncated {
                needed: self.header_size + 1,
                available: frame.len(),
            }
            .into());
        }

        let seq = ArqSeqNo::new_unchecked(u16::from(frame[self.header_size - 1]));
        let segment = Segment::from_bytes(&frame.slice(self.header_size..))?;

        cx.send_ack(AckMessage::new(self.flow_id, seq));

        let counter = match self.unwrapper.unwrap(seq, self.next_expected) {
            Some(counter) if counter >= self.next_expected => counter,
            _ => {
                debug!(
                    seq = seq.as_raw(),
                    next_expected = self.next_expected,
                    "discarding ARQ PDU from the past"
                );
                return Ok(ArqRxOutcome::Old);
            }
        };

        match self.buffer.get(&counter) {
            Some(RxEntry::Pending(handle)) => {
                timers.cancel(*handle);
            }
            Some(RxEntry::Received(_)) | Some(RxEntry::Abandoned) => {
                debug!(seq = seq.as_raw(), counter, "discarding duplicate ARQ PDU");
                return Ok(ArqRxOutcome::Duplicate);
            }
            None => {
                for missing in self.next_expected..counter {
                    if !self.buffer.contains_key(&missing) {
                        let handle = timers.start(TimerKind::RxWaiting(missing), self.waiting_timeout, cx);
                        self.buffer.insert(missing, RxEntry::Pending(handle));
                    }
                }
            }
        }

        trace!(seq = seq.as_raw(), counter, "ARQ PDU stored");
        self.buffer.insert(counter, RxEntry::Received(segment));
        self.drain(cx)?;
        Ok(ArqRxOutcome::Stored)
    }

    /// Handle expiry of the waiting timer for `counter`
    pub fn on_waiting_timeout<C: LinkContext>(
        &mut self,
        counter: u64,
        handle: TimerHandle,
        cx: &mut C,
    ) -> Result<(), LinkError> {
        let pending = matches!(self.buffer.get(&counter), Some(RxEntry::Pending(h)) if *h == handle);
        if !pending {
            warn!(counter, ?handle, "waiting timeout for an entry no longer pending");
            return Ok(());
        }

        debug!(counter, "giving up on missing ARQ PDU");
        self.buffer.insert(counter, RxEntry::Abandoned);
        self.drain(cx)
    }

    /// Reassemble entries from the head of the buffer while contiguous
    fn drain<C: LinkContext>(&mut self, cx: &mut C) -> Result<(), LinkError> {
        loop {
            match self.buffer.get(&self.next_expected) {
                Some(RxEntry::Received(_)) | Some(RxEntry::Abandoned) => {}
                _ => return Ok(()),
            }

            if let Some(RxEntry::Received(segment)) = self.buffer.remove(&self.next_expected) {
                self.reassembler.process(segment, cx)?;
            }
            self.next_expected += 1;
        }
    }
}
