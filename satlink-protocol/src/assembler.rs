//! Transmit-side segmentation
//!
//! [`SegmentAssembler`] buffers SDUs and, for each transmission opportunity,
//! carves out one segment that fits the byte budget. A segment may pack the
//! tails and heads of several SDUs; an SDU that does not fit is split and its
//! remainder goes back to the front of the buffer.

use crate::segment::{
    length_indicator_cost, FramingInfo, Segment, FIXED_HEADER_SIZE, MAX_LENGTH_INDICATOR,
};
use crate::sequence::Sn10;
use crate::time::Timestamp;
use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Budget left over after which packing another SDU is not worth a length
/// indicator
const PACKING_SLACK: usize = 2;

/// Buffer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Transmit buffer overflow: {sdu_len}-byte SDU with {buffered} of {capacity} bytes used")]
    Overflow {
        sdu_len: usize,
        buffered: usize,
        capacity: usize,
    },

    #[error("Empty SDU")]
    EmptySdu,
}

/// Which part of an SDU a buffered chunk is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SduStatus {
    /// The whole SDU
    Full,
    /// Starts the SDU, does not end it
    First,
    /// Neither starts nor ends the SDU
    Middle,
    /// Ends the SDU, does not start it
    Last,
}

impl SduStatus {
    /// Chunk begins on an SDU boundary
    pub fn starts_sdu(self) -> bool {
        matches!(self, SduStatus::Full | SduStatus::First)
    }

    /// Chunk ends on an SDU boundary
    pub fn ends_sdu(self) -> bool {
        matches!(self, SduStatus::Full | SduStatus::Last)
    }

    /// Status of the two halves when this chunk is split
    fn split(self) -> (SduStatus, SduStatus) {
        let head = if self.starts_sdu() {
            SduStatus::First
        } else {
            SduStatus::Middle
        };
        let rest = if self.ends_sdu() {
            SduStatus::Last
        } else {
            SduStatus::Middle
        };
        (head, rest)
    }
}

/// SDU (or SDU remainder) waiting for transmission
#[derive(Debug, Clone)]
struct TxEntry {
    data: Bytes,
    status: SduStatus,
    enqueued_at: Timestamp,
}

/// Transmit buffer and segment builder
#[derive(Debug)]
pub struct SegmentAssembler {
    queue: VecDeque<TxEntry>,
    buffered_bytes: usize,
    max_buffer_bytes: usize,
    next_seq: Sn10,
}

impl SegmentAssembler {
    /// Create an assembler holding at most `max_buffer_bytes` of SDU data
    pub fn new(max_buffer_bytes: usize) -> Self {
        SegmentAssembler {
            queue: VecDeque::new(),
            buffered_bytes: 0,
            max_buffer_bytes,
            next_seq: Sn10::new(0),
        }
    }

    /// Buffer an SDU for transmission
    ///
    /// An SDU that does not fit is rejected whole; nothing is stored.
    pub fn enqueue(&mut self, sdu: Bytes, now: Timestamp) -> Result<(), BufferError> {
        if sdu.is_empty() {
            return Err(BufferError::EmptySdu);
        }

        if self.buffered_bytes + sdu.len() > self.max_buffer_bytes {
            return Err(BufferError::Overflow {
                sdu_len: sdu.len(),
                buffered: self.buffered_bytes,
                capacity: self.max_buffer_bytes,
            });
        }

        self.buffered_bytes += sdu.len();
        self.queue.push_back(TxEntry {
            data: sdu,
            status: SduStatus::Full,
            enqueued_at: now,
        });
        Ok(())
    }

    /// Build at most one segment fitting in `budget` bytes
    ///
    /// Returns `None` when the budget cannot hold the fixed header plus one
    /// payload byte, or when nothing is buffered.
    pub fn notify_tx_opportunity(&mut self, budget: usize) -> Option<Segment> {
        if budget <= FIXED_HEADER_SIZE {
            trace!(budget, "tx opportunity too small");
            return None;
        }

        let mut current = self.pop_front()?;
        let mut remaining = budget - FIXED_HEADER_SIZE;
        let mut fields: Vec<(Bytes, SduStatus)> = Vec::new();

        loop {
            let len = current.data.len();

            if len > remaining || len > MAX_LENGTH_INDICATOR {
                // Only the last field may be unbounded by the length indicator,
                // so an oversized chunk always closes the segment.
                let take = len.min(remaining);
                if take < len {
                    let (head_status, rest_status) = current.status.split();
                    let head = current.data.split_to(take);
                    current.status = rest_status;
                    self.push_front(current);
                    fields.push((head, head_status));
                } else {
                    fields.push((current.data, current.status));
                }
                break;
            }

            if remaining - len <= PACKING_SLACK || self.queue.is_empty() {
                fields.push((current.data, current.status));
                break;
            }

            fields.push((current.data, current.status));
            remaining -= len + length_indicator_cost(fields.len());
            current = match self.pop_front() {
                Some(entry) => entry,
                None => break,
            };
        }

        let first = fields.first().map(|(_, s)| s.starts_sdu()).unwrap_or(true);
        let last = fields.last().map(|(_, s)| s.ends_sdu()).unwrap_or(true);

        let seq = self.next_seq;
        self.next_seq.increment();

        let segment = Segment::new(
            seq,
            FramingInfo::new(first, last),
            fields.into_iter().map(|(data, _)| data).collect(),
        );
        trace!(seq = seq.as_raw(), ?segment, "segment assembled");
        Some(segment)
    }

    /// Bytes buffered and not yet segmented
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    /// Number of SDUs (or remainders) in the buffer
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Smallest opportunity that sends the head-of-line chunk whole
    ///
    /// Zero when the buffer is empty.
    pub fn min_tx_opportunity(&self) -> usize {
        self.queue
            .front()
            .map(|entry| FIXED_HEADER_SIZE + entry.data.len())
            .unwrap_or(0)
    }

    /// Time the head-of-line SDU has spent in the buffer
    pub fn head_of_line_delay(&self, now: Timestamp) -> Duration {
        self.queue
            .front()
            .map(|entry| now - entry.enqueued_at)
            .unwrap_or(Duration::ZERO)
    }

    /// Sequence number the next segment will carry
    pub fn next_seq(&self) -> Sn10 {
        self.next_seq
    }

    fn pop_front(&mut self) -> Option<TxEntry> {
        let entry = self.queue.pop_front()?;
        self.buffered_bytes -= entry.data.len();
        Some(entry)
    }

    fn push_front(&mut self, entry: TxEntry) {
        self.buffered_bytes += entry.data.len();
        self.queue.push_front(entry);
    }
}
