//! SDU reassembly
//!
//! Segments reach the [`Reassembler`] in sequence order. It rebuilds SDUs
//! from their data fields, carrying an unfinished SDU over to the next
//! segment. A gap in sequence numbers means the carried bytes can never be
//! completed, so they are dropped along with any leading fragment whose
//! start was lost.

use crate::context::LinkContext;
use crate::segment::Segment;
use crate::sequence::Sn10;
use bytes::BytesMut;
use thiserror::Error;
use tracing::{debug, trace};

/// Reassembly errors
///
/// Both indicate a sender that does not follow the framing rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyError {
    #[error("Segment {seq} opens a new SDU while a partial SDU is pending")]
    UnexpectedFirstByte { seq: u16 },

    #[error("Segment {seq} carries no data fields")]
    NoDataFields { seq: u16 },
}

/// Reassembly state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyState {
    /// Next segment is expected to start on an SDU boundary
    WaitingFull,
    /// An SDU tail is kept, the next segment should continue it
    WaitingPartial,
}

/// Fate of a segment's leading data field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Head {
    /// Starts a new SDU
    Opens,
    /// Continues the kept partial SDU
    Joins,
    /// Continues an SDU whose start was lost
    Orphaned,
}

/// Fate of a segment's trailing data field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    /// Ends an SDU
    Complete,
    /// Kept until the next segment
    Kept,
}

/// One cell of the reassembly table
#[derive(Debug, Clone, Copy)]
struct Transition {
    discard_kept: bool,
    head: Head,
    tail: Tail,
}

impl Transition {
    const fn new(head: Head, tail: Tail) -> Self {
        Transition { discard_kept: false, head, tail }
    }

    const fn discarding(head: Head, tail: Tail) -> Self {
        Transition { discard_kept: true, head, tail }
    }
}

/// Rebuilds SDUs from in-order segments
#[derive(Debug)]
pub struct Reassembler {
    state: ReassemblyState,
    kept: BytesMut,
    expected: Sn10,
}

impl Reassembler {
    /// Create a reassembler expecting sequence number 0
    pub fn new() -> Self {
        Reassembler {
            state: ReassemblyState::WaitingFull,
            kept: BytesMut::new(),
            expected: Sn10::new(0),
        }
    }

    pub fn state(&self) -> ReassemblyState {
        self.state
    }

    /// Bytes of the partial SDU currently kept
    pub fn kept_len(&self) -> usize {
        self.kept.len()
    }

    /// Look up what a segment does in the current state
    ///
    /// `first` and `last` are the framing bits, `loss` is set when the
    /// segment does not follow the previous one.
    fn transition(&self, seq: Sn10, first: bool, last: bool, loss: bool) -> Result<Transition, ReassemblyError> {
        use Head::{Joins, Opens, Orphaned};
        use ReassemblyState::{WaitingFull, WaitingPartial};
        use Tail::{Complete, Kept};

        let transition = match (self.state, first, last, loss) {
            (WaitingFull, true, true, _) => Transition::new(Opens, Complete),
            (WaitingFull, true, false, _) => Transition::new(Opens, Kept),
            (WaitingFull, false, true, _) => Transition::new(Orphaned, Complete),
            (WaitingFull, false, false, _) => Transition::new(Orphaned, Kept),

            (WaitingPartial, true, _, false) => {
                return Err(ReassemblyError::UnexpectedFirstByte { seq: seq.as_raw() })
            }
            (WaitingPartial, false, true, false) => Transition::new(Joins, Complete),
            (WaitingPartial, false, false, false) => Transition::new(Joins, Kept),

            // The kept partial can never be completed after a gap
            (WaitingPartial, true, true, true) => Transition::discarding(Opens, Complete),
            (WaitingPartial, true, false, true) => Transition::discarding(Opens, Kept),
            (WaitingPartial, false, true, true) => Transition::discarding(Orphaned, Complete),
            (WaitingPartial, false, false, true) => Transition::discarding(Orphaned, Kept),
        };
        Ok(transition)
    }

    /// Reassemble one segment, delivering every SDU it completes
    ///
    /// Returns the number of SDUs delivered.
    pub fn process<C: LinkContext>(
        &mut self,
        segment: Segment,
        cx: &mut C,
    ) -> Result<usize, ReassemblyError> {
        let seq = segment.seq;
        let loss = seq != self.expected;
        self.expected = seq.next();

        if segment.fields.is_empty() {
            return Err(ReassemblyError::NoDataFields { seq: seq.as_raw() });
        }

        let framing = segment.framing;
        let step = self.transition(seq, framing.first_byte, framing.last_byte, loss)?;

        if step.discard_kept {
            debug!(
                seq = seq.as_raw(),
                kept = self.kept.len(),
                "sequence gap, dropping partial SDU"
            );
            self.kept.clear();
        }

        let mut fields = segment.fields.into_iter();
        let head = match step.head {
            Head::Opens => fields.next(),
            Head::Joins => {
                if let Some(field) = fields.next() {
                    self.kept.extend_from_slice(&field);
                }
                if fields.len() == 0 && step.tail == Tail::Kept {
                    trace!(seq = seq.as_raw(), kept = self.kept.len(), "segment carries a middle fragment");
                    return Ok(0);
                }
                Some(self.kept.split().freeze())
            }
            Head::Orphaned => {
                if let Some(field) = fields.next() {
                    debug!(seq = seq.as_raw(), len = field.len(), "dropping orphaned fragment");
                }
                None
            }
        };

        self.state = ReassemblyState::WaitingFull;
        let mut sdus = head.into_iter().chain(fields).peekable();
        let mut delivered = 0;
        while let Some(sdu) = sdus.next() {
            if step.tail == Tail::Kept && sdus.peek().is_none() {
                self.kept.clear();
                self.kept.extend_from_slice(&sdu);
                self.state = ReassemblyState::WaitingPartial;
            } else {
                cx.deliver(sdu);
                delivered += 1;
            }
        }

        trace!(seq = seq.as_raw(), delivered, state = ?self.state, "segment reassembled");
        Ok(delivered)
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
