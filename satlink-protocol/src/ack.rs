//! ARQ acknowledgment messages
//!
//! The receiver acknowledges every ARQ PDU individually with a small control
//! message carrying the 8-bit ARQ sequence number. There is no negative
//! acknowledgment: loss recovery is driven by the sender's retransmission
//! timers alone.

use crate::segment::FrameError;
use crate::sequence::ArqSeqNo;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Control message tag identifying an ARQ acknowledgment
pub const ACK_TAG: u8 = 0xA5;

/// Serialized size of an acknowledgment
pub const ACK_SIZE: usize = 3;

/// ARQ acknowledgment: "PDU with this sequence number was stored"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckMessage {
    /// Flow the acknowledged PDU belongs to
    pub flow_id: u8,
    /// Acknowledged ARQ sequence number
    pub seq: ArqSeqNo,
}

impl AckMessage {
    /// Create a new acknowledgment
    pub fn new(flow_id: u8, seq: ArqSeqNo) -> Self {
        AckMessage { flow_id, seq }
    }

    /// Serialize to control message bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ACK_SIZE);
        buf.put_u8(ACK_TAG);
        buf.put_u8(self.flow_id);
        buf.put_u8(self.seq.as_raw() as u8);
        buf.freeze()
    }

    /// Parse from control message bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < ACK_SIZE {
            return Err(FrameError::Truncated {
                needed: ACK_SIZE,
                available: bytes.len(),
            });
        }

        let mut buf = bytes;
        let tag = buf.get_u8();
        if tag != ACK_TAG {
            return Err(FrameError::UnexpectedTag(tag));
        }

        Ok(AckMessage {
            flow_id: buf.get_u8(),
            seq: ArqSeqNo::new_unchecked(u16::from(buf.get_u8())),
        })
    }
}
