//! Segment Structures and Serialization
//!
//! One segment (link PDU) carries fragments of one or more SDUs. The header
//! is bit-packed:
//!
//! ```text
//! [sequence number : 10 bits]
//! repeat {
//!   [extension bit : 1 bit]       // 0 = last field, no length indicator follows
//!   [length indicator : 11 bits]  // present only if extension bit == 1
//! }
//! [framing info : 2 bits]         // bit 1 = no first byte, bit 0 = no last byte
//! [zero padding to a byte boundary]
//! [payload bytes...]
//! ```
//!
//! Every data field except the last has a length indicator; the last one
//! takes the rest of the payload. With `k` length indicators the header is
//! `ceil((13 + 12k) / 8)` bytes: two bytes, then alternately two and one more
//! per indicator.

use crate::sequence::Sn10;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

/// Size of the header when the segment carries a single data field
pub const FIXED_HEADER_SIZE: usize = 2;

/// Largest value the 11-bit length indicator can carry
pub const MAX_LENGTH_INDICATOR: usize = 0x7FF;

const SN_BITS: u32 = 10;
const LI_BITS: u32 = 11;
const FI_BITS: u32 = 2;

const FI_NO_FIRST_BYTE: u8 = 0b10;
const FI_NO_LAST_BYTE: u8 = 0b01;

/// Wire decoding errors
///
/// These indicate a peer speaking a different protocol version or an
/// implementation bug, never ordinary channel loss.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Length indicator {length} does not leave room in a {remaining}-byte payload")]
    LengthIndicatorOverrun { length: usize, remaining: usize },

    #[error("Zero length indicator")]
    ZeroLengthIndicator,

    #[error("Data field of {0} bytes exceeds the length indicator range")]
    FieldTooLong(usize),

    #[error("Segment carries no data")]
    EmptySegment,

    #[error("Unexpected control message tag {0:#04x}")]
    UnexpectedTag(u8),
}

/// Framing info: whether the payload starts and ends on SDU boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingInfo {
    /// First payload byte is the first byte of an SDU
    pub first_byte: bool,
    /// Last payload byte is the last byte of an SDU
    pub last_byte: bool,
}

impl FramingInfo {
    /// Both ends on SDU boundaries
    pub const FULL: FramingInfo = FramingInfo {
        first_byte: true,
        last_byte: true,
    };

    pub fn new(first_byte: bool, last_byte: bool) -> Self {
        FramingInfo {
            first_byte,
            last_byte,
        }
    }

    pub fn from_bits(bits: u8) -> Self {
        FramingInfo {
            first_byte: bits & FI_NO_FIRST_BYTE == 0,
            last_byte: bits & FI_NO_LAST_BYTE == 0,
        }
    }

    pub fn as_bits(self) -> u8 {
        let mut bits = 0;
        if !self.first_byte {
            bits |= FI_NO_FIRST_BYTE;
        }
        if !self.last_byte {
            bits |= FI_NO_LAST_BYTE;
        }
        bits
    }
}

/// Header size in bytes for a segment with `fields` data fields
pub fn header_size(fields: usize) -> usize {
    let indicators = fields.saturating_sub(1) as u32;
    let bits = SN_BITS + indicators * (1 + LI_BITS) + 1 + FI_BITS;
    ((bits + 7) / 8) as usize
}

/// Extra header bytes the `id`-th data field's length indicator costs
///
/// Fields are numbered from 1. Indicators are 12 bits (E + LI), so they
/// alternate between adding two bytes and one byte to the header.
#[inline]
pub fn length_indicator_cost(id: usize) -> usize {
    if id % 2 == 1 {
        2
    } else {
        1
    }
}

/// One link segment
#[derive(Clone, PartialEq, Eq)]
pub struct Segment {
    /// Segment sequence number
    pub seq: Sn10,
    /// Framing info
    pub framing: FramingInfo,
    /// Data fields, in order; every field but the last has a length indicator
    pub fields: Vec<Bytes>,
}

impl Segment {
    pub fn new(seq: Sn10, framing: FramingInfo, fields: Vec<Bytes>) -> Self {
        Segment {
            seq,
            framing,
            fields,
        }
    }

    /// Total payload bytes
    pub fn payload_len(&self) -> usize {
        self.fields.iter().map(Bytes::len).sum()
    }

    /// Header bytes on the wire
    pub fn header_len(&self) -> usize {
        header_size(self.fields.len())
    }

    /// Serialized size
    pub fn encoded_len(&self) -> usize {
        self.header_len() + self.payload_len()
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Bytes, FrameError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Serialize into `buf`
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), FrameError> {
        let (last, rest) = self.fields.split_last().ok_or(FrameError::EmptySegment)?;
        if last.is_empty() {
            return Err(FrameError::EmptySegment);
        }

        let mut writer = BitWriter::new(buf);
        writer.put(u32::from(self.seq.as_raw()), SN_BITS);
        for field in rest {
            if field.is_empty() {
                return Err(FrameError::ZeroLengthIndicator);
            }
            if field.len() > MAX_LENGTH_INDICATOR {
                return Err(FrameError::FieldTooLong(field.len()));
            }
            writer.put(1, 1);
            writer.put(field.len() as u32, LI_BITS);
        }
        writer.put(0, 1);
        writer.put(u32::from(self.framing.as_bits()), FI_BITS);
        writer.finish();

        for field in &self.fields {
            buf.put_slice(field);
        }
        Ok(())
    }

    /// Parse a segment from bytes
    pub fn from_bytes(bytes: &Bytes) -> Result<Self, FrameError> {
        let mut reader = BitReader::new(bytes);
        let seq = Sn10::new_unchecked(reader.get(SN_BITS)? as u16);

        let mut lengths = Vec::new();
        while reader.get(1)? == 1 {
            let length = reader.get(LI_BITS)? as usize;
            if length == 0 {
                return Err(FrameError::ZeroLengthIndicator);
            }
            lengths.push(length);
        }
        let framing = FramingInfo::from_bits(reader.get(FI_BITS)? as u8);

        let mut payload = bytes.slice(reader.byte_len()..);
        let mut fields = Vec::with_capacity(lengths.len() + 1);
        for length in lengths {
            // The trailing field must keep at least one byte
            if length >= payload.len() {
                return Err(FrameError::LengthIndicatorOverrun {
                    length,
                    remaining: payload.len(),
                });
            }
            fields.push(payload.split_to(length));
        }
        if payload.is_empty() {
            return Err(FrameError::EmptySegment);
        }
        fields.push(payload);

        Ok(Segment {
            seq,
            framing,
            fields,
        })
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("seq", &self.seq.as_raw())
            .field("framing", &self.framing)
            .field(
                "fields",
                &self.fields.iter().map(Bytes::len).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// MSB-first bit packer
struct BitWriter<'a> {
    buf: &'a mut BytesMut,
    acc: u64,
    bits: u32,
}

impl<'a> BitWriter<'a> {
    fn new(buf: &'a mut BytesMut) -> Self {
        BitWriter { buf, acc: 0, bits: 0 }
    }

    fn put(&mut self, value: u32, width: u32) {
        self.acc = (self.acc << width) | u64::from(value & ((1 << width) - 1));
        self.bits += width;
        while self.bits >= 8 {
            self.bits -= 8;
            self.buf.put_u8((self.acc >> self.bits) as u8);
        }
    }

    fn finish(mut self) {
        if self.bits > 0 {
            let pad = 8 - self.bits;
            self.put(0, pad);
        }
    }
}

/// MSB-first bit reader
struct BitReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        BitReader { bytes, position: 0 }
    }

    fn get(&mut self, width: u32) -> Result<u32, FrameError> {
        let end = self.position + width as usize;
        let needed = (end + 7) / 8;
        if needed > self.bytes.len() {
            return Err(FrameError::Truncated {
                needed,
                available: self.bytes.len(),
            });
        }

        let mut value = 0u32;
        for bit in self.position..end {
            let byte = self.bytes[bit / 8];
            let set = (byte >> (7 - bit % 8)) & 1;
            value = (value << 1) | u32::from(set);
        }
        self.position = end;
        Ok(value)
    }

    /// Bytes consumed so far, including padding of a partial byte
    fn byte_len(&self) -> usize {
        (self.position + 7) / 8
    }
}
