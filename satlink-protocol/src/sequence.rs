//! Sequence Number Handling
//!
//! Segment headers carry 10-bit sequence numbers and the ARQ header carries
//! 8-bit ones. Both wrap around, so a raw value has no meaningful order on its
//! own. Every comparison is made relative to an explicit base (normally the
//! low edge of the current window) through [`Anchored`].

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Sequence number with `BITS`-bit wraparound semantics
///
/// There is deliberately no `Ord`/`PartialOrd` on this type. Use
/// [`SeqNumber::anchored`] to obtain a comparable value.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct SeqNumber<const BITS: u32>(u16);

/// 10-bit sequence number used by the segment header and the reordering window
pub type Sn10 = SeqNumber<10>;

/// 8-bit sequence number used by the ARQ header and acknowledgments
pub type ArqSeqNo = SeqNumber<8>;

impl<const BITS: u32> SeqNumber<BITS> {
    /// Size of the sequence space
    pub const MODULUS: u32 = 1 << BITS;

    /// Largest representable value
    pub const MAX: u16 = ((1u32 << BITS) - 1) as u16;

    /// Create a new sequence number
    ///
    /// # Panics
    /// Panics if value exceeds the sequence space
    pub fn new(value: u16) -> Self {
        assert!(
            value <= Self::MAX,
            "Sequence number {} exceeds maximum {}",
            value,
            Self::MAX
        );
        SeqNumber(value)
    }

    /// Create a sequence number, masking the value into the sequence space
    #[inline]
    pub fn new_unchecked(value: u16) -> Self {
        SeqNumber(value & Self::MAX)
    }

    /// Get the raw sequence number value
    #[inline]
    pub fn as_raw(self) -> u16 {
        self.0
    }

    /// Slot index for tables sized to the whole sequence space
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Increment the sequence number by 1
    #[inline]
    pub fn increment(&mut self) {
        *self = self.next();
    }

    /// Get the next sequence number
    #[inline]
    pub fn next(self) -> Self {
        Self::new_unchecked(self.0.wrapping_add(1))
    }

    /// Forward distance from `base` to `self`, in `[0, MODULUS)`
    #[inline]
    pub fn distance_from(self, base: Self) -> u16 {
        self.0.wrapping_sub(base.0) & Self::MAX
    }

    /// Re-anchor this sequence number to `base` for comparison
    #[inline]
    pub fn anchored(self, base: Self) -> Anchored<BITS> {
        Anchored { seq: self, base }
    }

    /// `self < other`, both measured forward from `base`
    #[inline]
    pub fn lt(self, other: Self, base: Self) -> bool {
        self.anchored(base) < other.anchored(base)
    }

    /// `self <= other`, both measured forward from `base`
    #[inline]
    pub fn le(self, other: Self, base: Self) -> bool {
        self.anchored(base) <= other.anchored(base)
    }
}

/// A sequence number paired with the base it is measured from
///
/// Two anchored values only compare when they share the same base;
/// `partial_cmp` returns `None` otherwise, so every ordering operator yields
/// `false` for a mismatched pair instead of a silently wrong answer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Anchored<const BITS: u32> {
    seq: SeqNumber<BITS>,
    base: SeqNumber<BITS>,
}

impl<const BITS: u32> Anchored<BITS> {
    /// Offset of the sequence number from the base
    #[inline]
    pub fn offset(&self) -> u16 {
        self.seq.distance_from(self.base)
    }

    /// The anchored sequence number
    #[inline]
    pub fn seq(&self) -> SeqNumber<BITS> {
        self.seq
    }

    /// The base used for comparisons
    #[inline]
    pub fn base(&self) -> SeqNumber<BITS> {
        self.base
    }
}

impl<const BITS: u32> PartialOrd for Anchored<BITS> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.base != other.base {
            return None;
        }
        Some(self.offset().cmp(&other.offset()))
    }
}

impl<const BITS: u32> fmt::Debug for SeqNumber<BITS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNumber<{}>({})", BITS, self.0)
    }
}

impl<const BITS: u32> fmt::Display for SeqNumber<BITS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<const BITS: u32> From<u16> for SeqNumber<BITS> {
    fn from(value: u16) -> Self {
        SeqNumber::new_unchecked(value)
    }
}

impl<const BITS: u32> From<SeqNumber<BITS>> for u16 {
    fn from(seq: SeqNumber<BITS>) -> u16 {
        seq.0
    }
}

impl<const BITS: u32> Add<u16> for SeqNumber<BITS> {
    type Output = SeqNumber<BITS>;

    fn add(self, rhs: u16) -> Self::Output {
        SeqNumber::new_unchecked(self.0.wrapping_add(rhs))
    }
}

impl<const BITS: u32> AddAssign<u16> for SeqNumber<BITS> {
    fn add_assign(&mut self, rhs: u16) {
        *self = *self + rhs;
    }
}

impl<const BITS: u32> Sub<u16> for SeqNumber<BITS> {
    type Output = SeqNumber<BITS>;

    fn sub(self, rhs: u16) -> Self::Output {
        SeqNumber::new_unchecked(self.0.wrapping_sub(rhs))
    }
}

/// Converts 8-bit ARQ sequence numbers into a continuous 64-bit counter
///
/// The receiver keeps its next expected position as a `u64`. A raw gap wider
/// than twice the ARQ window between the received value and the expected one
/// can only be explained by a wraparound, so the round is adjusted by one in
/// the corresponding direction. Frames reach the receiver at most one window
/// behind or ahead of it, so this holds while `3 × window < 256`.
#[derive(Debug, Clone, Copy)]
pub struct Unwrapper {
    threshold: u16,
}

impl Unwrapper {
    /// Create an unwrapper for the given ARQ window size
    pub fn new(window_size: u16) -> Self {
        Unwrapper {
            threshold: window_size.saturating_mul(2),
        }
    }

    /// Map `seq` onto the continuous counter around `next_expected`
    ///
    /// Returns `None` when the value would belong to a round before the first
    /// one, which a conforming sender cannot produce.
    pub fn unwrap(&self, seq: ArqSeqNo, next_expected: u64) -> Option<u64> {
        let modulus = u64::from(ArqSeqNo::MODULUS);
        let mut rounds = next_expected / modulus;
        let expected_raw = (next_expected % modulus) as u16;
        let raw = seq.as_raw();

        if raw >= expected_raw {
            if raw - expected_raw > self.threshold {
                rounds = rounds.checked_sub(1)?;
            }
        } else if expected_raw - raw > self.threshold {
            rounds += 1;
        }

        Some(rounds * modulus + u64::from(raw))
    }
}
