//! Simulation time
//!
//! The engine never reads a wall clock. The host passes the current
//! simulation time in through [`crate::context::LinkContext::now`], expressed
//! as an offset from the start of the simulation.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// Point in simulation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(Duration);

impl Timestamp {
    /// Start of the simulation
    pub const ZERO: Timestamp = Timestamp(Duration::ZERO);

    /// Create a timestamp from an offset since the start of the simulation
    #[inline]
    pub const fn from_duration(offset: Duration) -> Self {
        Timestamp(offset)
    }

    /// Create a timestamp from milliseconds since the start of the simulation
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(Duration::from_millis(millis))
    }

    /// Offset since the start of the simulation
    #[inline]
    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Time elapsed between `earlier` and `self`, zero if `earlier` is later
    #[inline]
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, duration: Duration) -> Timestamp {
        Timestamp(self.0 + duration)
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    fn sub(self, other: Timestamp) -> Duration {
        self.saturating_duration_since(other)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.0.as_secs_f64())
    }
}
