//! Capacity pacing
//!
//! The return-link scheduler grants each endpoint a byte budget per
//! transmission opportunity. [`RateLimiter`] is a token bucket on simulated
//! time that turns a configured capacity into those budgets.

use satlink_protocol::time::Timestamp;

/// Token bucket on simulated time
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Maximum tokens (burst size)
    capacity: u64,
    /// Current token count
    tokens: u64,
    /// Tokens added per microsecond
    rate: f64,
    /// Last refill time
    last_update: Timestamp,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `rate_bps` - Rate in bits per second
    /// * `burst_bytes` - Maximum burst size in bytes
    pub fn new(rate_bps: u64, burst_bytes: u64) -> Self {
        RateLimiter {
            capacity: burst_bytes,
            tokens: burst_bytes,
            rate: Self::bytes_per_micro(rate_bps),
            last_update: Timestamp::ZERO,
        }
    }

    fn bytes_per_micro(rate_bps: u64) -> f64 {
        (rate_bps as f64) / 8.0 / 1_000_000.0
    }

    /// Refill tokens for the time elapsed up to `now`
    fn refill(&mut self, now: Timestamp) {
        let elapsed_us = now.saturating_duration_since(self.last_update).as_micros() as f64;
        let new_tokens = (elapsed_us * self.rate) as u64;

        if new_tokens > 0 {
            self.tokens = (self.tokens + new_tokens).min(self.capacity);
            self.last_update = now;
        }
    }

    /// Bytes that can be sent at `now`
    pub fn available(&mut self, now: Timestamp) -> u64 {
        self.refill(now);
        self.tokens
    }

    /// Consume tokens for `bytes` sent at `now`
    ///
    /// Returns false if insufficient tokens
    pub fn consume(&mut self, bytes: usize, now: Timestamp) -> bool {
        self.refill(now);
        if self.tokens >= bytes as u64 {
            self.tokens -= bytes as u64;
            true
        } else {
            false
        }
    }
}
