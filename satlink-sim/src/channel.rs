//! Lossy satellite channel model
//!
//! Each frame either vanishes with the configured probability or arrives
//! after the propagation latency, its serialization time and a uniformly
//! distributed jitter. Jitter larger than the frame spacing reorders frames.
//! A fixed seed makes every run reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::{debug, trace};

/// Channel parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// One-way propagation latency
    pub latency: Duration,
    /// Maximum deviation from the latency, in either direction
    pub latency_jitter: Duration,
    /// Probability that a frame is lost
    pub packet_loss: f64,
    /// Serialization rate; zero means instantaneous
    pub bandwidth_bps: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            latency: Duration::from_millis(270),
            latency_jitter: Duration::ZERO,
            packet_loss: 0.0,
            bandwidth_bps: 0,
        }
    }
}

/// Channel counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub bytes_sent: u64,
}

/// One direction of a satellite link
#[derive(Debug)]
pub struct Channel {
    config: ChannelConfig,
    rng: StdRng,
    stats: ChannelStats,
}

impl Channel {
    pub fn new(config: ChannelConfig, seed: u64) -> Self {
        Channel {
            config,
            rng: StdRng::seed_from_u64(seed),
            stats: ChannelStats::default(),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Send a frame of `len` bytes
    ///
    /// Returns the delay after which it arrives, or `None` if it is lost.
    pub fn transmit(&mut self, len: usize) -> Option<Duration> {
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += len as u64;

        if self.config.packet_loss > 0.0 && self.rng.random::<f64>() < self.config.packet_loss {
            self.stats.frames_dropped += 1;
            debug!(len, "simulated frame loss");
            return None;
        }

        let transmission_time = if self.config.bandwidth_bps > 0 {
            Duration::from_secs_f64((len * 8) as f64 / self.config.bandwidth_bps as f64)
        } else {
            Duration::ZERO
        };

        let jitter_ms = self.config.latency_jitter.as_secs_f64() * 1000.0;
        let latency = if jitter_ms > 0.0 {
            let jitter_factor: f64 = self.rng.random_range(-1.0..1.0);
            let offset = Duration::from_secs_f64((jitter_factor.abs() * jitter_ms) / 1000.0);
            if jitter_factor < 0.0 {
                self.config.latency.saturating_sub(offset)
            } else {
                self.config.latency + offset
            }
        } else {
            self.config.latency
        };

        let delay = latency + transmission_time;
        trace!(len, delay_ms = delay.as_millis() as u64, "frame in flight");
        Some(delay)
    }
}
