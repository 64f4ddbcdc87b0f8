//! Satellite Link Simulation
//!
//! This crate provides the collaborators the protocol engine expects from
//! its host: a discrete-event scheduler, a lossy channel model, capacity
//! pacing for transmission opportunities, and a harness that runs two
//! engines against each other.

pub mod channel;
pub mod harness;
pub mod rate;
pub mod scheduler;

pub use channel::{Channel, ChannelConfig, ChannelStats};
pub use harness::{Event, LinkPair, Side, SimConfig, SimError, SimReport};
pub use rate::RateLimiter;
pub use scheduler::Scheduler;
