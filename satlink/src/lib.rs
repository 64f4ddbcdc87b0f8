//! Satlink - satellite link-layer segmentation and ARQ
//!
//! High-level Rust API over the protocol engine and its simulation harness.

pub use satlink_protocol as protocol;
pub use satlink_sim as sim;

// Re-export commonly used types
pub use protocol::{
    AckMessage, LinkConfig, LinkContext, LinkEngine, LinkError, LinkStats, Mode, Segment,
    Timestamp, TimerHandle,
};
pub use sim::{LinkPair, Side, SimConfig};
