//! Satlink CLI Library
//!
//! Scenario files and report formatting for the simulator binary.

pub mod config;
pub mod stats;

pub use config::{ConfigError, Scenario};
pub use stats::{display_compact_stats, display_report, format_bandwidth, format_bytes};
