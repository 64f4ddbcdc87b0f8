//! Engine configuration
//!
//! All values are fixed for the lifetime of one engine instance.

use crate::sequence::{ArqSeqNo, Sn10};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Reordering window must be between 1 and {max}, got {value}")]
    ReorderingWindow { value: u16, max: u16 },

    #[error("ARQ window must be between 1 and {max}, got {value}")]
    ArqWindow { value: u16, max: u16 },

    #[error("ARQ header must be at least one byte")]
    ArqHeaderSize,

    #[error("Transmit buffer limit must be non-zero")]
    TxBufferSize,
}

/// Delivery guarantee of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Segmentation with a reordering window, no retransmissions
    #[default]
    Unacknowledged,
    /// Segmentation under ARQ: acknowledgments, timers, bounded retries
    Acknowledged,
}

/// Per-engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Delivery mode
    pub mode: Mode,
    /// Flow carried in acknowledgments
    pub flow_id: u8,
    /// Maximum bytes buffered for first transmission
    pub max_tx_buffer_bytes: usize,
    /// Reordering window size (10-bit sequence space)
    pub reordering_window: u16,
    /// Forced-advance timer of the reordering window
    pub reordering_timeout: Duration,
    /// ARQ window size (8-bit sequence space)
    pub arq_window: u16,
    /// Maximum retransmissions of one ARQ PDU
    pub max_retransmissions: u32,
    /// Retransmission timer
    pub retransmission_timeout: Duration,
    /// How long the ARQ receiver waits for a missing PDU
    pub rx_waiting_timeout: Duration,
    /// ARQ header size in bytes
    pub arq_header_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            mode: Mode::Unacknowledged,
            flow_id: 0,
            max_tx_buffer_bytes: 100 * 1024,
            reordering_window: 512,
            reordering_timeout: Duration::from_millis(100),
            arq_window: 10,
            max_retransmissions: 2,
            retransmission_timeout: Duration::from_millis(600),
            rx_waiting_timeout: Duration::from_millis(1800),
            arq_header_size: 1,
        }
    }
}

impl LinkConfig {
    /// Default configuration in ARQ mode
    pub fn acknowledged() -> Self {
        LinkConfig {
            mode: Mode::Acknowledged,
            ..Default::default()
        }
    }

    /// Check the configuration for values the protocol cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max_reordering = (Sn10::MODULUS / 2) as u16;
        if self.reordering_window == 0 || self.reordering_window > max_reordering {
            return Err(ConfigError::ReorderingWindow {
                value: self.reordering_window,
                max: max_reordering,
            });
        }

        // The receiver unwraps with a threshold of twice the window, which
        // tells the rounds apart only while three windows fit in the space
        let max_arq = ((ArqSeqNo::MODULUS - 1) / 3) as u16;
        if self.arq_window == 0 || self.arq_window > max_arq {
            return Err(ConfigError::ArqWindow {
                value: self.arq_window,
                max: max_arq,
            });
        }

        if self.arq_header_size == 0 {
            return Err(ConfigError::ArqHeaderSize);
        }

        if self.max_tx_buffer_bytes == 0 {
            return Err(ConfigError::TxBufferSize);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(LinkConfig::default().validate(), Ok(()));
        assert_eq!(LinkConfig::acknowledged().validate(), Ok(()));
    }

    #[test]
    fn test_reordering_window_bounds() {
        let config = LinkConfig {
            reordering_window: 513,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ReorderingWindow { value: 513, max: 512 })
        );
    }

    #[test]
    fn test_arq_window_bounds() {
        let config = LinkConfig {
            arq_window: 0,
            ..LinkConfig::acknowledged()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ArqWindow { .. })));

        let config = LinkConfig {
            arq_window: 86,
            ..LinkConfig::acknowledged()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ArqWindow { value: 86, max: 85 })
        );

        let config = LinkConfig {
            arq_window: 85,
            ..LinkConfig::acknowledged()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_arq_header_size() {
        let config = LinkConfig {
            arq_header_size: 0,
            ..LinkConfig::acknowledged()
        };
        assert_eq!(config.validate(), Err(ConfigError::ArqHeaderSize));
    }
}
