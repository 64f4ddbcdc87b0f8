//! Scenario file support for the simulator CLI
//!
//! A scenario describes the engine configuration shared by both ends, the
//! channel model, the pacing of transmission opportunities and the traffic
//! offered at the terminal. Every section is optional and falls back to the
//! engine defaults.

use satlink_protocol::config::{LinkConfig, Mode};
use satlink_sim::{ChannelConfig, SimConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Delivery mode as written in a scenario file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeConfig {
    /// Reordering window only
    #[default]
    Unacknowledged,
    /// ARQ with retransmissions
    Acknowledged,
}

impl From<ModeConfig> for Mode {
    fn from(mode: ModeConfig) -> Self {
        match mode {
            ModeConfig::Unacknowledged => Mode::Unacknowledged,
            ModeConfig::Acknowledged => Mode::Acknowledged,
        }
    }
}

/// Engine section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSection {
    pub mode: ModeConfig,
    pub flow_id: u8,
    pub max_tx_buffer_bytes: usize,
    pub reordering_window: u16,
    pub reordering_timeout_ms: u64,
    pub arq_window: u16,
    pub max_retransmissions: u32,
    pub retransmission_timeout_ms: u64,
    pub rx_waiting_timeout_ms: u64,
    pub arq_header_size: usize,
}

impl Default for LinkSection {
    fn default() -> Self {
        let link = LinkConfig::default();
        LinkSection {
            mode: ModeConfig::default(),
            flow_id: link.flow_id,
            max_tx_buffer_bytes: link.max_tx_buffer_bytes,
            reordering_window: link.reordering_window,
            reordering_timeout_ms: link.reordering_timeout.as_millis() as u64,
            arq_window: link.arq_window,
            max_retransmissions: link.max_retransmissions,
            retransmission_timeout_ms: link.retransmission_timeout.as_millis() as u64,
            rx_waiting_timeout_ms: link.rx_waiting_timeout.as_millis() as u64,
            arq_header_size: link.arq_header_size,
        }
    }
}

impl LinkSection {
    pub fn to_link_config(&self) -> LinkConfig {
        LinkConfig {
            mode: self.mode.into(),
            flow_id: self.flow_id,
            max_tx_buffer_bytes: self.max_tx_buffer_bytes,
            reordering_window: self.reordering_window,
            reordering_timeout: Duration::from_millis(self.reordering_timeout_ms),
            arq_window: self.arq_window,
            max_retransmissions: self.max_retransmissions,
            retransmission_timeout: Duration::from_millis(self.retransmission_timeout_ms),
            rx_waiting_timeout: Duration::from_millis(self.rx_waiting_timeout_ms),
            arq_header_size: self.arq_header_size,
        }
    }
}

/// Channel section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSection {
    /// One-way latency in milliseconds
    pub latency_ms: u64,
    /// Latency jitter in milliseconds
    pub jitter_ms: u64,
    /// Frame loss probability (0.0 to 1.0)
    pub packet_loss: f64,
    /// Serialization rate, 0 for none
    pub bandwidth_bps: u64,
}

impl Default for ChannelSection {
    fn default() -> Self {
        let channel = ChannelConfig::default();
        ChannelSection {
            latency_ms: channel.latency.as_millis() as u64,
            jitter_ms: channel.latency_jitter.as_millis() as u64,
            packet_loss: channel.packet_loss,
            bandwidth_bps: channel.bandwidth_bps,
        }
    }
}

impl ChannelSection {
    pub fn to_channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            latency: Duration::from_millis(self.latency_ms),
            latency_jitter: Duration::from_millis(self.jitter_ms),
            packet_loss: self.packet_loss,
            bandwidth_bps: self.bandwidth_bps,
        }
    }
}

/// Medium access section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacSection {
    /// Spacing of transmission opportunities
    pub frame_interval_ms: u64,
    /// Largest single opportunity in bytes
    pub max_frame_bytes: usize,
    /// Capacity granted to each endpoint
    pub rate_bps: u64,
    /// Delay of the acknowledgment path
    pub ack_delay_ms: u64,
    /// Seed for the channel models
    pub seed: u64,
}

impl Default for MacSection {
    fn default() -> Self {
        let sim = SimConfig::default();
        MacSection {
            frame_interval_ms: sim.frame_interval.as_millis() as u64,
            max_frame_bytes: sim.max_frame_bytes,
            rate_bps: sim.rate_bps,
            ack_delay_ms: sim.ack_delay.as_millis() as u64,
            seed: sim.seed,
        }
    }
}

/// Offered traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficSection {
    /// SDUs offered by the terminal
    pub sdu_count: usize,
    /// Size of each SDU
    pub sdu_size: usize,
    /// Spacing between SDUs
    pub interval_ms: u64,
    /// Also send the same traffic from the gateway
    pub bidirectional: bool,
    /// Simulated time limit
    pub duration_secs: u64,
}

impl Default for TrafficSection {
    fn default() -> Self {
        TrafficSection {
            sdu_count: 100,
            sdu_size: 700,
            interval_ms: 20,
            bidirectional: false,
            duration_secs: 60,
        }
    }
}

impl TrafficSection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Complete scenario
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub link: LinkSection,
    pub channel: ChannelSection,
    pub mac: MacSection,
    pub traffic: TrafficSection,
}

impl Scenario {
    /// Load a scenario from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let scenario: Scenario = toml::from_str(&contents)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Save the scenario to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Example ARQ scenario over a lossy geostationary hop
    pub fn example() -> Self {
        Scenario {
            link: LinkSection {
                mode: ModeConfig::Acknowledged,
                max_retransmissions: 5,
                ..Default::default()
            },
            channel: ChannelSection {
                packet_loss: 0.05,
                jitter_ms: 5,
                ..Default::default()
            },
            mac: MacSection::default(),
            traffic: TrafficSection::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_link_config().validate()?;

        if !(0.0..=1.0).contains(&self.channel.packet_loss) {
            return Err(ConfigError::Invalid(format!(
                "packet_loss must be between 0.0 and 1.0, got {}",
                self.channel.packet_loss
            )));
        }
        if self.mac.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid("frame_interval_ms must be non-zero".into()));
        }
        if self.mac.max_frame_bytes == 0 || self.mac.rate_bps == 0 {
            return Err(ConfigError::Invalid(
                "max_frame_bytes and rate_bps must be non-zero".into(),
            ));
        }
        if self.traffic.sdu_size == 0 {
            return Err(ConfigError::Invalid("sdu_size must be non-zero".into()));
        }
        Ok(())
    }

    pub fn to_link_config(&self) -> LinkConfig {
        self.link.to_link_config()
    }

    pub fn to_sim_config(&self) -> SimConfig {
        SimConfig {
            link: self.to_link_config(),
            channel: self.channel.to_channel_config(),
            frame_interval: Duration::from_millis(self.mac.frame_interval_ms),
            max_frame_bytes: self.mac.max_frame_bytes,
            rate_bps: self.mac.rate_bps,
            ack_delay: Duration::from_millis(self.mac.ack_delay_ms),
            seed: self.mac.seed,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid link configuration: {0}")]
    Link(#[from] satlink_protocol::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine() {
        let scenario = Scenario::default();
        assert_eq!(scenario.to_link_config(), LinkConfig::default());
        assert!(scenario.validate().is_ok());
    }

    #[test]
    fn test_example_config() {
        let scenario = Scenario::example();
        assert!(scenario.validate().is_ok());
        assert_eq!(scenario.to_sim_config().link.mode, Mode::Acknowledged);
    }

    #[test]
    fn test_serialize_deserialize() {
        let scenario = Scenario::example();
        let toml = toml::to_string(&scenario).unwrap();
        let parsed: Scenario = toml::from_str(&toml).unwrap();

        assert_eq!(parsed, scenario);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Scenario = toml::from_str(
            r#"
            [link]
            mode = "acknowledged"
            arq_window = 32

            [channel]
            packet_loss = 0.1
            "#,
        )
        .unwrap();

        let link = parsed.to_link_config();
        assert_eq!(link.mode, Mode::Acknowledged);
        assert_eq!(link.arq_window, 32);
        assert_eq!(link.max_retransmissions, 2);
        assert_eq!(parsed.channel.latency_ms, 270);
        assert_eq!(parsed.traffic, TrafficSection::default());
    }

    #[test]
    fn test_invalid_loss_rejected() {
        let mut scenario = Scenario::default();
        scenario.channel.packet_loss = 1.5;
        assert!(matches!(scenario.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_link_rejected() {
        let mut scenario = Scenario::default();
        scenario.link.arq_window = 200;
        assert!(matches!(scenario.validate(), Err(ConfigError::Link(_))));
    }
}
