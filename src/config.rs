//! Configuration for transports, buffering and quality adaptation
//!
//! All thresholds in [`QualityConfig`] default to the calibrated bands used
//! by the reference deployment; they are tunable, but the monotonic ordering
//! between degrade and upgrade thresholds must be preserved.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub jitter: JitterConfig,
    pub quality: QualityConfig,
    pub compression: CompressionConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Network/transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind listeners to
    pub bind_address: IpAddr,

    /// UDP port for the inbound audio stream
    pub udp_port: u16,

    /// UDP reply/broadcast port (conventionally inbound + 1)
    pub udp_reply_port: u16,

    /// TCP listener port
    pub tcp_port: u16,

    /// Maximum datagram size accepted/produced
    pub max_packet_size: usize,

    /// TCP keep-alive probe interval in seconds
    pub keepalive_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            udp_port: DEFAULT_UDP_PORT,
            udp_reply_port: DEFAULT_UDP_REPLY_PORT,
            tcp_port: DEFAULT_TCP_PORT,
            max_packet_size: MAX_PACKET_SIZE,
            keepalive_secs: 15,
        }
    }
}

/// Jitter buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterConfig {
    /// Maximum buffered packets before FIFO eviction
    pub capacity: usize,

    /// Occupancy fraction that triggers early out-of-order release
    pub high_water: f32,

    /// Consecutive released packets combined into one consumer chunk (2-4)
    pub chunk_packets: usize,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_JITTER_CAPACITY,
            high_water: 0.8,
            chunk_packets: 3,
        }
    }
}

impl JitterConfig {
    /// Chunk size clamped to the supported 2-4 packet range
    pub fn chunk_packets_clamped(&self) -> usize {
        self.chunk_packets.clamp(2, 4)
    }
}

/// Quality scoring and adaptation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Interval between quality assessments, milliseconds
    pub assess_interval_ms: u64,

    /// Minimum time between profile switches, milliseconds
    pub cooldown_ms: u64,

    /// EWMA smoothing factor for latency/jitter
    pub smoothing: f64,

    /// Loss rate above which the profile is stepped down
    pub degrade_loss: f64,

    /// Smoothed latency (ms) above which the profile is stepped down
    pub degrade_latency_ms: f64,

    /// Buffer underruns since the last check that force a downgrade
    pub underrun_limit: u64,

    /// Loss rate below which an upgrade is considered
    pub upgrade_loss: f64,

    /// Smoothed latency (ms) below which an upgrade is considered
    pub upgrade_latency_ms: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            assess_interval_ms: DEFAULT_ASSESS_INTERVAL_MS,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            smoothing: 0.1,
            degrade_loss: 0.15,
            degrade_latency_ms: 200.0,
            underrun_limit: 3,
            upgrade_loss: 0.05,
            upgrade_latency_ms: 100.0,
        }
    }
}

impl QualityConfig {
    pub fn assess_interval(&self) -> Duration {
        Duration::from_millis(self.assess_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Delta compressor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Predictor feedback rate for the adaptive variant
    pub adaptation_rate: f32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            adaptation_rate: 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.network.udp_port, DEFAULT_UDP_PORT);
        assert_eq!(config.network.udp_reply_port, config.network.udp_port + 1);
        assert_eq!(config.jitter.capacity, DEFAULT_JITTER_CAPACITY);
        assert!(config.quality.upgrade_loss < config.quality.degrade_loss);
        assert!(config.quality.upgrade_latency_ms < config.quality.degrade_latency_ms);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = AppConfig::from_toml(
            r#"
            [network]
            udp_port = 7000

            [jitter]
            capacity = 128
            chunk_packets = 9
            "#,
        )
        .unwrap();

        assert_eq!(config.network.udp_port, 7000);
        // Unspecified sections fall back to defaults
        assert_eq!(config.network.tcp_port, DEFAULT_TCP_PORT);
        assert_eq!(config.jitter.capacity, 128);
        // Out-of-range chunk sizes are clamped at the point of use
        assert_eq!(config.jitter.chunk_packets_clamped(), 4);
    }

    #[test]
    fn test_from_toml_invalid() {
        assert!(AppConfig::from_toml("network = 12").is_err());
    }
}
