//! Configuration file support for the FlexFEC CLI tools

use flexfec_interceptor::{FecConfig, StreamInfo};
use flexfec_protocol::{FecScheme, SeqNumber};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Outbound stream identifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSection {
    /// Media SSRC
    pub ssrc: u32,
    /// FEC SSRC
    pub fec_ssrc: u32,
    /// Media payload type
    #[serde(default = "default_payload_type")]
    pub payload_type: u8,
    /// FEC payload type
    #[serde(default = "default_fec_payload_type")]
    pub fec_payload_type: u8,
    /// Media codec MIME type
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    /// Media clock rate in Hz
    #[serde(default = "default_clock_rate")]
    pub clock_rate: u32,
}

fn default_payload_type() -> u8 {
    96
}

fn default_fec_payload_type() -> u8 {
    118
}

fn default_mime_type() -> String {
    "video/MP2T".to_string()
}

fn default_clock_rate() -> u32 {
    90_000
}

/// FEC parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FecSection {
    /// Header layout: "flexfec-03" or "flexfec-20"
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Media packets per encode round
    #[serde(default = "default_media_packets")]
    pub media_packets_per_round: usize,
    /// Repair packets per round
    #[serde(default = "default_repair_packets")]
    pub repair_packets_per_round: usize,
    /// Sequence number of the first repair packet
    #[serde(default)]
    pub initial_fec_sequence: u16,
}

fn default_scheme() -> String {
    FecScheme::default().to_string()
}

fn default_media_packets() -> usize {
    flexfec_interceptor::config::DEFAULT_MEDIA_PACKETS_PER_ROUND
}

fn default_repair_packets() -> usize {
    flexfec_interceptor::config::DEFAULT_REPAIR_PACKETS_PER_ROUND
}

impl Default for FecSection {
    fn default() -> Self {
        FecSection {
            scheme: default_scheme(),
            media_packets_per_round: default_media_packets(),
            repair_packets_per_round: default_repair_packets(),
            initial_fec_sequence: 0,
        }
    }
}

/// Sender configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Input source (file path or "-" for stdin)
    #[serde(default = "default_input")]
    pub input: String,
    /// Remote RTP destination
    pub destination: SocketAddr,
    /// Optional local bind address
    pub bind: Option<SocketAddr>,
    /// RTP payload bytes per packet
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
    /// Media send rate in bits per second (0 sends as fast as input arrives)
    #[serde(default)]
    pub bitrate_bps: u64,
    /// Statistics interval in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
    /// Stream identifiers
    pub stream: StreamSection,
    /// FEC parameters
    #[serde(default)]
    pub fec: FecSection,
}

fn default_input() -> String {
    "-".to_string()
}

fn default_payload_size() -> usize {
    1316
}

fn default_stats_interval() -> u64 {
    1
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

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl SenderConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: SenderConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Create example sender configuration
    pub fn example() -> Self {
        SenderConfig {
            input: "-".to_string(),
            destination: SocketAddr::from(([127, 0, 0, 1], 5004)),
            bind: None,
            payload_size: default_payload_size(),
            bitrate_bps: 4_000_000,
            stats_interval_secs: 1,
            stream: StreamSection {
                ssrc: 0x1234_5678,
                fec_ssrc: 0x8765_4321,
                payload_type: default_payload_type(),
                fec_payload_type: default_fec_payload_type(),
                mime_type: default_mime_type(),
                clock_rate: default_clock_rate(),
            },
            fec: FecSection::default(),
        }
    }

    /// Get statistics interval as Duration
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    /// Build and validate the FEC stage configuration
    pub fn to_fec_config(&self) -> Result<FecConfig, ConfigError> {
        let scheme: FecScheme = self.fec.scheme.parse().map_err(ConfigError::Invalid)?;
        let config = FecConfig {
            media_packets_per_round: self.fec.media_packets_per_round,
            repair_packets_per_round: self.fec.repair_packets_per_round,
            scheme,
            initial_fec_sequence: SeqNumber::new(self.fec.initial_fec_sequence),
        };
        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(config)
    }

    /// Describe the outbound stream for binding
    pub fn to_stream_info(&self) -> StreamInfo {
        StreamInfo {
            ssrc: self.stream.ssrc,
            ssrc_fec: self.stream.fec_ssrc,
            payload_type: self.stream.payload_type,
            payload_type_fec: self.stream.fec_payload_type,
            mime_type: self.stream.mime_type.clone(),
            clock_rate: self.stream.clock_rate,
        }
    }
}
