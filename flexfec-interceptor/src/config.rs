//! FEC stage configuration

use flexfec_protocol::{FecScheme, SeqNumber};
use thiserror::Error;

/// Media packets buffered before each encode round
pub const DEFAULT_MEDIA_PACKETS_PER_ROUND: usize = 5;

/// Repair packets generated per encode round
pub const DEFAULT_REPAIR_PACKETS_PER_ROUND: usize = 2;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Media packets per round must be positive")]
    ZeroMediaPackets,

    #[error("Repair packets per round must be positive")]
    ZeroRepairPackets,

    #[error("Repair packets per round ({repair}) exceeds media packets per round ({media})")]
    TooManyRepairPackets { repair: usize, media: usize },

    #[error("{scheme} cannot protect more than {max} media packets per round (got {media})")]
    TooManyMediaPackets {
        scheme: FecScheme,
        media: usize,
        max: usize,
    },
}

/// Per-stage FEC parameters
///
/// Fixed for the lifetime of every stage a factory produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FecConfig {
    /// Trigger threshold: media packets per encode round
    pub media_packets_per_round: usize,
    /// Repair packets generated per round
    pub repair_packets_per_round: usize,
    /// Header layout of the generated repair packets
    pub scheme: FecScheme,
    /// Sequence number of the first repair packet
    pub initial_fec_sequence: SeqNumber,
}

impl Default for FecConfig {
    fn default() -> Self {
        FecConfig {
            media_packets_per_round: DEFAULT_MEDIA_PACKETS_PER_ROUND,
            repair_packets_per_round: DEFAULT_REPAIR_PACKETS_PER_ROUND,
            scheme: FecScheme::default(),
            initial_fec_sequence: SeqNumber::new(0),
        }
    }
}

impl FecConfig {
    /// Check that every encode round this configuration triggers is well formed
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.media_packets_per_round == 0 {
            return Err(ConfigError::ZeroMediaPackets);
        }
        if self.repair_packets_per_round == 0 {
            return Err(ConfigError::ZeroRepairPackets);
        }
        if self.repair_packets_per_round > self.media_packets_per_round {
            return Err(ConfigError::TooManyRepairPackets {
                repair: self.repair_packets_per_round,
                media: self.media_packets_per_round,
            });
        }
        let max = self.scheme.max_media_packets();
        if self.media_packets_per_round > max {
            return Err(ConfigError::TooManyMediaPackets {
                scheme: self.scheme,
                media: self.media_packets_per_round,
                max,
            });
        }
        Ok(())
    }

    /// Repair overhead as a fraction of media packets (0.4 for the defaults)
    pub fn overhead(&self) -> f64 {
        self.repair_packets_per_round as f64 / self.media_packets_per_round as f64
    }
}
