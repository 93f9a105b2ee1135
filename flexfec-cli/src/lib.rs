//! FlexFEC CLI Library
//!
//! Shared functionality for the FlexFEC command-line tools.

pub mod config;
pub mod stats;

pub use config::{ConfigError, FecSection, SenderConfig, StreamSection};
pub use stats::{
    display_compact_stats, display_fec_stats, format_bandwidth, format_bytes, format_duration,
    format_overhead,
};
