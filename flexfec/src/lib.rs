//! FlexFEC - Flexible Forward Error Correction for RTP
//!
//! High-level Rust API for generating FlexFEC repair packets on an
//! outbound RTP stream.

pub use flexfec_interceptor as interceptor;
pub use flexfec_io as io;
pub use flexfec_protocol as protocol;

// Re-export commonly used types
pub use interceptor::{
    FecConfig, FecStage, FecStageFactory, FecStats, FecWriter, RtpWriter, StreamInfo,
};
pub use protocol::{FecScheme, RtpHeader, RtpPacket, SeqNumber};
