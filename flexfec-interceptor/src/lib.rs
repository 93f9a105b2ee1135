//! FlexFEC Interceptor
//!
//! This crate implements the per-stream FEC stage that sits in an outbound
//! RTP pipeline: the protection buffer, the stage that decides when to
//! encode and interleaves repair packets with media, and the factory and
//! binding that attach a stage to one stream's writer.

pub mod buffer;
pub mod config;
pub mod stage;
pub mod stream;
pub mod writer;

pub use buffer::{BufferError, PacketBuffer};
pub use config::{ConfigError, FecConfig};
pub use stage::{BindError, FecStage, FecStageFactory, FecStats, FecWriter};
pub use stream::StreamInfo;
pub use writer::{Attributes, RtpWriter, RtpWriterFn, WriteError};
