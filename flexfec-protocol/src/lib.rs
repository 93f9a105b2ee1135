//! FlexFEC Protocol Core
//!
//! This crate implements the RTP packet model and the FlexFEC repair packet
//! generators: 16-bit sequence arithmetic, protection coverage, the
//! [`FecEncoder`] contract, and its FlexFEC-03 and RFC 8627 layouts.

pub mod coverage;
pub mod encoder;
pub mod flexfec03;
pub mod flexfec20;
pub mod rtp;
pub mod sequence;

pub use coverage::{ProtectionCoverage, MAX_MEDIA_PACKETS};
pub use encoder::{EncodeError, FecEncoder, FecScheme, ProtectionMask, RecoveryFields};
pub use flexfec03::FlexFec03Encoder;
pub use flexfec20::FlexFec20Encoder;
pub use rtp::{HeaderExtension, PacketError, RtpHeader, RtpPacket};
pub use sequence::SeqNumber;
