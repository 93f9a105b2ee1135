//! FlexFEC I/O and Platform Abstraction
//!
//! This crate provides the network side of a FEC sender: a UDP socket
//! wrapper, an RTP writer that sends onto it, and timing utilities.

pub mod socket;
pub mod time;

pub use socket::{RtpSocket, SocketError, UdpRtpWriter};
pub use time::{Pacer, RtpClock, Timer};
