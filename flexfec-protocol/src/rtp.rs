//! RTP Packet Structures and Serialization
//!
//! This module implements the RTP fixed header (RFC 3550 §5.1), the optional
//! CSRC list and header extension, and the packet type the FEC encoders
//! consume. The fixed header is 12 bytes:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           synchronization source (SSRC) identifier            |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! |            contributing source (CSRC) identifiers             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::sequence::SeqNumber;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the fixed RTP header in bytes
pub const FIXED_HEADER_SIZE: usize = 12;

/// The only RTP version in use
pub const RTP_VERSION: u8 = 2;

/// Maximum number of CSRC entries (4-bit CC field)
pub const MAX_CSRC_COUNT: usize = 15;

/// Largest legal payload type (7 bits)
pub const MAX_PAYLOAD_TYPE: u8 = 0x7F;

const VERSION_SHIFT: u8 = 6;
const PADDING_FLAG: u8 = 0b0010_0000;
const EXTENSION_FLAG: u8 = 0b0001_0000;
const CC_MASK: u8 = 0b0000_1111;
const MARKER_FLAG: u8 = 0b1000_0000;
const PT_MASK: u8 = 0b0111_1111;

/// RTP header extension (RFC 3550 §5.3.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderExtension {
    /// Profile-defined identifier
    pub profile: u16,
    /// Extension body, a multiple of 4 bytes
    pub body: Bytes,
}

impl HeaderExtension {
    fn marshal_size(&self) -> usize {
        4 + self.body.len()
    }
}

/// RTP header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// Padding flag (payload ends with padding octets)
    pub padding: bool,
    /// Marker bit
    pub marker: bool,
    /// Payload type (7 bits)
    pub payload_type: u8,
    /// Sequence number
    pub sequence_number: SeqNumber,
    /// Media timestamp
    pub timestamp: u32,
    /// Synchronization source
    pub ssrc: u32,
    /// Contributing sources
    pub csrc: Vec<u32>,
    /// Optional header extension
    pub extension: Option<HeaderExtension>,
}

impl RtpHeader {
    /// Create a header with no CSRCs or extension
    pub fn new(payload_type: u8, sequence_number: SeqNumber, timestamp: u32, ssrc: u32) -> Self {
        RtpHeader {
            padding: false,
            marker: false,
            payload_type: payload_type & PT_MASK,
            sequence_number,
            timestamp,
            ssrc,
            csrc: Vec::new(),
            extension: None,
        }
    }

    /// Size of the serialized header in bytes
    pub fn marshal_size(&self) -> usize {
        FIXED_HEADER_SIZE
            + self.csrc.len() * 4
            + self.extension.as_ref().map_or(0, HeaderExtension::marshal_size)
    }

    /// First header octet: V, P, X, CC
    pub fn first_octet(&self) -> u8 {
        let mut b = RTP_VERSION << VERSION_SHIFT;
        if self.padding {
            b |= PADDING_FLAG;
        }
        if self.extension.is_some() {
            b |= EXTENSION_FLAG;
        }
        b | (self.csrc.len() as u8 & CC_MASK)
    }

    /// Second header octet: M, PT
    pub fn second_octet(&self) -> u8 {
        let mut b = self.payload_type & PT_MASK;
        if self.marker {
            b |= MARKER_FLAG;
        }
        b
    }

    /// Check that the header can be serialized
    pub fn validate(&self) -> Result<(), PacketError> {
        if self.csrc.len() > MAX_CSRC_COUNT {
            return Err(PacketError::TooManyCsrcs(self.csrc.len()));
        }
        if let Some(ext) = &self.extension {
            if ext.body.len() % 4 != 0 || ext.body.len() / 4 > u16::MAX as usize {
                return Err(PacketError::InvalidExtensionLength(ext.body.len()));
            }
        }
        Ok(())
    }

    /// Serialize header to bytes (network byte order)
    pub fn to_bytes(&self, buf: &mut BytesMut) -> Result<(), PacketError> {
        self.validate()?;

        buf.reserve(self.marshal_size());
        buf.put_u8(self.first_octet());
        buf.put_u8(self.second_octet());
        buf.put_u16(self.sequence_number.as_raw());
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }
        if let Some(ext) = &self.extension {
            buf.put_u16(ext.profile);
            buf.put_u16((ext.body.len() / 4) as u16);
            buf.put_slice(&ext.body);
        }
        Ok(())
    }

    /// Parse header from the front of `buf`, advancing it past the header
    pub fn from_buf(buf: &mut &[u8]) -> Result<Self, PacketError> {
        if buf.len() < FIXED_HEADER_SIZE {
            return Err(PacketError::InsufficientData {
                expected: FIXED_HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let b0 = buf.get_u8();
        let version = b0 >> VERSION_SHIFT;
        if version != RTP_VERSION {
            return Err(PacketError::UnsupportedVersion(version));
        }
        let b1 = buf.get_u8();
        let sequence_number = SeqNumber::new(buf.get_u16());
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        let cc = (b0 & CC_MASK) as usize;
        if buf.len() < cc * 4 {
            return Err(PacketError::InsufficientData {
                expected: cc * 4,
                actual: buf.len(),
            });
        }
        let csrc = (0..cc).map(|_| buf.get_u32()).collect();

        let extension = if b0 & EXTENSION_FLAG != 0 {
            if buf.len() < 4 {
                return Err(PacketError::InsufficientData {
                    expected: 4,
                    actual: buf.len(),
                });
            }
            let profile = buf.get_u16();
            let body_len = buf.get_u16() as usize * 4;
            if buf.len() < body_len {
                return Err(PacketError::InsufficientData {
                    expected: body_len,
                    actual: buf.len(),
                });
            }
            let body = Bytes::copy_from_slice(&buf[..body_len]);
            buf.advance(body_len);
            Some(HeaderExtension { profile, body })
        } else {
            None
        };

        Ok(RtpHeader {
            padding: b0 & PADDING_FLAG != 0,
            marker: b1 & MARKER_FLAG != 0,
            payload_type: b1 & PT_MASK,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension,
        })
    }
}

/// RTP packet
///
/// The payload holds every byte after the header, including trailing
/// padding octets when `header.padding` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// Packet header
    pub header: RtpHeader,
    /// Payload data
    pub payload: Bytes,
}

impl RtpPacket {
    /// Create a new packet
    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        RtpPacket { header, payload }
    }

    /// Capture a packet from borrowed parts, copying the payload
    pub fn copy_from(header: &RtpHeader, payload: &[u8]) -> Self {
        RtpPacket {
            header: header.clone(),
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Get the sequence number
    #[inline]
    pub fn seq_number(&self) -> SeqNumber {
        self.header.sequence_number
    }

    /// Get the SSRC
    #[inline]
    pub fn ssrc(&self) -> u32 {
        self.header.ssrc
    }

    /// Total size of the packet (header + payload)
    pub fn size(&self) -> usize {
        self.header.marshal_size() + self.payload.len()
    }

    /// Number of bytes following the fixed header (CSRCs, extension, payload)
    ///
    /// This is the quantity FlexFEC length recovery protects.
    pub fn protected_len(&self) -> usize {
        self.size() - FIXED_HEADER_SIZE
    }

    /// Serialize the packet to bytes
    pub fn to_bytes(&self) -> Result<BytesMut, PacketError> {
        let mut buf = BytesMut::with_capacity(self.size());
        self.header.to_bytes(&mut buf)?;
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Parse a packet from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        let mut buf = bytes;
        let header = RtpHeader::from_buf(&mut buf)?;

        if header.padding {
            let pad = buf.last().copied().unwrap_or(0) as usize;
            if pad == 0 || pad > buf.len() {
                return Err(PacketError::InvalidPadding(pad));
            }
        }

        Ok(RtpPacket {
            header,
            payload: Bytes::copy_from_slice(buf),
        })
    }
}

/// Packet parsing and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Unsupported RTP version: {0}")]
    UnsupportedVersion(u8),

    #[error("Too many CSRCs: {0} (max 15)")]
    TooManyCsrcs(usize),

    #[error("Header extension length {0} is not a multiple of 4")]
    InvalidExtensionLength(usize),

    #[error("Invalid padding length: {0}")]
    InvalidPadding(usize),
}
