//! FEC Encoder Contract
//!
//! A FEC encoder turns a batch of media packets into a fixed number of
//! repair packets. Different FlexFEC header layouts are interchangeable
//! implementations of [`FecEncoder`], selected through [`FecScheme`].
//!
//! Both layouts share the same arithmetic: every repair packet carries the
//! XOR of a handful of media header fields (the "recovery fields") and the
//! XOR of the zero-padded protected regions of the media packets its mask
//! selects.

use crate::coverage::ProtectionCoverage;
use crate::flexfec03::FlexFec03Encoder;
use crate::flexfec20::FlexFec20Encoder;
use crate::rtp::{RtpHeader, RtpPacket, FIXED_HEADER_SIZE};
use crate::sequence::SeqNumber;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Size of the recovery fields at the start of every FlexFEC header
pub const RECOVERY_FIELDS_SIZE: usize = 8;

/// Encoder errors
///
/// All of these describe malformed input; encoding performs no I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Cannot encode an empty batch")]
    EmptyBatch,

    #[error("Repair packet count must be positive")]
    ZeroRepairCount,

    #[error("Repair count {repair} exceeds batch size {batch}")]
    RepairCountExceedsBatch { repair: usize, batch: usize },

    #[error("Batch of {size} packets exceeds scheme maximum {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Batch mixes SSRCs: expected {expected:#010x}, found {found:#010x}")]
    MixedSsrc { expected: u32, found: u32 },

    #[error("Protected sequence span {span} exceeds mask capacity {max}")]
    SequenceSpanTooLarge { span: usize, max: usize },

    #[error("Protected region of {len} bytes exceeds the 16-bit length field")]
    ProtectedRegionTooLarge { len: usize },

    #[error("Packet serialization failed: {0}")]
    Packet(#[from] crate::rtp::PacketError),
}

/// FlexFEC header layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FecScheme {
    /// draft-ietf-payload-flexible-fec-scheme-03, as deployed by Chromium
    #[default]
    FlexFec03,
    /// RFC 8627 (draft revision 20)
    FlexFec20,
}

impl FecScheme {
    /// SDP media subtype for this scheme
    pub fn mime_type(self) -> &'static str {
        match self {
            FecScheme::FlexFec03 => "video/flexfec-03",
            FecScheme::FlexFec20 => "video/flexfec",
        }
    }

    /// Largest sequence span one repair packet can describe
    pub fn max_media_packets(self) -> usize {
        match self {
            FecScheme::FlexFec03 => 109,
            FecScheme::FlexFec20 => 110,
        }
    }

    /// Build an encoder for this scheme
    ///
    /// `payload_type` and `ssrc` address the FEC stream; repair sequence
    /// numbers start at `initial_seq`.
    pub fn encoder(
        self,
        payload_type: u8,
        ssrc: u32,
        initial_seq: SeqNumber,
    ) -> Box<dyn FecEncoder> {
        match self {
            FecScheme::FlexFec03 => {
                Box::new(FlexFec03Encoder::with_initial_seq(payload_type, ssrc, initial_seq))
            }
            FecScheme::FlexFec20 => {
                Box::new(FlexFec20Encoder::with_initial_seq(payload_type, ssrc, initial_seq))
            }
        }
    }
}

impl fmt::Display for FecScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FecScheme::FlexFec03 => write!(f, "flexfec-03"),
            FecScheme::FlexFec20 => write!(f, "flexfec-20"),
        }
    }
}

impl FromStr for FecScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flexfec-03" | "flexfec03" | "03" => Ok(FecScheme::FlexFec03),
            "flexfec-20" | "flexfec20" | "flexfec" | "rfc8627" | "20" => Ok(FecScheme::FlexFec20),
            other => Err(format!("unknown FEC scheme: {}", other)),
        }
    }
}

/// The encoding contract
///
/// `encode` must return exactly `repair_count` packets, and encoding the same
/// ordered batch twice must yield identical packets apart from the RTP
/// sequence number, which increases by one per repair packet over the
/// encoder's whole lifetime.
pub trait FecEncoder: Send {
    /// Which header layout this encoder produces
    fn scheme(&self) -> FecScheme;

    /// Produce `repair_count` repair packets protecting `batch`
    fn encode(
        &mut self,
        batch: &[RtpPacket],
        repair_count: usize,
    ) -> Result<Vec<RtpPacket>, EncodeError>;
}

/// Protection mask over sequence numbers, relative to a base
///
/// Offset `k` from the base lives at bit `127 - k`, so the wire chunks can
/// be read off the top of the word MSB-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtectionMask(u128);

impl ProtectionMask {
    /// Mark sequence offset `offset` as protected
    pub fn set(&mut self, offset: usize) {
        debug_assert!(offset < 128);
        self.0 |= 1u128 << (127 - offset);
    }

    /// Check whether sequence offset `offset` is protected
    pub fn is_set(&self, offset: usize) -> bool {
        offset < 128 && self.0 & (1u128 << (127 - offset)) != 0
    }

    /// Offsets 0-14 (15 bits)
    pub fn chunk1(&self) -> u16 {
        (self.0 >> 113) as u16
    }

    /// Offsets 15-45 (31 bits)
    pub fn chunk2(&self) -> u32 {
        ((self.0 << 15) >> 97) as u32
    }

    /// Offsets 46-108 (63 bits, FlexFEC-03 layout)
    pub fn chunk3_63(&self) -> u64 {
        ((self.0 << 46) >> 65) as u64
    }

    /// Offsets 46-109 (64 bits, RFC 8627 layout)
    pub fn chunk3_64(&self) -> u64 {
        ((self.0 << 46) >> 64) as u64
    }

    /// Raw mask word
    pub fn as_raw(&self) -> u128 {
        self.0
    }
}

/// XOR of the media header fields a receiver needs to rebuild a lost header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryFields {
    /// P, X, CC (R and F bits cleared)
    pub first_octet: u8,
    /// M, PT
    pub second_octet: u8,
    /// XOR of protected-region lengths
    pub length: u16,
    /// XOR of timestamps
    pub timestamp: u32,
}

impl RecoveryFields {
    /// Fold the header of every packet into the recovery fields
    pub fn compute<'a>(
        packets: impl IntoIterator<Item = &'a RtpPacket>,
    ) -> Result<Self, EncodeError> {
        let mut fields = RecoveryFields::default();
        for packet in packets {
            let len = packet.protected_len();
            let len = u16::try_from(len)
                .map_err(|_| EncodeError::ProtectedRegionTooLarge { len })?;
            fields.first_octet ^= packet.header.first_octet();
            fields.second_octet ^= packet.header.second_octet();
            fields.length ^= len;
            fields.timestamp ^= packet.header.timestamp;
        }
        // R and F live where the media header keeps its version bits
        fields.first_octet &= 0b0011_1111;
        Ok(fields)
    }

    /// Serialize the 8 recovery bytes
    pub fn to_bytes(&self, buf: &mut BytesMut) {
        buf.put_u8(self.first_octet);
        buf.put_u8(self.second_octet);
        buf.put_u16(self.length);
        buf.put_u32(self.timestamp);
    }
}

/// XOR the protected regions of `packets`, zero-padding to the longest one
pub fn xor_protected_regions<'a>(
    packets: impl IntoIterator<Item = &'a RtpPacket>,
) -> Result<BytesMut, EncodeError> {
    let mut acc = BytesMut::new();
    let mut scratch = BytesMut::new();
    for packet in packets {
        scratch.clear();
        packet.header.to_bytes(&mut scratch)?;
        scratch.extend_from_slice(&packet.payload);
        let region = &scratch[FIXED_HEADER_SIZE..];

        if acc.len() < region.len() {
            acc.resize(region.len(), 0);
        }
        for (dst, src) in acc.iter_mut().zip(region) {
            *dst ^= *src;
        }
    }
    Ok(acc)
}

/// One repair packet's worth of protected media, ready for serialization
pub(crate) struct RepairPlan<'a> {
    pub packets: Vec<&'a RtpPacket>,
    pub protected_ssrc: u32,
    pub sn_base: SeqNumber,
    pub mask: ProtectionMask,
}

/// State shared by every FlexFEC layout: FEC stream addressing, the repair
/// sequence counter and the cached coverage map
#[derive(Debug)]
pub(crate) struct EncoderCore {
    payload_type: u8,
    ssrc: u32,
    next_seq: SeqNumber,
    coverage: ProtectionCoverage,
}

impl EncoderCore {
    pub fn new(payload_type: u8, ssrc: u32, initial_seq: SeqNumber) -> Self {
        EncoderCore {
            payload_type,
            ssrc,
            next_seq: initial_seq,
            coverage: ProtectionCoverage::new(),
        }
    }

    pub fn next_seq(&self) -> SeqNumber {
        self.next_seq
    }

    /// Validate the batch and lay out one plan per repair packet
    pub fn plan<'a>(
        &mut self,
        batch: &'a [RtpPacket],
        repair_count: usize,
        max_span: usize,
    ) -> Result<Vec<RepairPlan<'a>>, EncodeError> {
        let first = batch.first().ok_or(EncodeError::EmptyBatch)?;
        if repair_count == 0 {
            return Err(EncodeError::ZeroRepairCount);
        }
        if repair_count > batch.len() {
            return Err(EncodeError::RepairCountExceedsBatch {
                repair: repair_count,
                batch: batch.len(),
            });
        }
        if batch.len() > max_span {
            return Err(EncodeError::BatchTooLarge {
                size: batch.len(),
                max: max_span,
            });
        }
        let protected_ssrc = first.ssrc();
        if let Some(stray) = batch.iter().find(|p| p.ssrc() != protected_ssrc) {
            return Err(EncodeError::MixedSsrc {
                expected: protected_ssrc,
                found: stray.ssrc(),
            });
        }
        for packet in batch {
            packet.header.validate()?;
            if packet.protected_len() > u16::MAX as usize {
                return Err(EncodeError::ProtectedRegionTooLarge {
                    len: packet.protected_len(),
                });
            }
        }

        self.coverage.update(batch.len(), repair_count);

        (0..repair_count)
            .map(|fec_index| {
                let packets: Vec<&RtpPacket> = self
                    .coverage
                    .covered_by(fec_index)
                    .map(|i| &batch[i])
                    .collect();

                let sn_base = packets
                    .iter()
                    .map(|p| p.seq_number())
                    .fold(packets[0].seq_number(), |min, seq| {
                        if seq.lt(min) {
                            seq
                        } else {
                            min
                        }
                    });

                let mut mask = ProtectionMask::default();
                for packet in &packets {
                    let offset = sn_base.offset_to(packet.seq_number()) as usize;
                    if offset >= max_span {
                        return Err(EncodeError::SequenceSpanTooLarge {
                            span: offset + 1,
                            max: max_span,
                        });
                    }
                    mask.set(offset);
                }

                Ok(RepairPlan {
                    packets,
                    protected_ssrc,
                    sn_base,
                    mask,
                })
            })
            .collect()
    }

    /// Header for the next repair packet, consuming one sequence number
    pub fn next_header(&mut self, timestamp: u32, csrc: Vec<u32>) -> RtpHeader {
        let mut header = RtpHeader::new(self.payload_type, self.next_seq, timestamp, self.ssrc);
        header.csrc = csrc;
        self.next_seq.increment();
        header
    }
}

/// Timestamp stamped on a round's repair packets: that of the newest media packet
pub(crate) fn repair_timestamp(batch: &[RtpPacket]) -> u32 {
    batch.last().map_or(0, |p| p.header.timestamp)
}
