//! Property-based tests for FlexFEC repair packets
//!
//! A receiver holding a repair packet and every protected packet but one
//! must be able to rebuild the missing one. These tests parse the repair
//! header, XOR the survivors back out and compare against the original.

use bytes::{Buf, Bytes};
use proptest::prelude::*;
use flexfec_protocol::{
    FecEncoder, FecScheme, FlexFec03Encoder, FlexFec20Encoder, RtpHeader, RtpPacket, SeqNumber,
};

const MEDIA_SSRC: u32 = 0x0BAD_F00D;
const FEC_SSRC: u32 = 0x0FEC_0FEC;
const FEC_PT: u8 = 110;

/// What a receiver learns from a repair packet's FEC header
#[derive(Debug)]
struct ParsedRepair {
    recovery: [u8; 8],
    sn_base: u16,
    offsets: Vec<usize>,
    repair_payload: Bytes,
}

/// Read `bits` mask bits (MSB first) as packet offsets starting at `first`
fn mask_offsets(value: u64, bits: usize, first: usize, out: &mut Vec<usize>) {
    for i in 0..bits {
        if value & (1u64 << (bits - 1 - i)) != 0 {
            out.push(first + i);
        }
    }
}

fn parse_repair(scheme: FecScheme, payload: &Bytes) -> ParsedRepair {
    let mut buf = &payload[..];
    let mut recovery = [0u8; 8];
    buf.copy_to_slice(&mut recovery);

    if scheme == FecScheme::FlexFec03 {
        assert_eq!(buf.get_u8(), 1, "SSRCCount");
        buf.advance(3);
        assert_eq!(buf.get_u32(), MEDIA_SSRC);
    }
    let sn_base = buf.get_u16();

    let mut offsets = Vec::new();
    let chunk1 = buf.get_u16();
    mask_offsets((chunk1 & 0x7FFF) as u64, 15, 0, &mut offsets);
    if chunk1 & 0x8000 == 0 {
        let chunk2 = buf.get_u32();
        mask_offsets((chunk2 & 0x7FFF_FFFF) as u64, 31, 15, &mut offsets);
        if chunk2 & 0x8000_0000 == 0 {
            let chunk3 = buf.get_u64();
            match scheme {
                FecScheme::FlexFec03 => {
                    assert!(chunk3 & (1 << 63) != 0, "final chunk carries the k bit");
                    mask_offsets(chunk3 & !(1 << 63), 63, 46, &mut offsets);
                }
                FecScheme::FlexFec20 => mask_offsets(chunk3, 64, 46, &mut offsets),
            }
        }
    }

    ParsedRepair {
        recovery,
        sn_base,
        offsets,
        repair_payload: Bytes::copy_from_slice(buf),
    }
}

/// Rebuild the packet at `missing_seq` from a repair and the surviving packets
fn recover(parsed: &ParsedRepair, survivors: &[&RtpPacket], missing_seq: u16) -> RtpPacket {
    let mut recovery = parsed.recovery;
    let mut region = parsed.repair_payload.to_vec();

    for packet in survivors {
        let bytes = packet.to_bytes().unwrap();
        recovery[0] ^= bytes[0];
        recovery[1] ^= bytes[1];
        let len = (packet.protected_len() as u16).to_be_bytes();
        recovery[2] ^= len[0];
        recovery[3] ^= len[1];
        for (i, b) in packet.header.timestamp.to_be_bytes().iter().enumerate() {
            recovery[4 + i] ^= b;
        }
        for (dst, src) in region.iter_mut().zip(&bytes[12..]) {
            *dst ^= *src;
        }
    }

    let length = u16::from_be_bytes([recovery[2], recovery[3]]) as usize;
    let mut raw = Vec::with_capacity(12 + length);
    raw.push(0x80 | (recovery[0] & 0x3F));
    raw.push(recovery[1]);
    raw.extend_from_slice(&missing_seq.to_be_bytes());
    raw.extend_from_slice(&recovery[4..8]);
    raw.extend_from_slice(&MEDIA_SSRC.to_be_bytes());
    raw.extend_from_slice(&region[..length]);

    RtpPacket::from_bytes(&raw).unwrap()
}

fn media_packet_strategy() -> impl Strategy<Value = (bool, u8, u32, Vec<u32>, Vec<u8>)> {
    (
        any::<bool>(),                                 // marker
        0u8..=127,                                     // payload type
        any::<u32>(),                                  // timestamp
        prop::collection::vec(any::<u32>(), 0..3),     // csrc
        prop::collection::vec(any::<u8>(), 1..200),    // payload
    )
}

fn batch_strategy() -> impl Strategy<Value = (Vec<RtpPacket>, usize)> {
    (
        any::<u16>(),
        prop::collection::vec((media_packet_strategy(), 1u16..3), 1..24),
    )
        .prop_flat_map(|(first_seq, shapes)| {
            let mut seq = first_seq;
            let batch: Vec<RtpPacket> = shapes
                .into_iter()
                .map(|((marker, pt, ts, csrc, payload), step)| {
                    let mut header = RtpHeader::new(pt, SeqNumber::new(seq), ts, MEDIA_SSRC);
                    header.marker = marker;
                    header.csrc = csrc;
                    seq = seq.wrapping_add(step);
                    RtpPacket::new(header, Bytes::from(payload))
                })
                .collect();
            let len = batch.len();
            (Just(batch), 1..=len)
        })
}

fn encoder_for(scheme: FecScheme) -> Box<dyn FecEncoder> {
    match scheme {
        FecScheme::FlexFec03 => Box::new(FlexFec03Encoder::new(FEC_PT, FEC_SSRC)),
        FecScheme::FlexFec20 => Box::new(FlexFec20Encoder::new(FEC_PT, FEC_SSRC)),
    }
}

fn scheme_strategy() -> impl Strategy<Value = FecScheme> {
    prop_oneof![Just(FecScheme::FlexFec03), Just(FecScheme::FlexFec20)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Any single loss among a repair packet's protected set is recoverable
    #[test]
    fn prop_single_loss_is_recoverable(
        scheme in scheme_strategy(),
        (batch, repair_count) in batch_strategy(),
        pick in any::<usize>(),
    ) {
        let mut encoder = encoder_for(scheme);
        let repairs = encoder.encode(&batch, repair_count).unwrap();
        prop_assert_eq!(repairs.len(), repair_count);

        for repair in &repairs {
            let parsed = parse_repair(scheme, &repair.payload);
            let protected: Vec<&RtpPacket> = batch
                .iter()
                .filter(|p| {
                    let offset = SeqNumber::new(parsed.sn_base).offset_to(p.seq_number()) as usize;
                    parsed.offsets.contains(&offset)
                })
                .collect();
            prop_assert_eq!(protected.len(), parsed.offsets.len());

            let missing = protected[pick % protected.len()];
            let survivors: Vec<&RtpPacket> = protected
                .iter()
                .copied()
                .filter(|p| p.seq_number() != missing.seq_number())
                .collect();

            let rebuilt = recover(&parsed, &survivors, missing.seq_number().as_raw());
            prop_assert_eq!(&rebuilt, missing);
        }
    }

    /// Every media packet in a batch is protected by at least one repair
    #[test]
    fn prop_every_packet_is_covered(
        scheme in scheme_strategy(),
        (batch, repair_count) in batch_strategy(),
    ) {
        let mut encoder = encoder_for(scheme);
        let repairs = encoder.encode(&batch, repair_count).unwrap();

        let mut covered = vec![false; batch.len()];
        for repair in &repairs {
            let parsed = parse_repair(scheme, &repair.payload);
            let base = SeqNumber::new(parsed.sn_base);
            for (i, packet) in batch.iter().enumerate() {
                if parsed.offsets.contains(&(base.offset_to(packet.seq_number()) as usize)) {
                    covered[i] = true;
                }
            }
        }
        prop_assert!(covered.iter().all(|&c| c));
    }

    /// Two encoders fed identical input produce identical repair packets
    #[test]
    fn prop_encoding_is_deterministic(
        scheme in scheme_strategy(),
        (batch, repair_count) in batch_strategy(),
    ) {
        let mut a = encoder_for(scheme);
        let mut b = encoder_for(scheme);
        prop_assert_eq!(
            a.encode(&batch, repair_count).unwrap(),
            b.encode(&batch, repair_count).unwrap()
        );
    }

    /// Repair sequence numbers run on without gaps across rounds
    #[test]
    fn prop_repair_sequence_is_contiguous(
        scheme in scheme_strategy(),
        rounds in prop::collection::vec(batch_strategy(), 1..5),
    ) {
        let mut encoder = encoder_for(scheme);
        let mut expected = SeqNumber::new(0);
        for (batch, repair_count) in &rounds {
            for repair in encoder.encode(batch, *repair_count).unwrap() {
                prop_assert_eq!(repair.seq_number(), expected);
                prop_assert_eq!(repair.ssrc(), FEC_SSRC);
                prop_assert_eq!(repair.header.payload_type, FEC_PT);
                prop_assert_eq!(repair.header.timestamp, batch.last().unwrap().header.timestamp);
                expected = expected.next();
            }
        }
    }
}
