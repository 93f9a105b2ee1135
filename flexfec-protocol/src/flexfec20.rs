//! FlexFEC (RFC 8627) Encoder
//!
//! The published revision of the flexible FEC scheme. Unlike -03 the
//! protected SSRC is not carried in the FEC header; it is listed as the
//! single CSRC of the repair packet's RTP header. The last mask chunk has
//! no k bit and spans 64 offsets.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |R|F|P|X|  CC   |M| PT recovery |        length recovery        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          TS recovery                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           SN base_i           |k|          Mask [0-14]        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |k|                   Mask [15-45] (optional)                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Mask [46-109] (optional)                  |
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::encoder::{
    repair_timestamp, xor_protected_regions, EncodeError, EncoderCore, FecEncoder, FecScheme,
    RecoveryFields, RepairPlan,
};
use crate::rtp::RtpPacket;
use crate::sequence::SeqNumber;
use bytes::{BufMut, BytesMut};

/// Header size with only the first mask chunk
pub const BASE_HEADER_SIZE: usize = 12;

/// Header size with all three mask chunks
pub const MAX_HEADER_SIZE: usize = BASE_HEADER_SIZE + 4 + 8;

const K_BIT_16: u16 = 0x8000;
const K_BIT_32: u32 = 0x8000_0000;

/// RFC 8627 repair packet generator
#[derive(Debug)]
pub struct FlexFec20Encoder {
    core: EncoderCore,
}

impl FlexFec20Encoder {
    /// Create an encoder for the FEC stream `ssrc` / `payload_type`
    pub fn new(payload_type: u8, ssrc: u32) -> Self {
        Self::with_initial_seq(payload_type, ssrc, SeqNumber::new(0))
    }

    /// Create an encoder whose first repair packet uses `initial_seq`
    pub fn with_initial_seq(payload_type: u8, ssrc: u32, initial_seq: SeqNumber) -> Self {
        FlexFec20Encoder {
            core: EncoderCore::new(payload_type, ssrc, initial_seq),
        }
    }

    /// Sequence number the next repair packet will carry
    pub fn next_seq(&self) -> SeqNumber {
        self.core.next_seq()
    }

    fn encode_header(plan: &RepairPlan<'_>, recovery: &RecoveryFields, buf: &mut BytesMut) {
        recovery.to_bytes(buf);
        buf.put_u16(plan.sn_base.as_raw());

        let mask1 = plan.mask.chunk1();
        let mask2 = plan.mask.chunk2();
        let mask3 = plan.mask.chunk3_64();

        if mask2 == 0 && mask3 == 0 {
            buf.put_u16(K_BIT_16 | mask1);
            return;
        }
        buf.put_u16(mask1);
        if mask3 == 0 {
            buf.put_u32(K_BIT_32 | mask2);
            return;
        }
        buf.put_u32(mask2);
        buf.put_u64(mask3);
    }
}

impl FecEncoder for FlexFec20Encoder {
    fn scheme(&self) -> FecScheme {
        FecScheme::FlexFec20
    }

    fn encode(
        &mut self,
        batch: &[RtpPacket],
        repair_count: usize,
    ) -> Result<Vec<RtpPacket>, EncodeError> {
        let plans = self
            .core
            .plan(batch, repair_count, FecScheme::FlexFec20.max_media_packets())?;
        let timestamp = repair_timestamp(batch);

        let payloads = plans
            .iter()
            .map(|plan| {
                let recovery = RecoveryFields::compute(plan.packets.iter().copied())?;
                let repair_payload = xor_protected_regions(plan.packets.iter().copied())?;

                let mut payload = BytesMut::with_capacity(MAX_HEADER_SIZE + repair_payload.len());
                Self::encode_header(plan, &recovery, &mut payload);
                payload.extend_from_slice(&repair_payload);
                Ok(payload.freeze())
            })
            .collect::<Result<Vec<_>, EncodeError>>()?;

        // Sequence numbers are handed out only once every payload is built
        Ok(plans
            .iter()
            .zip(payloads)
            .map(|(plan, payload)| {
                let header = self.core.next_header(timestamp, vec![plan.protected_ssrc]);
                RtpPacket::new(header, payload)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp::{PacketError, RtpHeader};
    use bytes::Bytes;

    const MEDIA_SSRC: u32 = 0x0A0B_0C0D;
    const FEC_SSRC: u32 = 0x0102_0304;

    fn media(seq: u16, payload: Vec<u8>) -> RtpPacket {
        RtpPacket::new(
            RtpHeader::new(100, SeqNumber::new(seq), 90 * seq as u32, MEDIA_SSRC),
            Bytes::from(payload),
        )
    }

    #[test]
    fn test_layout() {
        let batch = vec![media(10, vec![1, 2, 3]), media(11, vec![4, 5])];
        let mut encoder = FlexFec20Encoder::new(49, FEC_SSRC);
        let repair = encoder.encode(&batch, 1).unwrap().remove(0);

        assert_eq!(repair.header.csrc, vec![MEDIA_SSRC]);
        assert_eq!(repair.header.ssrc, FEC_SSRC);
        assert_eq!(repair.header.payload_type, 49);
        assert_eq!(repair.header.timestamp, 990);

        let p = &repair.payload;
        assert_eq!(p.len(), BASE_HEADER_SIZE + 3);
        assert_eq!(&p[2..4], &[0, 3 ^ 2]);
        assert_eq!(&p[4..8], &(900u32 ^ 990).to_be_bytes());
        assert_eq!(&p[8..10], &10u16.to_be_bytes());
        assert_eq!(&p[10..12], &[0xE0, 0x00]);
        assert_eq!(&p[12..], &[1 ^ 4, 2 ^ 5, 3]);
    }

    #[test]
    fn test_full_width_mask_has_no_trailing_k() {
        let batch = vec![media(0, vec![1]), media(109, vec![2])];
        let mut encoder = FlexFec20Encoder::new(49, FEC_SSRC);
        let repair = encoder.encode(&batch, 1).unwrap().remove(0);

        let p = &repair.payload;
        assert_eq!(p.len(), MAX_HEADER_SIZE + 1);
        assert_eq!(&p[10..12], &[0x40, 0x00]);
        assert_eq!(&p[12..16], &[0, 0, 0, 0]);
        assert_eq!(&p[16..24], &1u64.to_be_bytes());
    }

    #[test]
    fn test_span_limit() {
        let batch = vec![media(0, vec![1]), media(110, vec![2])];
        let mut encoder = FlexFec20Encoder::new(49, FEC_SSRC);
        assert_eq!(
            encoder.encode(&batch, 1),
            Err(EncodeError::SequenceSpanTooLarge { span: 111, max: 110 })
        );
    }

    #[test]
    fn test_scheme_tag() {
        let encoder = FecScheme::FlexFec20.encoder(49, FEC_SSRC, SeqNumber::new(7));
        assert_eq!(encoder.scheme(), FecScheme::FlexFec20);
        assert_eq!(FlexFec20Encoder::new(49, FEC_SSRC).next_seq().as_raw(), 0);
    }

    #[test]
    fn test_unserializable_batch_consumes_no_sequence() {
        let mut batch: Vec<_> = (0..4).map(|i| media(i, vec![i as u8; 6])).collect();
        batch[3].header.csrc = vec![7; 16];
        let mut encoder = FlexFec20Encoder::with_initial_seq(49, FEC_SSRC, SeqNumber::new(40));

        assert_eq!(
            encoder.encode(&batch, 2),
            Err(EncodeError::Packet(PacketError::TooManyCsrcs(16)))
        );
        assert_eq!(encoder.next_seq().as_raw(), 40);

        batch[3].header.csrc.clear();
        let repairs = encoder.encode(&batch, 2).unwrap();
        assert_eq!(repairs[0].header.sequence_number.as_raw(), 40);
        assert_eq!(encoder.next_seq().as_raw(), 42);
    }
}
