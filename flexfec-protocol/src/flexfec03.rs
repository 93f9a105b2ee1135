//! FlexFEC-03 Encoder
//!
//! Header layout from draft-ietf-payload-flexible-fec-scheme-03 §4.2 with
//! the flexible mask (F = 0). This is the revision Chromium negotiates as
//! `flexfec-03`.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |R|F|P|X|  CC   |M| PT recovery |        length recovery        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          TS recovery                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   SSRCCount   |                    reserved                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             SSRC_i                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           SN base_i           |k|          Mask [0-14]        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |k|                   Mask [15-45] (optional)                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |k|                                                             |
//! +-+                   Mask [46-108] (optional)                  |
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
pub const BASE_HEADER_SIZE: usize = 20;

/// Header size with all three mask chunks
pub const MAX_HEADER_SIZE: usize = BASE_HEADER_SIZE + 4 + 8;

const K_BIT_16: u16 = 0x8000;
const K_BIT_32: u32 = 0x8000_0000;
const K_BIT_64: u64 = 0x8000_0000_0000_0000;

/// FlexFEC-03 repair packet generator
#[derive(Debug)]
pub struct FlexFec03Encoder {
    core: EncoderCore,
}

impl FlexFec03Encoder {
    /// Create an encoder for the FEC stream `ssrc` / `payload_type`
    pub fn new(payload_type: u8, ssrc: u32) -> Self {
        Self::with_initial_seq(payload_type, ssrc, SeqNumber::new(0))
    }

    /// Create an encoder whose first repair packet uses `initial_seq`
    pub fn with_initial_seq(payload_type: u8, ssrc: u32, initial_seq: SeqNumber) -> Self {
        FlexFec03Encoder {
            core: EncoderCore::new(payload_type, ssrc, initial_seq),
        }
    }

    /// Sequence number the next repair packet will carry
    pub fn next_seq(&self) -> SeqNumber {
        self.core.next_seq()
    }

    fn encode_header(plan: &RepairPlan<'_>, recovery: &RecoveryFields, buf: &mut BytesMut) {
        recovery.to_bytes(buf);

        buf.put_u8(1); // SSRCCount
        buf.put_slice(&[0; 3]);
        buf.put_u32(plan.protected_ssrc);
        buf.put_u16(plan.sn_base.as_raw());

        let mask1 = plan.mask.chunk1();
        let mask2 = plan.mask.chunk2();
        let mask3 = plan.mask.chunk3_63();

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
        buf.put_u64(K_BIT_64 | mask3);
    }
}

impl FecEncoder for FlexFec03Encoder {
    fn scheme(&self) -> FecScheme {
        FecScheme::FlexFec03
    }

    fn encode(
        &mut self,
        batch: &[RtpPacket],
        repair_count: usize,
    ) -> Result<Vec<RtpPacket>, EncodeError> {
        let plans = self
            .core
            .plan(batch, repair_count, FecScheme::FlexFec03.max_media_packets())?;
        let timestamp = repair_timestamp(batch);

        let mut payloads = Vec::with_capacity(plans.len());
        for plan in &plans {
            let recovery = RecoveryFields::compute(plan.packets.iter().copied())?;
            let repair_payload = xor_protected_regions(plan.packets.iter().copied())?;

            let mut payload = BytesMut::with_capacity(MAX_HEADER_SIZE + repair_payload.len());
            Self::encode_header(plan, &recovery, &mut payload);
            payload.extend_from_slice(&repair_payload);
            payloads.push(payload.freeze());
        }

        // Sequence numbers are handed out only once every payload is built
        Ok(payloads
            .into_iter()
            .map(|payload| RtpPacket::new(self.core.next_header(timestamp, Vec::new()), payload))
            .collect())
    }
}
