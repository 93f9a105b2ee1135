//! FEC Stage
//!
//! Sits in the outbound RTP path of one media stream. Every media packet is
//! forwarded immediately and a copy is buffered; once a full round is
//! buffered the stage encodes it and forwards the repair packets through the
//! same downstream writer. Packets from other SSRCs pass straight through.

use crate::buffer::PacketBuffer;
use crate::config::{ConfigError, FecConfig};
use crate::stream::StreamInfo;
use crate::writer::{Attributes, RtpWriter, WriteError};
use flexfec_protocol::rtp::MAX_PAYLOAD_TYPE;
use flexfec_protocol::{FecEncoder, FecScheme, RtpHeader, RtpPacket};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Bind errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("No FEC stream negotiated for SSRC {0:#010x}")]
    FecNotNegotiated(u32),

    #[error("FEC stream reuses the media SSRC {0:#010x}")]
    SsrcCollision(u32),

    #[error("FEC stream reuses the media payload type {0}")]
    PayloadTypeCollision(u8),

    #[error("Invalid payload type: {0}")]
    InvalidPayloadType(u8),
}

/// Stage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FecStats {
    /// Media packets buffered for protection
    pub media_packets: u64,
    /// Packets from other SSRCs forwarded untouched
    pub bypassed_packets: u64,
    /// Encode rounds run
    pub rounds: u64,
    /// Repair packets produced by the encoder
    pub repair_packets_generated: u64,
    /// Repair packets accepted by the downstream writer
    pub repair_packets_sent: u64,
    /// Repair packets abandoned after a failed forward
    pub repair_packets_dropped: u64,
    /// Rounds the encoder rejected
    pub encode_failures: u64,
    /// Packets currently waiting in the buffer
    pub buffered: usize,
}

/// Produces one unbound [`FecStage`] per outbound stream
#[derive(Debug, Clone)]
pub struct FecStageFactory {
    config: FecConfig,
}

impl FecStageFactory {
    /// Create a factory, validating the configuration once for every stage
    pub fn new(config: FecConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(FecStageFactory { config })
    }

    /// Configuration handed to each stage
    pub fn config(&self) -> &FecConfig {
        &self.config
    }

    /// Create a stage for a new outbound stream
    pub fn new_stage(&self) -> FecStage {
        FecStage {
            config: self.config.clone(),
        }
    }
}

impl Default for FecStageFactory {
    fn default() -> Self {
        FecStageFactory {
            config: FecConfig::default(),
        }
    }
}

/// An unbound FEC stage
///
/// Binding consumes the stage, so a stage can only ever serve one stream.
#[derive(Debug)]
pub struct FecStage {
    config: FecConfig,
}

impl FecStage {
    /// Attach the stage to `info`'s stream, wrapping its downstream writer
    ///
    /// The encoder is built for the configured scheme and addressed to the
    /// stream's FEC SSRC and payload type.
    pub fn bind<W: RtpWriter>(
        self,
        info: &StreamInfo,
        writer: W,
    ) -> Result<FecWriter<W>, BindError> {
        let encoder = self.config.scheme.encoder(
            info.payload_type_fec,
            info.ssrc_fec,
            self.config.initial_fec_sequence,
        );
        self.bind_with_encoder(info, writer, encoder)
    }

    /// Like [`bind`](Self::bind) but with a caller-supplied encoder
    pub fn bind_with_encoder<W: RtpWriter>(
        self,
        info: &StreamInfo,
        writer: W,
        encoder: Box<dyn FecEncoder>,
    ) -> Result<FecWriter<W>, BindError> {
        check_stream(info)?;

        tracing::info!(
            "FEC stage bound: ssrc={:#010x} fec_ssrc={:#010x} mime={} pt={} fec_pt={} scheme={} round={}+{}",
            info.ssrc,
            info.ssrc_fec,
            info.mime_type,
            info.payload_type,
            info.payload_type_fec,
            encoder.scheme(),
            self.config.media_packets_per_round,
            self.config.repair_packets_per_round
        );

        Ok(FecWriter {
            inner: writer,
            media_ssrc: info.ssrc,
            fec_ssrc: info.ssrc_fec,
            repair_count: self.config.repair_packets_per_round,
            bypassed: AtomicU64::new(0),
            state: Mutex::new(StageState {
                buffer: PacketBuffer::new(self.config.media_packets_per_round),
                encoder,
                stats: FecStats::default(),
            }),
        })
    }
}

fn check_stream(info: &StreamInfo) -> Result<(), BindError> {
    if !info.has_fec() {
        return Err(BindError::FecNotNegotiated(info.ssrc));
    }
    for pt in [info.payload_type, info.payload_type_fec] {
        if pt > MAX_PAYLOAD_TYPE {
            return Err(BindError::InvalidPayloadType(pt));
        }
    }
    if info.ssrc_fec == info.ssrc {
        return Err(BindError::SsrcCollision(info.ssrc));
    }
    if info.payload_type_fec == info.payload_type {
        return Err(BindError::PayloadTypeCollision(info.payload_type));
    }
    Ok(())
}

/// Buffer and encoder, only ever touched under the stage lock
struct StageState {
    buffer: PacketBuffer,
    encoder: Box<dyn FecEncoder>,
    stats: FecStats,
}

/// A bound FEC stage: the writer that replaces the stream's direct write path
pub struct FecWriter<W> {
    inner: W,
    media_ssrc: u32,
    fec_ssrc: u32,
    repair_count: usize,
    bypassed: AtomicU64,
    state: Mutex<StageState>,
}

impl<W: RtpWriter> FecWriter<W> {
    /// SSRC of the protected media stream
    pub fn media_ssrc(&self) -> u32 {
        self.media_ssrc
    }

    /// SSRC the repair packets are sent on
    pub fn fec_ssrc(&self) -> u32 {
        self.fec_ssrc
    }

    /// Header layout of the repair packets
    pub fn scheme(&self) -> FecScheme {
        self.state.lock().encoder.scheme()
    }

    /// Number of media packets waiting for the next round
    pub fn buffered(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Snapshot of the stage counters
    pub fn stats(&self) -> FecStats {
        let state = self.state.lock();
        FecStats {
            bypassed_packets: self.bypassed.load(Ordering::Relaxed),
            buffered: state.buffer.len(),
            ..state.stats.clone()
        }
    }

    /// The wrapped downstream writer
    pub fn inner(&self) -> &W {
        &self.inner
    }

    /// Encode the full buffer and forward the repair packets
    ///
    /// The first forward that fails or writes nothing abandons the rest of
    /// the round. The buffer is cleared either way.
    fn run_round(&self, state: &mut StageState, attributes: &Attributes) {
        let StageState {
            buffer,
            encoder,
            stats,
        } = state;
        stats.rounds += 1;

        match encoder.encode(buffer.batch(), self.repair_count) {
            Ok(repairs) => {
                stats.repair_packets_generated += repairs.len() as u64;

                for (index, repair) in repairs.iter().enumerate() {
                    match self
                        .inner
                        .write(&repair.header, &repair.payload, attributes)
                    {
                        Ok(n) if n > 0 => stats.repair_packets_sent += 1,
                        outcome => {
                            let abandoned = repairs.len() - index;
                            stats.repair_packets_dropped += abandoned as u64;
                            match outcome {
                                Err(e) => tracing::warn!(
                                    "FEC repair forward failed on ssrc {:#010x}, dropping {} repair packet(s): {}",
                                    self.fec_ssrc,
                                    abandoned,
                                    e
                                ),
                                Ok(_) => tracing::warn!(
                                    "FEC repair forward wrote nothing on ssrc {:#010x}, dropping {} repair packet(s)",
                                    self.fec_ssrc,
                                    abandoned
                                ),
                            }
                            break;
                        }
                    }
                }

                tracing::debug!(
                    "FEC round {} on ssrc {:#010x}: {} media -> {} repair",
                    stats.rounds,
                    self.media_ssrc,
                    buffer.len(),
                    repairs.len()
                );
            }
            Err(e) => {
                stats.encode_failures += 1;
                tracing::error!(
                    "FEC encode failed on ssrc {:#010x}: {}",
                    self.media_ssrc,
                    e
                );
            }
        }

        buffer.clear();
    }
}

impl<W: RtpWriter> RtpWriter for FecWriter<W> {
    /// Forward a packet, protecting it if it belongs to the bound stream
    ///
    /// Always returns the downstream result for this packet; repair
    /// forwarding outcomes are only reflected in [`FecStats`].
    fn write(
        &self,
        header: &RtpHeader,
        payload: &[u8],
        attributes: &Attributes,
    ) -> Result<usize, WriteError> {
        if header.ssrc != self.media_ssrc {
            self.bypassed.fetch_add(1, Ordering::Relaxed);
            return self.inner.write(header, payload, attributes);
        }

        // Held through the forward so a round's repairs directly follow the
        // media packet that completed it.
        let mut state = self.state.lock();

        let round_ready = match state.buffer.push(RtpPacket::copy_from(header, payload)) {
            Ok(ready) => {
                state.stats.media_packets += 1;
                ready
            }
            Err(e) => {
                tracing::error!("ssrc {:#010x}: {}", self.media_ssrc, e);
                false
            }
        };

        let result = self.inner.write(header, payload, attributes);

        if round_ready {
            self.run_round(&mut state, attributes);
        }

        result
    }
}
