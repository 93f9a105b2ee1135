//! Outbound stream description supplied at bind time

/// Identifiers negotiated for one outbound media stream and its FEC stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamInfo {
    /// Media stream SSRC
    pub ssrc: u32,
    /// FEC stream SSRC (0 if FEC was not negotiated)
    pub ssrc_fec: u32,
    /// Media payload type
    pub payload_type: u8,
    /// FEC payload type (0 if FEC was not negotiated)
    pub payload_type_fec: u8,
    /// Media codec MIME type, e.g. "video/H264"
    pub mime_type: String,
    /// Media clock rate in Hz
    pub clock_rate: u32,
}

impl StreamInfo {
    /// Describe a video stream with a FEC companion
    pub fn new(ssrc: u32, ssrc_fec: u32, payload_type: u8, payload_type_fec: u8) -> Self {
        StreamInfo {
            ssrc,
            ssrc_fec,
            payload_type,
            payload_type_fec,
            mime_type: String::new(),
            clock_rate: 90_000,
        }
    }

    /// Set the media codec MIME type
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Check whether a FEC stream was negotiated at all
    pub fn has_fec(&self) -> bool {
        self.ssrc_fec != 0 && self.payload_type_fec != 0
    }
}
