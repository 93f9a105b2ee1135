//! Downstream RTP Writer
//!
//! The capability a FEC stage forwards packets into. Original media packets
//! and generated repair packets go through the same `write` call.

use flexfec_protocol::RtpHeader;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Per-packet metadata passed through the write path untouched
pub type Attributes = HashMap<usize, usize>;

/// Downstream write errors
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Writer closed")]
    Closed,

    #[error("Packet serialization failed: {0}")]
    Packet(#[from] flexfec_protocol::PacketError),

    #[error("{0}")]
    Other(String),
}

/// A sink for outbound RTP packets
///
/// Returns the number of bytes written. A return of `Ok(0)` is treated the
/// same as an error by callers that care about delivery.
pub trait RtpWriter: Send + Sync {
    fn write(
        &self,
        header: &RtpHeader,
        payload: &[u8],
        attributes: &Attributes,
    ) -> Result<usize, WriteError>;
}

impl<W: RtpWriter + ?Sized> RtpWriter for Arc<W> {
    fn write(
        &self,
        header: &RtpHeader,
        payload: &[u8],
        attributes: &Attributes,
    ) -> Result<usize, WriteError> {
        (**self).write(header, payload, attributes)
    }
}

impl<W: RtpWriter + ?Sized> RtpWriter for Box<W> {
    fn write(
        &self,
        header: &RtpHeader,
        payload: &[u8],
        attributes: &Attributes,
    ) -> Result<usize, WriteError> {
        (**self).write(header, payload, attributes)
    }
}

impl<W: RtpWriter + ?Sized> RtpWriter for &W {
    fn write(
        &self,
        header: &RtpHeader,
        payload: &[u8],
        attributes: &Attributes,
    ) -> Result<usize, WriteError> {
        (**self).write(header, payload, attributes)
    }
}

/// Adapts a closure into an [`RtpWriter`]
pub struct RtpWriterFn<F>(pub F);

impl<F> RtpWriter for RtpWriterFn<F>
where
    F: Fn(&RtpHeader, &[u8], &Attributes) -> Result<usize, WriteError> + Send + Sync,
{
    fn write(
        &self,
        header: &RtpHeader,
        payload: &[u8],
        attributes: &Attributes,
    ) -> Result<usize, WriteError> {
        (self.0)(header, payload, attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexfec_protocol::SeqNumber;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_closure_writer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let writer = RtpWriterFn(move |header: &RtpHeader, payload: &[u8], _: &Attributes| -> Result<usize, WriteError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(header.marshal_size() + payload.len())
        });

        let header = RtpHeader::new(96, SeqNumber::new(1), 0, 1);
        let shared: Arc<dyn RtpWriter> = Arc::new(writer);
        assert_eq!(shared.write(&header, b"abcd", &Attributes::new()).unwrap(), 16);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
