//! Protection buffer
//!
//! Holds copies of the media packets sent since the last encode round. The
//! storage is allocated once with room for exactly one round and never
//! grows: a push into a full buffer is rejected rather than reallocating.

use flexfec_protocol::RtpPacket;
use thiserror::Error;

/// Buffer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Protection buffer is full ({capacity} packets)")]
    Full { capacity: usize },
}

/// Fixed-capacity working set of media packets awaiting protection
#[derive(Debug)]
pub struct PacketBuffer {
    /// Packets in arrival order
    packets: Vec<RtpPacket>,
    /// Round size; the Vec is never allowed past this
    capacity: usize,
}

impl PacketBuffer {
    /// Create a buffer holding exactly `capacity` packets
    pub fn new(capacity: usize) -> Self {
        PacketBuffer {
            packets: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a packet
    ///
    /// Returns true if the buffer is now full and a round should be encoded.
    pub fn push(&mut self, packet: RtpPacket) -> Result<bool, BufferError> {
        if self.is_full() {
            return Err(BufferError::Full {
                capacity: self.capacity,
            });
        }
        self.packets.push(packet);
        Ok(self.is_full())
    }

    /// The buffered batch, oldest first
    pub fn batch(&self) -> &[RtpPacket] {
        &self.packets
    }

    /// Drop every buffered packet, keeping the allocation
    pub fn clear(&mut self) {
        self.packets.clear();
    }

    /// Number of buffered packets
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Check if the buffer holds a full round
    pub fn is_full(&self) -> bool {
        self.packets.len() >= self.capacity
    }

    /// Round size
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use flexfec_protocol::{RtpHeader, SeqNumber};

    fn packet(seq: u16) -> RtpPacket {
        RtpPacket::new(
            RtpHeader::new(96, SeqNumber::new(seq), 0, 1),
            Bytes::from_static(b"x"),
        )
    }

    #[test]
    fn test_fills_to_capacity() {
        let mut buffer = PacketBuffer::new(3);
        assert!(buffer.is_empty());
        assert_eq!(buffer.push(packet(1)), Ok(false));
        assert_eq!(buffer.push(packet(2)), Ok(false));
        assert_eq!(buffer.push(packet(3)), Ok(true));
        assert!(buffer.is_full());

        let seqs: Vec<u16> = buffer
            .batch()
            .iter()
            .map(|p| p.seq_number().as_raw())
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn test_rejects_overflow() {
        let mut buffer = PacketBuffer::new(1);
        buffer.push(packet(1)).unwrap();
        assert_eq!(buffer.push(packet(2)), Err(BufferError::Full { capacity: 1 }));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_clear_keeps_allocation() {
        let mut buffer = PacketBuffer::new(4);
        for seq in 0..4 {
            buffer.push(packet(seq)).unwrap();
        }
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.push(packet(9)), Ok(false));
    }
}
