//! UDP socket wrapper for RTP
//!
//! Provides a blocking UDP socket with configurable buffer sizes, and an
//! [`RtpWriter`] that serializes packets onto it.

use bytes::{BufMut, BytesMut};
use flexfec_interceptor::{Attributes, RtpWriter, WriteError};
use flexfec_protocol::RtpHeader;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use thiserror::Error;

/// Socket configuration errors
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid socket address")]
    InvalidAddress,
}

impl SocketError {
    /// Check whether the error is a non-blocking socket with nothing to do
    pub fn is_would_block(&self) -> bool {
        matches!(self, SocketError::Io(e) if e.kind() == ErrorKind::WouldBlock)
    }
}

/// RTP socket wrapper
///
/// Blocking by default, matching the synchronous write path of a FEC stage.
pub struct RtpSocket {
    inner: Socket,
}

impl RtpSocket {
    /// Create a new socket bound to the given address
    pub fn bind(addr: SocketAddr) -> Result<Self, SocketError> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;

        Ok(RtpSocket { inner: socket })
    }

    /// Switch between blocking and non-blocking mode
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<(), SocketError> {
        self.inner.set_nonblocking(nonblocking)?;
        Ok(())
    }

    /// Set the send buffer size
    pub fn set_send_buffer_size(&self, size: usize) -> Result<(), SocketError> {
        self.inner.set_send_buffer_size(size)?;
        Ok(())
    }

    /// Get the send buffer size
    pub fn send_buffer_size(&self) -> Result<usize, SocketError> {
        Ok(self.inner.send_buffer_size()?)
    }

    /// Get the local address this socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        self.inner
            .local_addr()?
            .as_socket()
            .ok_or(SocketError::InvalidAddress)
    }

    /// Send a datagram to the given address
    pub fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize, SocketError> {
        Ok(self.inner.send_to(buf, &target.into())?)
    }

    /// Receive a datagram
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SocketError> {
        // socket2 reads into MaybeUninit; an initialized buffer is a valid one
        use std::mem::MaybeUninit;
        let uninit_buf = unsafe {
            std::slice::from_raw_parts_mut(buf.as_mut_ptr() as *mut MaybeUninit<u8>, buf.len())
        };

        let (n, addr) = self.inner.recv_from(uninit_buf)?;
        Ok((n, addr.as_socket().ok_or(SocketError::InvalidAddress)?))
    }
}

/// Sends every packet it is given as one UDP datagram to a fixed peer
pub struct UdpRtpWriter {
    socket: RtpSocket,
    peer: SocketAddr,
    scratch: Mutex<BytesMut>,
}

impl UdpRtpWriter {
    /// Create a writer sending to `peer`
    pub fn new(socket: RtpSocket, peer: SocketAddr) -> Self {
        UdpRtpWriter {
            socket,
            peer,
            scratch: Mutex::new(BytesMut::with_capacity(1500)),
        }
    }

    /// Destination address
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The underlying socket
    pub fn socket(&self) -> &RtpSocket {
        &self.socket
    }
}

impl RtpWriter for UdpRtpWriter {
    fn write(
        &self,
        header: &RtpHeader,
        payload: &[u8],
        _attributes: &Attributes,
    ) -> Result<usize, WriteError> {
        let mut buf = self.scratch.lock();
        buf.clear();
        header.to_bytes(&mut buf)?;
        buf.put_slice(payload);

        match self.socket.send_to(&buf, self.peer) {
            Ok(n) => Ok(n),
            Err(SocketError::Io(e)) => Err(WriteError::Io(e)),
            Err(e) => Err(WriteError::Other(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexfec_protocol::{RtpPacket, SeqNumber};
    use std::time::Duration;

    #[test]
    fn test_socket_creation() {
        let socket = RtpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = socket.local_addr().unwrap();
        assert!(addr.port() > 0);

        socket.set_send_buffer_size(262144).unwrap();
        assert!(socket.send_buffer_size().unwrap() > 0);
    }

    #[test]
    fn test_writer_sends_rtp_datagrams() {
        let receiver = RtpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        receiver.set_nonblocking(true).unwrap();
        let peer = receiver.local_addr().unwrap();

        let sender = RtpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let writer = UdpRtpWriter::new(sender, peer);

        let header = RtpHeader::new(96, SeqNumber::new(42), 9000, 0xABCD);
        let n = writer
            .write(&header, b"Hello, RTP!", &Attributes::new())
            .unwrap();
        assert_eq!(n, 12 + 11);

        let mut buf = [0u8; 1500];
        for _ in 0..10 {
            match receiver.recv_from(&mut buf) {
                Ok((n, _addr)) => {
                    let packet = RtpPacket::from_bytes(&buf[..n]).unwrap();
                    assert_eq!(packet.header, header);
                    assert_eq!(&packet.payload[..], b"Hello, RTP!");
                    return;
                }
                Err(e) if e.is_would_block() => std::thread::sleep(Duration::from_millis(10)),
                Err(e) => panic!("receive failed: {}", e),
            }
        }
        panic!("Failed to receive data");
    }
}
