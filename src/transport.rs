//! Byte-stream abstractions used by the codec (§4.2 of the protocol spec).
//!
//! Two concrete transports share one capability set (`WireRead`/`WireWrite`):
//! a reliable, ordered TCP stream for server↔client traffic, and a bounded
//! UDP datagram endpoint for client↔frontend traffic. Both are "fail loud":
//! a short read or write is a hard [`TransportError`], never a partial
//! result, and `close()` from another thread unblocks any in-progress read.

use crate::error::TransportError;
use bytes::{Buf, BufMut, BytesMut};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const MAX_DATAGRAM: usize = 65535;

/// Capability set both transports provide: reading primitives byte-exact,
/// failing hard if the requested length isn't available.
pub trait WireRead {
    fn read_u8(&mut self) -> Result<u8, TransportError>;
    fn read_u16(&mut self) -> Result<u16, TransportError>;
    fn read_u32(&mut self) -> Result<u32, TransportError>;
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, TransportError>;
}

pub trait WireWrite {
    fn write_u8(&mut self, v: u8) -> Result<(), TransportError>;
    fn write_u16(&mut self, v: u16) -> Result<(), TransportError>;
    fn write_u32(&mut self, v: u32) -> Result<(), TransportError>;
    fn write_bytes(&mut self, b: &[u8]) -> Result<(), TransportError>;
    /// Commit buffered writes to the wire. A no-op for transports that write
    /// eagerly; mandatory before a datagram transport's payload is sent.
    fn flush(&mut self) -> Result<(), TransportError>;
}

// ── Reliable stream transport (TCP) ──────────────────────────────────────

/// One TCP connection, Nagle disabled, parsed as a continuous sequence of
/// tagged messages with no framing beyond what the codec imposes.
pub struct StreamTransport {
    stream: TcpStream,
    closed: Arc<AtomicBool>,
}

impl StreamTransport {
    pub fn new(stream: TcpStream) -> std::io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream, closed: Arc::new(AtomicBool::new(false)) })
    }

    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    /// A cheap handle that can close this transport from another thread.
    pub fn closer(&self) -> StreamCloser {
        StreamCloser { stream: self.stream.try_clone().expect("tcp clone"), closed: Arc::clone(&self.closed) }
    }

    fn check_closed(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// A handle capable of closing a [`StreamTransport`] from a different
/// thread than the one blocked on a read/write.
pub struct StreamCloser {
    stream: TcpStream,
    closed: Arc<AtomicBool>,
}

impl StreamCloser {
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl WireRead for StreamTransport {
    fn read_u8(&mut self) -> Result<u8, TransportError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, TransportError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, TransportError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        self.check_closed()?;
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).map_err(|e| {
            if self.closed.load(Ordering::Acquire) {
                TransportError::Closed
            } else {
                TransportError::Io(e)
            }
        })?;
        Ok(buf)
    }
}

impl WireWrite for StreamTransport {
    fn write_u8(&mut self, v: u8) -> Result<(), TransportError> {
        self.write_bytes(&[v])
    }

    fn write_u16(&mut self, v: u16) -> Result<(), TransportError> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_u32(&mut self, v: u32) -> Result<(), TransportError> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_bytes(&mut self, b: &[u8]) -> Result<(), TransportError> {
        self.check_closed()?;
        self.stream.write_all(b).map_err(|e| {
            if self.closed.load(Ordering::Acquire) {
                TransportError::Closed
            } else {
                TransportError::Io(e)
            }
        })
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.check_closed()?;
        self.stream.flush().map_err(TransportError::Io)
    }
}

// ── Datagram transport (UDP) ─────────────────────────────────────────────

/// One bound UDP socket used in a single logical direction. Writes buffer
/// an outgoing message and send it as a single datagram on `flush`. Reads
/// stage one received datagram at a time; `has_more` tells the caller
/// whether the staged datagram still has unread trailing bytes.
pub struct DatagramTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    /// The currently staged datagram; `Buf::advance` drives the read
    /// cursor as primitives are consumed, so unread trailing bytes are
    /// just whatever remains in the buffer.
    read_buf: BytesMut,
    write_buf: BytesMut,
    closed: Arc<AtomicBool>,
}

impl DatagramTransport {
    pub fn new(socket: UdpSocket, peer: SocketAddr) -> Self {
        Self {
            socket,
            peer,
            read_buf: BytesMut::new(),
            write_buf: BytesMut::with_capacity(256),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn closer(&self) -> DatagramCloser {
        DatagramCloser { socket: self.socket.try_clone().expect("udp clone"), closed: Arc::clone(&self.closed) }
    }

    fn check_closed(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    /// True if the currently staged datagram has unread trailing bytes.
    pub fn has_more(&self) -> bool {
        self.read_buf.has_remaining()
    }

    /// Block for the next datagram, replacing the staged buffer and
    /// resetting the read cursor. Only call this once the previous
    /// datagram has been fully consumed (or deliberately discarded).
    pub fn receive_next(&mut self) -> Result<SocketAddr, TransportError> {
        self.check_closed()?;
        let mut buf = [0u8; MAX_DATAGRAM];
        let (n, from) = self.socket.recv_from(&mut buf).map_err(|e| {
            if self.closed.load(Ordering::Acquire) {
                TransportError::Closed
            } else {
                TransportError::Io(e)
            }
        })?;
        self.read_buf = BytesMut::from(&buf[..n]);
        Ok(from)
    }

    /// Discard any unread bytes of the currently staged datagram.
    pub fn discard_rest(&mut self) {
        self.read_buf.clear();
    }

    fn require(&self, len: usize) -> Result<(), TransportError> {
        self.check_closed()?;
        if self.read_buf.remaining() < len {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "short datagram",
            )));
        }
        Ok(())
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// A handle capable of unblocking a [`DatagramTransport::receive_next`]
/// call in progress on another thread.
pub struct DatagramCloser {
    socket: UdpSocket,
    closed: Arc<AtomicBool>,
}

impl DatagramCloser {
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // A zero-length datagram to ourselves unblocks the pending recv_from.
        if let Ok(local) = self.socket.local_addr() {
            let _ = self.socket.send_to(&[], local);
        }
    }
}

impl WireRead for DatagramTransport {
    fn read_u8(&mut self) -> Result<u8, TransportError> {
        self.require(1)?;
        Ok(self.read_buf.get_u8())
    }

    // `bytes::Buf::get_u16`/`get_u32` read big-endian by default, matching
    // the wire format (§4.1).
    fn read_u16(&mut self) -> Result<u16, TransportError> {
        self.require(2)?;
        Ok(self.read_buf.get_u16())
    }

    fn read_u32(&mut self) -> Result<u32, TransportError> {
        self.require(4)?;
        Ok(self.read_buf.get_u32())
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        self.require(len)?;
        Ok(self.read_buf.copy_to_bytes(len).to_vec())
    }
}

impl WireWrite for DatagramTransport {
    fn write_u8(&mut self, v: u8) -> Result<(), TransportError> {
        self.write_bytes(&[v])
    }

    fn write_u16(&mut self, v: u16) -> Result<(), TransportError> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_u32(&mut self, v: u32) -> Result<(), TransportError> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_bytes(&mut self, b: &[u8]) -> Result<(), TransportError> {
        if self.write_buf.len() + b.len() > MAX_DATAGRAM {
            return Err(TransportError::DatagramTooLarge { max: MAX_DATAGRAM });
        }
        self.write_buf.put_slice(b);
        Ok(())
    }

    /// Send the buffered payload as a single datagram and reset the cursor.
    fn flush(&mut self) -> Result<(), TransportError> {
        self.check_closed()?;
        self.socket.send_to(&self.write_buf, self.peer).map_err(TransportError::Io)?;
        self.write_buf.clear();
        Ok(())
    }
}

/// A sealed tagged union over the two transport kinds, so a single call
/// site (e.g. the codec's message encoders) can stay generic over "some
/// wire endpoint" without dynamic dispatch.
pub enum Transport {
    Stream(StreamTransport),
    Datagram(DatagramTransport),
}

impl WireRead for Transport {
    fn read_u8(&mut self) -> Result<u8, TransportError> {
        match self {
            Transport::Stream(t) => t.read_u8(),
            Transport::Datagram(t) => t.read_u8(),
        }
    }

    fn read_u16(&mut self) -> Result<u16, TransportError> {
        match self {
            Transport::Stream(t) => t.read_u16(),
            Transport::Datagram(t) => t.read_u16(),
        }
    }

    fn read_u32(&mut self) -> Result<u32, TransportError> {
        match self {
            Transport::Stream(t) => t.read_u32(),
            Transport::Datagram(t) => t.read_u32(),
        }
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        match self {
            Transport::Stream(t) => t.read_bytes(len),
            Transport::Datagram(t) => t.read_bytes(len),
        }
    }
}

impl WireWrite for Transport {
    fn write_u8(&mut self, v: u8) -> Result<(), TransportError> {
        match self {
            Transport::Stream(t) => t.write_u8(v),
            Transport::Datagram(t) => t.write_u8(v),
        }
    }

    fn write_u16(&mut self, v: u16) -> Result<(), TransportError> {
        match self {
            Transport::Stream(t) => t.write_u16(v),
            Transport::Datagram(t) => t.write_u16(v),
        }
    }

    fn write_u32(&mut self, v: u32) -> Result<(), TransportError> {
        match self {
            Transport::Stream(t) => t.write_u32(v),
            Transport::Datagram(t) => t.write_u32(v),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) -> Result<(), TransportError> {
        match self {
            Transport::Stream(t) => t.write_bytes(b),
            Transport::Datagram(t) => t.write_bytes(b),
        }
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        match self {
            Transport::Stream(t) => t.flush(),
            Transport::Datagram(t) => t.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udp_pair() -> (UdpSocket, UdpSocket) {
        let a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").unwrap();
        (a, b)
    }

    #[test]
    fn datagram_roundtrip_big_endian() {
        let (sock_a, sock_b) = udp_pair();
        let addr_b = sock_b.local_addr().unwrap();
        let addr_a = sock_a.local_addr().unwrap();

        let mut writer = DatagramTransport::new(sock_a, addr_b);
        writer.write_u8(0x12).unwrap();
        writer.write_u16(0x3456).unwrap();
        writer.write_u32(0x789abcde).unwrap();
        writer.write_bytes(&[1, 2, 3]).unwrap();
        writer.flush().unwrap();

        let mut reader = DatagramTransport::new(sock_b, addr_a);
        reader.receive_next().unwrap();
        assert_eq!(reader.read_u8().unwrap(), 0x12);
        assert_eq!(reader.read_u16().unwrap(), 0x3456);
        assert_eq!(reader.read_u32().unwrap(), 0x789abcde);
        assert_eq!(reader.read_bytes(3).unwrap(), vec![1, 2, 3]);
        assert!(!reader.has_more());
    }

    #[test]
    fn datagram_short_read_is_an_error() {
        let (sock_a, sock_b) = udp_pair();
        let addr_b = sock_b.local_addr().unwrap();
        let addr_a = sock_a.local_addr().unwrap();

        let mut writer = DatagramTransport::new(sock_a, addr_b);
        writer.write_u8(0xff).unwrap();
        writer.flush().unwrap();

        let mut reader = DatagramTransport::new(sock_b, addr_a);
        reader.receive_next().unwrap();
        assert!(reader.read_u32().is_err());
    }

    #[test]
    fn datagram_write_over_max_size_rejected() {
        let (sock_a, sock_b) = udp_pair();
        let addr_b = sock_b.local_addr().unwrap();
        let mut writer = DatagramTransport::new(sock_a, addr_b);
        let oversized = vec![0u8; MAX_DATAGRAM + 1];
        assert!(matches!(
            writer.write_bytes(&oversized),
            Err(TransportError::DatagramTooLarge { .. })
        ));
    }

    #[test]
    fn stream_roundtrip_big_endian() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();

        let mut writer = StreamTransport::new(client).unwrap();
        writer.write_u16(0xabcd).unwrap();
        writer.write_bytes(&[9, 8, 7]).unwrap();
        writer.flush().unwrap();

        let mut reader = StreamTransport::new(server).unwrap();
        assert_eq!(reader.read_u16().unwrap(), 0xabcd);
        assert_eq!(reader.read_bytes(3).unwrap(), vec![9, 8, 7]);
    }

    #[test]
    fn stream_closer_unblocks_pending_read() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();

        let reader = StreamTransport::new(server).unwrap();
        let closer = reader.closer();
        let handle = std::thread::spawn(move || {
            let mut reader = reader;
            reader.read_u8()
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        closer.close();
        drop(client);

        let result = handle.join().unwrap();
        assert!(result.is_err());
    }
}
