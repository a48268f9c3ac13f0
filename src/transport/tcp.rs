//! Blocking, length-prefixed TCP transport for the peer wire protocol.
//!
//! Grounded on `peer_session.rs`'s direct use of `TcpStream` with explicit
//! read/write timeouts; the framing and the cooperative `close()` flag are
//! new here since the teacher never needed to interrupt an in-flight read
//! from another thread.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Frames larger than this are treated as malicious and rejected outright.
const MAX_FRAME_LEN: u32 = 100 * 1024;

#[derive(Debug)]
pub enum TransportError {
    ConnectTimeout,
    ReadTimeout,
    ConnectionClosed,
    FrameTooLarge(u32),
    Io(io::Error),
}

/// A connected TCP socket plus a cooperative close flag.
///
/// `close()` can be called from a different thread than the one blocked in
/// `read_exact`/`read_frame`; it shuts the socket down in both directions so
/// that blocked read returns promptly with `ConnectionClosed`.
pub struct TcpTransport {
    stream: TcpStream,
    terminated: AtomicBool,
}

impl TcpTransport {
    /// Connects to `addr`, failing with `ConnectTimeout` if the connect
    /// itself does not complete within `connect_timeout`.
    pub fn connect(addr: SocketAddr, connect_timeout: Duration) -> Result<Self, TransportError> {
        let stream = TcpStream::connect_timeout(&addr, connect_timeout)
            .map_err(|_| TransportError::ConnectTimeout)?;
        Ok(TcpTransport {
            stream,
            terminated: AtomicBool::new(false),
        })
    }

    /// Sets the read and write timeouts used by every subsequent I/O call.
    pub fn set_timeouts(&self, timeout: Duration) -> Result<(), TransportError> {
        self.stream
            .set_read_timeout(Some(timeout))
            .map_err(TransportError::Io)?;
        self.stream
            .set_write_timeout(Some(timeout))
            .map_err(TransportError::Io)?;
        Ok(())
    }

    /// Writes `data` in full.
    ///
    /// Takes `&self`: like the standard library, `TcpStream` supports
    /// concurrent I/O through a shared reference, which lets a session share
    /// one transport (via `Arc`) between its driving thread and whichever
    /// thread calls `close()`.
    pub fn write_all(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        (&self.stream).write_all(data).map_err(map_io_error)
    }

    /// Reads exactly `len` bytes. Used for the fixed-length handshake.
    pub fn read_exact(&self, len: usize) -> Result<Vec<u8>, TransportError> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        let mut buf = vec![0u8; len];
        (&self.stream).read_exact(&mut buf).map_err(map_io_error)?;
        Ok(buf)
    }

    /// Reads one length-prefixed frame: a 4-byte big-endian length, then
    /// that many additional bytes. An empty frame (length 0, a keep-alive)
    /// is returned as an empty vector.
    pub fn read_frame(&self) -> Result<Vec<u8>, TransportError> {
        let len_bytes = self.read_exact(4)?;
        let len = crate::byte_tools::bytes_to_u32(&len_bytes).ok_or(TransportError::Io(
            io::Error::new(io::ErrorKind::UnexpectedEof, "short length prefix"),
        ))?;
        if len > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(len));
        }
        if len == 0 {
            return Ok(Vec::new());
        }
        self.read_exact(len as usize)
    }

    /// Marks the transport terminated and shuts the socket down in both
    /// directions, unblocking any in-flight read from another thread.
    pub fn close(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    pub fn is_closed(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

fn map_io_error(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::ReadTimeout,
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => TransportError::ConnectionClosed,
        _ => TransportError::Io(err),
    }
}
