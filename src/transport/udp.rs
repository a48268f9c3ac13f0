//! Connected-datagram UDP transport used by the BEP-15 tracker client.
//!
//! The teacher never speaks UDP; this is built from scratch in the same
//! blocking, timeout-driven style as [`super::tcp::TcpTransport`], since the
//! UDP tracker protocol is strictly request-then-single-response.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use super::TransportError;

/// A UDP socket bound to an ephemeral local port and connected to one peer
/// address, so `send`/`recv` always talk to that single remote.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(TransportError::Io)?;
        socket.connect(addr).map_err(TransportError::Io)?;
        socket
            .set_read_timeout(Some(timeout))
            .map_err(TransportError::Io)?;
        socket
            .set_write_timeout(Some(timeout))
            .map_err(TransportError::Io)?;
        Ok(UdpTransport { socket })
    }

    pub fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.socket.send(data).map_err(map_io_error)?;
        Ok(())
    }

    /// Sends `request` and waits for a single reply datagram, up to
    /// `max_len` bytes.
    pub fn send_and_receive(
        &self,
        request: &[u8],
        max_len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        self.send(request)?;
        let mut buf = vec![0u8; max_len];
        let received = self.socket.recv(&mut buf).map_err(map_io_error)?;
        buf.truncate(received);
        Ok(buf)
    }
}

fn map_io_error(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::ReadTimeout,
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused => {
            TransportError::ConnectionClosed
        }
        _ => TransportError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn round_trips_a_datagram() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        let responder = thread::spawn(move || {
            let mut buf = [0u8; 64];
            let (len, from) = server.recv_from(&mut buf).unwrap();
            server.send_to(&buf[..len], from).unwrap();
        });

        let transport = UdpTransport::connect(server_addr, Duration::from_secs(1)).unwrap();
        let reply = transport
            .send_and_receive(b"ping", 64)
            .expect("reply received");
        assert_eq!(reply, b"ping");

        responder.join().unwrap();
    }

    #[test]
    fn times_out_when_nothing_replies() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();
        // Never reply.

        let transport = UdpTransport::connect(server_addr, Duration::from_millis(100)).unwrap();
        let result = transport.send_and_receive(b"ping", 64);
        assert!(matches!(result, Err(TransportError::ReadTimeout)));
    }
}
