//! Blocking network transports.
//!
//! Both the TCP peer-wire transport and the UDP tracker transport share the
//! same discipline: connect (or associate) with a bounded timeout, then set
//! read/write timeouts on the resulting socket before any data crosses it.

pub mod tcp;
pub mod udp;

pub use tcp::{TcpTransport, TransportError};
pub use udp::UdpTransport;
