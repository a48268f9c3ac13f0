//! Tracker clients: HTTP (BEP-3) and UDP (BEP-15).
//!
//! Grounded on the teacher's `tracker::http_tracker`/`tracker::udp_tracker`
//! pair for the query-string shape and bencoded response fields; the UDP
//! connect/announce two-step follows
//! `original_source/src/tracker/UdpTracker.cpp`'s wire format where the
//! teacher's own version was incomplete.

pub mod error;
pub mod http;
pub mod peer_addr;
pub mod udp;

pub use error::TrackerError;
pub use peer_addr::PeerAddr;
