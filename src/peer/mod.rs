pub mod bitfield;
pub mod handshake;
pub mod session;
pub mod wire;
