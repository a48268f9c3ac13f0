//! The fixed 68-byte BitTorrent handshake.
//!
//! Grounded on `peer/message/handshake.rs`'s `Handshake` struct; extended
//! with a parser, since the teacher only ever built one to send and relied
//! on `peer_session.rs`'s ad-hoc byte slicing to read one back.

const PROTOCOL_NAME: &[u8] = b"BitTorrent protocol";
pub const HANDSHAKE_LEN: usize = 1 + PROTOCOL_NAME.len() + 8 + 20 + 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

#[derive(Debug)]
pub enum HandshakeError {
    WrongLength(usize),
    BadProtocolHeader,
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Handshake { info_hash, peer_id }
    }

    pub fn to_bytes(&self) -> [u8; HANDSHAKE_LEN] {
        let mut bytes = [0u8; HANDSHAKE_LEN];
        bytes[0] = PROTOCOL_NAME.len() as u8;
        bytes[1..1 + PROTOCOL_NAME.len()].copy_from_slice(PROTOCOL_NAME);
        // bytes[1+plen..1+plen+8] stays zeroed (reserved bytes).
        let info_hash_start = 1 + PROTOCOL_NAME.len() + 8;
        bytes[info_hash_start..info_hash_start + 20].copy_from_slice(&self.info_hash);
        bytes[info_hash_start + 20..info_hash_start + 40].copy_from_slice(&self.peer_id);
        bytes
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, HandshakeError> {
        if bytes.len() != HANDSHAKE_LEN {
            return Err(HandshakeError::WrongLength(bytes.len()));
        }
        if bytes[0] as usize != PROTOCOL_NAME.len()
            || &bytes[1..1 + PROTOCOL_NAME.len()] != PROTOCOL_NAME
        {
            return Err(HandshakeError::BadProtocolHeader);
        }

        let info_hash_start = 1 + PROTOCOL_NAME.len() + 8;
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&bytes[info_hash_start..info_hash_start + 20]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&bytes[info_hash_start + 20..info_hash_start + 40]);

        Ok(Handshake { info_hash, peer_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let handshake = Handshake::new([1u8; 20], [2u8; 20]);
        let bytes = handshake.to_bytes();
        assert_eq!(bytes.len(), 68);
        let parsed = Handshake::parse(&bytes).unwrap();
        assert_eq!(parsed, handshake);
    }

    #[test]
    fn rejects_wrong_length() {
        let result = Handshake::parse(&[0u8; 67]);
        assert!(matches!(result, Err(HandshakeError::WrongLength(67))));
    }

    #[test]
    fn rejects_bad_protocol_header() {
        let mut bytes = Handshake::new([0u8; 20], [0u8; 20]).to_bytes();
        bytes[0] = 18;
        let result = Handshake::parse(&bytes);
        assert!(matches!(result, Err(HandshakeError::BadProtocolHeader)));
    }
}
