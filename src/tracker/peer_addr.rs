use std::net::Ipv4Addr;

/// A peer as advertised by a tracker: an IPv4 address and a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerAddr {
    /// Parses one compact peer entry: 4 bytes of IPv4, then a big-endian port.
    pub fn from_compact_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 6 {
            return None;
        }
        let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        let port = u16::from_be_bytes([bytes[4], bytes[5]]);
        Some(PeerAddr { ip, port })
    }

    /// Parses a `peers` blob in BEP-3 compact form into one entry per 6
    /// bytes. `None` if the blob's length is not a multiple of 6 — a
    /// malformed tracker response, not a partial entry to drop silently.
    pub fn parse_compact_list(blob: &[u8]) -> Option<Vec<Self>> {
        if blob.len() % 6 != 0 {
            return None;
        }
        blob.chunks_exact(6).map(Self::from_compact_bytes).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_compact_peer() {
        let bytes = [127, 0, 0, 1, 0x1A, 0xE1];
        let peer = PeerAddr::from_compact_bytes(&bytes).unwrap();
        assert_eq!(peer.ip, Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(peer.port, 6881);
    }

    #[test]
    fn parses_a_list_of_compact_peers() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&[127, 0, 0, 1, 0x1A, 0xE1]);
        blob.extend_from_slice(&[10, 0, 0, 2, 0x1A, 0xE2]);
        let peers = PeerAddr::parse_compact_list(&blob).unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[1].ip, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(peers[1].port, 6882);
    }

    #[test]
    fn trailing_partial_entry_is_malformed() {
        let blob = [127, 0, 0, 1, 0x1A]; // 5 bytes, not a full entry
        assert!(PeerAddr::parse_compact_list(&blob).is_none());
    }
}
