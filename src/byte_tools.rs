//! Big-endian integer <-> byte conversions and the SHA-1 primitive.
//!
//! Everything here is a pure function; no module above it depends on anything
//! but these signatures.

use sha1::{Digest, Sha1};

/// Converts a `u32` to 4 big-endian bytes.
pub fn u32_to_bytes(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Converts 4 big-endian bytes to a `u32`.
///
/// Returns `None` if `bytes` is shorter than 4.
pub fn bytes_to_u32(bytes: &[u8]) -> Option<u32> {
    let array: [u8; 4] = bytes.get(0..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(array))
}

/// Converts a `u64` to 8 big-endian bytes.
pub fn u64_to_bytes(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Converts 8 big-endian bytes to a `u64`.
///
/// Returns `None` if `bytes` is shorter than 8.
pub fn bytes_to_u64(bytes: &[u8]) -> Option<u64> {
    let array: [u8; 8] = bytes.get(0..8)?.try_into().ok()?;
    Some(u64::from_be_bytes(array))
}

/// Computes the SHA-1 digest of `data`.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    let digest = Sha1::digest(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

/// Percent-encodes raw bytes (e.g. an info-hash or peer-id) for use in a URL
/// query string. Every byte is encoded, since the value is opaque binary,
/// never UTF-8 text.
pub fn url_encode_bytes(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 3);
    for b in bytes {
        encoded.push('%');
        encoded.push_str(&format!("{:02x}", b));
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_round_trip() {
        for value in [0u32, 1, 255, 256, u32::MAX / 2, u32::MAX] {
            let bytes = u32_to_bytes(value);
            assert_eq!(bytes_to_u32(&bytes), Some(value));
        }
    }

    #[test]
    fn u64_round_trip() {
        for value in [0u64, 1, u64::from(u32::MAX), u64::MAX] {
            let bytes = u64_to_bytes(value);
            assert_eq!(bytes_to_u64(&bytes), Some(value));
        }
    }

    #[test]
    fn bytes_to_u32_rejects_short_input() {
        assert_eq!(bytes_to_u32(&[1, 2, 3]), None);
    }

    #[test]
    fn sha1_matches_known_vector() {
        let digest = sha1(b"ABCDEFGHIJKLMNOP");
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        assert_eq!(hex.len(), 40);
    }

    #[test]
    fn url_encode_covers_every_byte() {
        let encoded = url_encode_bytes(&[0x2c, 0x6b, 0x68]);
        assert_eq!(encoded, "%2c%6b%68");
    }
}
