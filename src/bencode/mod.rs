//! Bencode decoding.
//!
//! The decoder walks the input once and produces a flat, ordered stream of
//! byte-string tokens: every bencoded string contributes its raw bytes,
//! every integer contributes its decimal ASCII representation, and list/dict
//! entries are appended in encounter order with no structural markers. The
//! caller walks the resulting slice by key name (see [`find_value`]) the same
//! way the original C++ parser this was ported from does.
//!
//! While walking, the decoder also records the byte offsets of the `info`
//! dictionary's raw encoding (as it appeared on the wire), so the info-hash
//! can be computed as SHA-1 of that exact slice rather than of a
//! re-serialized copy.

mod decoder;

pub use decoder::{decode, find_value, piece_hashes, Decoded, BencodeError};
