//! `TorrentMeta` — the immutable view of a parsed `.torrent` file.
//!
//! Grounded on the original `LoadTorrentFile` / `TorrentFile` pair: walk the
//! flat bencode token stream for the handful of keys that matter and hash the
//! raw `info` dictionary bytes for the info-hash.

use std::fs;
use std::path::Path;

use crate::bencode::{self, BencodeError};
use crate::byte_tools;

/// Immutable metadata derived from a `.torrent` file.
#[derive(Debug, Clone)]
pub struct TorrentMeta {
    pub name: String,
    pub total_length: u64,
    pub piece_length: u64,
    pub piece_hashes: Vec<[u8; 20]>,
    pub info_hash: [u8; 20],
    pub announce_url: String,
}

#[derive(Debug)]
pub enum MetainfoError {
    Io(std::io::Error),
    Decode(BencodeError),
    MissingField(&'static str),
    InvalidField(&'static str),
    PieceCountMismatch { expected: usize, actual: usize },
}

impl TorrentMeta {
    /// Loads and validates a `.torrent` file from disk.
    pub fn load(path: &Path) -> Result<Self, MetainfoError> {
        let raw = fs::read(path).map_err(MetainfoError::Io)?;
        Self::parse(&raw)
    }

    /// Parses an already-read `.torrent` file's raw bytes.
    pub fn parse(raw: &[u8]) -> Result<Self, MetainfoError> {
        let decoded = bencode::decode(raw).map_err(MetainfoError::Decode)?;
        let tokens = &decoded.tokens;

        let announce_url = utf8_field(tokens, b"announce")?;
        let name = utf8_field(tokens, b"name")?;
        let piece_length = numeric_field(tokens, b"piece length")?;
        let total_length = numeric_field(tokens, b"length")?;

        let pieces_blob = bencode::find_value(tokens, b"pieces")
            .ok_or(MetainfoError::MissingField("pieces"))?;
        let piece_hashes = bencode::piece_hashes(pieces_blob);

        let expected_piece_count = div_ceil(total_length, piece_length);
        if piece_hashes.len() != expected_piece_count as usize {
            return Err(MetainfoError::PieceCountMismatch {
                expected: expected_piece_count as usize,
                actual: piece_hashes.len(),
            });
        }

        let (start, end) = decoded
            .info_span
            .ok_or(MetainfoError::MissingField("info"))?;
        let info_hash = byte_tools::sha1(&raw[start..end]);

        Ok(TorrentMeta {
            name,
            total_length,
            piece_length,
            piece_hashes,
            info_hash,
            announce_url,
        })
    }

    /// Length in bytes of piece `index`, accounting for a shorter final piece.
    pub fn piece_length_for(&self, index: usize) -> u64 {
        let last_index = self.piece_hashes.len() - 1;
        if index != last_index {
            return self.piece_length;
        }
        let remainder = self.total_length % self.piece_length;
        if remainder == 0 {
            self.piece_length
        } else {
            remainder
        }
    }
}

fn div_ceil(numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        0
    } else {
        (numerator + denominator - 1) / denominator
    }
}

fn utf8_field(tokens: &[Vec<u8>], key: &[u8]) -> Result<String, MetainfoError> {
    let key_name = std::str::from_utf8(key).unwrap_or("<non-utf8 key>");
    let raw = bencode::find_value(tokens, key).ok_or({
        // leak-free: field name is always a 'static str literal at call sites below
        MetainfoError::MissingField(leak_key_name(key_name))
    })?;
    String::from_utf8(raw.to_vec()).map_err(|_| MetainfoError::InvalidField(leak_key_name(key_name)))
}

fn numeric_field(tokens: &[Vec<u8>], key: &[u8]) -> Result<u64, MetainfoError> {
    let key_name = std::str::from_utf8(key).unwrap_or("<non-utf8 key>");
    let raw = bencode::find_value(tokens, key).ok_or(MetainfoError::MissingField(leak_key_name(key_name)))?;
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(MetainfoError::InvalidField(leak_key_name(key_name)))
}

/// The error variants only ever carry one of the handful of field names used
/// at the call sites above; mapping each back to its own `'static str`
/// literal avoids needing an owned-`String` error variant for this closed set.
fn leak_key_name(name: &str) -> &'static str {
    match name {
        "announce" => "announce",
        "name" => "name",
        "piece length" => "piece length",
        "length" => "length",
        "pieces" => "pieces",
        "info" => "info",
        _ => "<unknown field>",
    }
}
