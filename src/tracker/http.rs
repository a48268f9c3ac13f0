//! BEP-3 HTTP tracker announce.
//!
//! Grounded on the teacher's `tracker::http_tracker` module for the
//! query-string shape and the bencoded fields pulled out of the reply; uses
//! `reqwest::blocking`, the same HTTP client the teacher depends on.

use std::time::Duration;

use crate::bencode;
use crate::byte_tools::url_encode_bytes;
use crate::tracker::{peer_addr::PeerAddr, TrackerError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AnnounceRequest<'a> {
    pub announce_url: &'a str,
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub left: u64,
}

pub struct AnnounceResponse {
    pub interval: i64,
    pub peers: Vec<PeerAddr>,
}

/// Performs one HTTP announce and returns the tracker's peer list.
pub fn announce(request: &AnnounceRequest) -> Result<AnnounceResponse, TrackerError> {
    let url = format!(
        "{}?info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1",
        request.announce_url,
        url_encode_bytes(&request.info_hash),
        url_encode_bytes(&request.peer_id),
        request.port,
        request.left,
    );

    let client = reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(TOTAL_TIMEOUT)
        .build()?;

    let response = client.get(&url).send()?;
    let body = response.bytes()?;
    parse_announce_response(&body)
}

fn parse_announce_response(body: &[u8]) -> Result<AnnounceResponse, TrackerError> {
    let decoded = bencode::decode(body).map_err(TrackerError::Decode)?;
    let tokens = &decoded.tokens;

    if let Some(reason) = bencode::find_value(tokens, b"failure reason") {
        let message = String::from_utf8_lossy(reason).into_owned();
        return Err(TrackerError::TrackerFailure(message));
    }

    let interval = bencode::find_value(tokens, b"interval")
        .and_then(|raw| std::str::from_utf8(raw).ok())
        .and_then(|s| s.parse().ok())
        .ok_or(TrackerError::MalformedResponse("interval"))?;

    let peers_blob =
        bencode::find_value(tokens, b"peers").ok_or(TrackerError::MalformedResponse("peers"))?;
    let peers = PeerAddr::parse_compact_list(peers_blob)
        .ok_or(TrackerError::MalformedResponse("peers"))?;

    Ok(AnnounceResponse { interval, peers })
}
