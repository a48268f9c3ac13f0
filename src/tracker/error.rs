use crate::bencode::BencodeError;
use crate::transport::TransportError;

/// Errors a tracker announce (HTTP or UDP) can fail with.
#[derive(Debug)]
pub enum TrackerError {
    Transport(TransportError),
    Http(reqwest::Error),
    Decode(BencodeError),
    /// The tracker's own `failure reason` field, surfaced verbatim.
    TrackerFailure(String),
    MalformedResponse(&'static str),
    /// A UDP response's `action` field didn't match what was requested, or
    /// its `transaction_id` didn't match the one just sent.
    ProtocolMismatch,
}

impl From<TransportError> for TrackerError {
    fn from(err: TransportError) -> Self {
        TrackerError::Transport(err)
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        TrackerError::Http(err)
    }
}
