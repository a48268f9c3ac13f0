//! Top-level error type surfaced to `main`.
//!
//! Grounded on `bt_client/client.rs`'s `BtClientError`: a flat enum wrapping
//! each subsystem's own error type, with a hand-written `Display` for the one
//! place a human reads it (the CLI's final error line).

use std::fmt;

use crate::metainfo::MetainfoError;
use crate::storage::piece_storage::StorageError;

#[derive(Debug)]
pub enum ClientError {
    Usage(String),
    Metainfo(MetainfoError),
    Storage(StorageError),
    NoPeersDiscovered,
    /// The queue never drained and endgame made no further progress after
    /// the retry budget ran out; carries the indices still missing.
    IncompleteDownload(Vec<u32>),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Usage(message) => write!(f, "usage error: {message}"),
            ClientError::Metainfo(err) => write!(f, "could not load torrent: {err:?}"),
            ClientError::Storage(err) => write!(f, "storage error: {err:?}"),
            ClientError::NoPeersDiscovered => write!(f, "no peers discovered from any tracker"),
            ClientError::IncompleteDownload(missing) => {
                write!(f, "download incomplete: {} piece(s) missing", missing.len())
            }
        }
    }
}

impl From<MetainfoError> for ClientError {
    fn from(err: MetainfoError) -> Self {
        ClientError::Metainfo(err)
    }
}

impl From<StorageError> for ClientError {
    fn from(err: StorageError) -> Self {
        ClientError::Storage(err)
    }
}
