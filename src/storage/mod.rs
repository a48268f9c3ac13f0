//! The piece work-queue and the single-file writer it drains into.

pub mod piece_storage;

pub use piece_storage::{PieceStorage, StorageError};
