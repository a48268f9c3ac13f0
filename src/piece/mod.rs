//! Piece and block bookkeeping.
//!
//! Grounded on `original_source/include/core/Piece.hpp` and its `.cpp`: a
//! piece is partitioned into fixed-size blocks up front, blocks transition
//! `Missing -> Pending -> Retrieved`, and the piece is hashed only once every
//! block has been retrieved.

pub mod block;
pub mod piece;

pub use block::{Block, BlockStatus};
pub use piece::{Piece, PieceError};
