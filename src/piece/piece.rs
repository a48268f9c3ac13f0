//! A piece in progress: its blocks, their fetch state, and hash validation.
//!
//! Grounded on `original_source/src/core/Piece.cpp`. `save_block` mirrors
//! `Piece::SaveBlock`'s two failure modes exactly (`UnknownOffset` for
//! `"Block not found at offset"`, `UnexpectedBlock` for `"is not in pending
//! state"`), since the original throws rather than silently ignoring both.

use crate::byte_tools::sha1;
use crate::piece::block::{Block, BlockStatus, BLOCK_SIZE};

#[derive(Debug, PartialEq, Eq)]
pub enum PieceError {
    /// `save_block` named an offset that doesn't correspond to any block.
    UnknownOffset(u64),
    /// `save_block` named a block that is not currently `Pending` (already
    /// retrieved, or never requested).
    UnexpectedBlock(u64),
}

#[derive(Debug, Clone)]
pub struct Piece {
    pub index: u32,
    pub length: u64,
    pub hash: [u8; 20],
    blocks: Vec<Block>,
}

impl Piece {
    /// Partitions `length` bytes into fixed-size blocks, the last one
    /// possibly shorter.
    pub fn new(index: u32, length: u64, hash: [u8; 20]) -> Self {
        let mut blocks = Vec::new();
        let mut offset = 0;
        while offset < length {
            let block_length = BLOCK_SIZE.min(length - offset);
            blocks.push(Block::new(offset, block_length));
            offset += block_length;
        }
        Piece {
            index,
            length,
            hash,
            blocks,
        }
    }

    /// Marks the first `Missing` block `Pending` and returns it, or `None`
    /// if every block has already been requested or retrieved.
    pub fn take_next_missing_block(&mut self) -> Option<(u64, u64)> {
        let block = self
            .blocks
            .iter_mut()
            .find(|block| block.status == BlockStatus::Missing)?;
        block.status = BlockStatus::Pending;
        Some((block.offset, block.length))
    }

    /// Records the bytes received for the block at `offset`.
    pub fn save_block(&mut self, offset: u64, data: Vec<u8>) -> Result<(), PieceError> {
        let block = self
            .blocks
            .iter_mut()
            .find(|block| block.offset == offset)
            .ok_or(PieceError::UnknownOffset(offset))?;

        if block.status != BlockStatus::Pending {
            return Err(PieceError::UnexpectedBlock(offset));
        }

        block.data = data;
        block.status = BlockStatus::Retrieved;
        Ok(())
    }

    pub fn all_retrieved(&self) -> bool {
        self.blocks
            .iter()
            .all(|block| block.status == BlockStatus::Retrieved)
    }

    pub fn is_downloading(&self) -> bool {
        self.blocks
            .iter()
            .any(|block| block.status == BlockStatus::Pending)
    }

    /// Concatenated block data, in offset order. Only meaningful once
    /// `all_retrieved()` is true; missing blocks contribute zero bytes.
    pub fn data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length as usize);
        for block in &self.blocks {
            if block.status == BlockStatus::Retrieved {
                out.extend_from_slice(&block.data);
            } else {
                out.extend(std::iter::repeat(0u8).take(block.length as usize));
            }
        }
        out
    }

    /// Compares the SHA-1 of all retrieved block data against the expected
    /// hash. Returns `false` if any block is still missing.
    pub fn hash_matches(&self) -> bool {
        self.all_retrieved() && sha1(&self.data()) == self.hash
    }

    /// Clears all blocks back to `Missing`, discarding any retrieved data.
    pub fn reset(&mut self) {
        for block in &mut self.blocks {
            block.status = BlockStatus::Missing;
            block.data.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn piece_with_two_blocks() -> Piece {
        Piece::new(0, (BLOCK_SIZE * 2) as u64, [0u8; 20])
    }

    #[test]
    fn partitions_into_fixed_size_blocks_with_short_tail() {
        let piece = Piece::new(0, BLOCK_SIZE + 100, [0u8; 20]);
        assert_eq!(piece.blocks.len(), 2);
        assert_eq!(piece.blocks[0].length, BLOCK_SIZE);
        assert_eq!(piece.blocks[1].length, 100);
    }

    #[test]
    fn take_next_missing_block_is_idempotent_in_order() {
        let mut piece = piece_with_two_blocks();
        let (first_offset, _) = piece.take_next_missing_block().unwrap();
        assert_eq!(first_offset, 0);
        let (second_offset, _) = piece.take_next_missing_block().unwrap();
        assert_eq!(second_offset, BLOCK_SIZE);
        assert!(piece.take_next_missing_block().is_none());
    }

    #[test]
    fn save_block_rejects_unknown_offset() {
        let mut piece = piece_with_two_blocks();
        let result = piece.save_block(999, vec![1, 2, 3]);
        assert_eq!(result, Err(PieceError::UnknownOffset(999)));
    }

    #[test]
    fn save_block_rejects_block_not_pending() {
        let mut piece = piece_with_two_blocks();
        // Never requested, so it is still Missing, not Pending.
        let result = piece.save_block(0, vec![1, 2, 3]);
        assert_eq!(result, Err(PieceError::UnexpectedBlock(0)));
    }

    #[test]
    fn save_block_twice_is_rejected() {
        let mut piece = piece_with_two_blocks();
        piece.take_next_missing_block().unwrap();
        piece.save_block(0, vec![0u8; BLOCK_SIZE as usize]).unwrap();
        let result = piece.save_block(0, vec![0u8; BLOCK_SIZE as usize]);
        assert_eq!(result, Err(PieceError::UnexpectedBlock(0)));
    }

    #[test]
    fn hash_matches_requires_all_blocks_retrieved() {
        let data = b"0123456789abcdef";
        let hash = sha1(data);
        let mut piece = Piece::new(0, data.len() as u64, hash);
        assert!(!piece.hash_matches());

        let (offset, length) = piece.take_next_missing_block().unwrap();
        piece
            .save_block(offset, data[offset as usize..(offset + length) as usize].to_vec())
            .unwrap();
        assert!(piece.hash_matches());
    }

    #[test]
    fn reset_clears_progress() {
        let mut piece = piece_with_two_blocks();
        piece.take_next_missing_block().unwrap();
        piece
            .save_block(0, vec![0u8; BLOCK_SIZE as usize])
            .unwrap();
        piece.reset();
        assert!(!piece.all_retrieved());
        assert!(!piece.is_downloading());
        let (offset, _) = piece.take_next_missing_block().unwrap();
        assert_eq!(offset, 0);
    }
}
