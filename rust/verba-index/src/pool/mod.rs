//! Block pools backing the in-memory postings.
//!
//! Term text lives in a [`CharBlockPool`]; frequency, position and term-vector
//! streams live in [`ByteBlockPool`]s as chains of slices of growing size. All
//! pools draw their blocks from the shared [`IndexingContext`], which recycles
//! them between flushes and accounts for them against the RAM budget.

mod allocator;
mod block_pool;
mod slice;

pub use allocator::{BlockAllocator, IndexingContext};
pub use block_pool::{ByteBlockPool, CharBlockPool};
pub use slice::{ByteSliceReader, SliceWriter};

pub const BYTE_BLOCK_SHIFT: u32 = 15;
pub const BYTE_BLOCK_SIZE: usize = 1 << BYTE_BLOCK_SHIFT;
pub const BYTE_BLOCK_MASK: u32 = (BYTE_BLOCK_SIZE - 1) as u32;

pub const CHAR_BLOCK_SHIFT: u32 = 14;
pub const CHAR_BLOCK_SIZE: usize = 1 << CHAR_BLOCK_SHIFT;
pub const CHAR_BLOCK_MASK: u32 = (CHAR_BLOCK_SIZE - 1) as u32;

/// Bytes accounted for one char block.
pub const CHAR_BLOCK_BYTES: u64 = (CHAR_BLOCK_SIZE * 2) as u64;

/// Terminator of term text in the char pool. Sorts below every other unit.
pub const TEXT_END: u16 = 0xFFFF;

/// Size of each slice level; a slice reserves its last byte for the level marker.
pub const LEVEL_SIZES: [usize; 10] = [5, 14, 20, 30, 40, 40, 80, 80, 120, 200];

/// Level of the slice allocated after a slice of the given level.
pub const NEXT_LEVEL: [usize; 10] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 9];

pub const FIRST_LEVEL_SIZE: usize = LEVEL_SIZES[0];
