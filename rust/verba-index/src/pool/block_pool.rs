use std::sync::Arc;

use super::{
    BYTE_BLOCK_MASK, BYTE_BLOCK_SHIFT, BYTE_BLOCK_SIZE, CHAR_BLOCK_MASK, CHAR_BLOCK_SHIFT,
    CHAR_BLOCK_SIZE, IndexingContext, LEVEL_SIZES, NEXT_LEVEL, TEXT_END,
};

/// Append-only pool of fixed-size byte blocks, carved into slices.
///
/// Addresses handed out by the pool are global: `block_index * BYTE_BLOCK_SIZE +
/// offset`. Blocks are zero-filled when obtained; the slice machinery relies on
/// that to recognize the non-zero marker byte ending every slice.
pub struct ByteBlockPool {
    ctx: Arc<IndexingContext>,
    track_allocations: bool,
    pub(crate) buffers: Vec<Box<[u8]>>,
    byte_upto: usize,
}

impl ByteBlockPool {
    /// Creates a pool; with `track_allocations` its blocks count as used RAM.
    pub fn new(ctx: Arc<IndexingContext>, track_allocations: bool) -> ByteBlockPool {
        ByteBlockPool {
            ctx,
            track_allocations,
            buffers: Vec::new(),
            byte_upto: BYTE_BLOCK_SIZE,
        }
    }

    /// Global address of the first byte of the current block.
    fn byte_offset(&self) -> u32 {
        (self.buffers.len().saturating_sub(1) * BYTE_BLOCK_SIZE) as u32
    }

    pub fn num_blocks(&self) -> usize {
        self.buffers.len()
    }

    fn next_buffer(&mut self) {
        let block = self.ctx.byte_block(self.track_allocations);
        self.buffers.push(block);
        self.byte_upto = 0;
    }

    /// Allocates a new first-level slice of `size` bytes, returning its global address.
    pub fn new_slice(&mut self, size: usize) -> u32 {
        if self.byte_upto > BYTE_BLOCK_SIZE - size {
            self.next_buffer();
        }
        let upto = self.byte_upto;
        self.byte_upto += size;
        let last = self.buffers.len() - 1;
        self.buffers[last][self.byte_upto - 1] = 16;
        self.byte_offset() + upto as u32
    }

    /// Continues the slice whose marker byte sits at global address `end`.
    ///
    /// The last three data bytes of the old slice move to the start of the new
    /// slice and the freed four bytes are overwritten with the big-endian global
    /// address of the new slice. Returns the address where writing resumes.
    pub fn alloc_slice(&mut self, end: u32) -> u32 {
        let (block, offset) = split_byte_address(end);
        let level = (self.buffers[block][offset] & 15) as usize;
        let new_level = NEXT_LEVEL[level];
        let new_size = LEVEL_SIZES[new_level];

        if self.byte_upto > BYTE_BLOCK_SIZE - new_size {
            self.next_buffer();
        }
        let new_upto = self.byte_upto;
        let new_address = self.byte_offset() + new_upto as u32;
        self.byte_upto += new_size;

        let mut carried = [0u8; 3];
        carried.copy_from_slice(&self.buffers[block][offset - 3..offset]);
        self.buffers[block][offset - 3..=offset].copy_from_slice(&new_address.to_be_bytes());

        let current = self.buffers.len() - 1;
        let buffer = &mut self.buffers[current];
        buffer[new_upto..new_upto + 3].copy_from_slice(&carried);
        buffer[self.byte_upto - 1] = 16 | new_level as u8;
        new_address + 3
    }

    pub fn byte_at(&self, address: u32) -> u8 {
        let (block, offset) = split_byte_address(address);
        self.buffers[block][offset]
    }

    pub(crate) fn set_byte(&mut self, address: u32, b: u8) {
        let (block, offset) = split_byte_address(address);
        self.buffers[block][offset] = b;
    }

    /// Zero-fills all used blocks and hands them back to the shared allocator.
    pub fn reset(&mut self) {
        if self.buffers.is_empty() {
            return;
        }
        let last = self.buffers.len() - 1;
        for (i, buffer) in self.buffers.iter_mut().enumerate() {
            let used = if i == last { self.byte_upto } else { BYTE_BLOCK_SIZE };
            buffer[..used].fill(0);
        }
        self.ctx.recycle_byte_blocks(std::mem::take(&mut self.buffers));
        self.byte_upto = BYTE_BLOCK_SIZE;
    }
}

impl Drop for ByteBlockPool {
    fn drop(&mut self) {
        self.reset();
    }
}

pub(crate) fn split_byte_address(address: u32) -> (usize, usize) {
    (
        (address >> BYTE_BLOCK_SHIFT) as usize,
        (address & BYTE_BLOCK_MASK) as usize,
    )
}

/// Append-only pool of UTF-16 blocks holding `TEXT_END`-terminated term text.
pub struct CharBlockPool {
    ctx: Arc<IndexingContext>,
    buffers: Vec<Box<[u16]>>,
    char_upto: usize,
}

impl CharBlockPool {
    pub fn new(ctx: Arc<IndexingContext>) -> CharBlockPool {
        CharBlockPool {
            ctx,
            buffers: Vec::new(),
            char_upto: CHAR_BLOCK_SIZE,
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.buffers.len()
    }

    fn next_buffer(&mut self) {
        self.buffers.push(self.ctx.char_block());
        self.char_upto = 0;
    }

    /// Returns `true` if a text of `len` units (excluding the terminator) can
    /// ever be stored.
    pub fn fits(len: usize) -> bool {
        len + 1 <= CHAR_BLOCK_SIZE
    }

    /// Stores `text` followed by `TEXT_END` and returns its global address.
    ///
    /// The caller guarantees that the text fits in one block (see [`CharBlockPool::fits`]).
    pub fn add_text(&mut self, text: &[u16]) -> u32 {
        debug_assert!(Self::fits(text.len()));
        if text.len() + 1 + self.char_upto > CHAR_BLOCK_SIZE {
            self.next_buffer();
        }
        let current = self.buffers.len() - 1;
        let start = self.char_upto;
        let buffer = &mut self.buffers[current];
        buffer[start..start + text.len()].copy_from_slice(text);
        buffer[start + text.len()] = TEXT_END;
        self.char_upto += text.len() + 1;
        (current * CHAR_BLOCK_SIZE + start) as u32
    }

    /// Returns the units of the text starting at `address`, excluding the terminator.
    pub fn text(&self, address: u32) -> &[u16] {
        let block = &self.buffers[(address >> CHAR_BLOCK_SHIFT) as usize];
        let start = (address & CHAR_BLOCK_MASK) as usize;
        let len = block[start..]
            .iter()
            .position(|&c| c == TEXT_END)
            .unwrap_or(block.len() - start);
        &block[start..start + len]
    }

    /// Returns the units from `address` to the end of its block (terminator included).
    pub fn text_with_end(&self, address: u32) -> &[u16] {
        let block = &self.buffers[(address >> CHAR_BLOCK_SHIFT) as usize];
        &block[(address & CHAR_BLOCK_MASK) as usize..]
    }

    /// Compares stored text at `address` against `text`.
    pub fn text_equals(&self, address: u32, text: &[u16]) -> bool {
        let stored = self.text_with_end(address);
        stored.len() > text.len() && &stored[..text.len()] == text && stored[text.len()] == TEXT_END
    }

    /// Hands all blocks back to the shared allocator.
    pub fn reset(&mut self) {
        if self.buffers.is_empty() {
            return;
        }
        self.ctx.recycle_char_blocks(std::mem::take(&mut self.buffers));
        self.char_upto = CHAR_BLOCK_SIZE;
    }
}

impl Drop for CharBlockPool {
    fn drop(&mut self) {
        self.reset();
    }
}
