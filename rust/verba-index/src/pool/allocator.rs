use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::{Mutex, MutexGuard};
use verba_ram_budget::{RamBudget, Reclaim};

use super::{BYTE_BLOCK_SIZE, CHAR_BLOCK_BYTES, CHAR_BLOCK_SIZE};
use crate::posting_table::{POSTING_BYTES, Posting};

/// Number of posting records released per reclaim step.
const POSTINGS_TO_FREE: usize = BYTE_BLOCK_SIZE / POSTING_BYTES as usize;

/// Free lists of recycled blocks and posting records.
#[derive(Default)]
pub struct BlockAllocator {
    free_byte_blocks: Vec<Box<[u8]>>,
    free_char_blocks: Vec<Box<[u16]>>,
    free_postings: Vec<Posting>,
}

impl BlockAllocator {
    fn release_all(&mut self) -> u64 {
        let bytes = self.free_byte_blocks.len() as u64 * BYTE_BLOCK_SIZE as u64
            + self.free_char_blocks.len() as u64 * CHAR_BLOCK_BYTES
            + self.free_postings.len() as u64 * POSTING_BYTES;
        self.free_byte_blocks = Vec::new();
        self.free_char_blocks = Vec::new();
        self.free_postings = Vec::new();
        bytes
    }
}

impl Reclaim for BlockAllocator {
    fn source_count(&self) -> usize {
        3
    }

    fn is_exhausted(&self) -> bool {
        self.free_byte_blocks.is_empty()
            && self.free_char_blocks.is_empty()
            && self.free_postings.is_empty()
    }

    fn release_chunk(&mut self, source: usize) -> u64 {
        match source {
            0 => self
                .free_byte_blocks
                .pop()
                .map_or(0, |_| BYTE_BLOCK_SIZE as u64),
            1 => self
                .free_char_blocks
                .pop()
                .map_or(0, |_| CHAR_BLOCK_BYTES),
            _ => {
                let count = self.free_postings.len().min(POSTINGS_TO_FREE);
                self.free_postings.truncate(self.free_postings.len() - count);
                if self.free_postings.capacity() > 2 * self.free_postings.len() {
                    self.free_postings.shrink_to_fit();
                }
                count as u64 * POSTING_BYTES
            }
        }
    }
}

/// Engine-wide context shared by the documents writer and all of its thread
/// states: the RAM budget and the free lists of recycled memory.
pub struct IndexingContext {
    allocator: Mutex<BlockAllocator>,
    budget: RamBudget,
    shut_down: AtomicBool,
}

impl IndexingContext {
    pub fn new(budget: RamBudget) -> Arc<IndexingContext> {
        Arc::new(IndexingContext {
            allocator: Mutex::new(BlockAllocator::default()),
            budget,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn budget(&self) -> &RamBudget {
        &self.budget
    }

    /// Returns a zero-filled byte block, recycled when possible.
    pub fn byte_block(&self, track_allocations: bool) -> Box<[u8]> {
        let mut allocator = self.allocator.lock();
        let block = match allocator.free_byte_blocks.pop() {
            Some(block) => block,
            None => {
                self.budget.record_allocated(BYTE_BLOCK_SIZE as u64);
                self.budget.balance(&mut *allocator);
                vec![0u8; BYTE_BLOCK_SIZE].into_boxed_slice()
            }
        };
        if track_allocations {
            self.budget.record_used(BYTE_BLOCK_SIZE as u64);
        }
        block
    }

    /// Returns a char block, recycled when possible.
    pub fn char_block(&self) -> Box<[u16]> {
        let mut allocator = self.allocator.lock();
        let block = match allocator.free_char_blocks.pop() {
            Some(block) => block,
            None => {
                self.budget.record_allocated(CHAR_BLOCK_BYTES);
                self.budget.balance(&mut *allocator);
                vec![0u16; CHAR_BLOCK_SIZE].into_boxed_slice()
            }
        };
        self.budget.record_used(CHAR_BLOCK_BYTES);
        block
    }

    /// Moves `count` posting records into `out`, creating new ones when the
    /// free list runs short.
    pub fn take_postings(&self, count: usize, out: &mut Vec<Posting>) {
        let mut allocator = self.allocator.lock();
        self.budget.record_used(count as u64 * POSTING_BYTES);
        let available = allocator.free_postings.len().min(count);
        let split = allocator.free_postings.len() - available;
        out.extend(allocator.free_postings.drain(split..));
        if available < count {
            let missing = count - available;
            self.budget.record_allocated(missing as u64 * POSTING_BYTES);
            out.resize(out.len() + missing, Posting::default());
            self.budget.balance(&mut *allocator);
        }
    }

    /// Returns zero-filled byte blocks to the free list.
    pub fn recycle_byte_blocks(&self, blocks: Vec<Box<[u8]>>) {
        debug_assert!(blocks.iter().all(|b| b.iter().all(|&x| x == 0)));
        if let Some(mut allocator) = self.live_allocator() {
            allocator.free_byte_blocks.extend(blocks);
        }
    }

    pub fn recycle_char_blocks(&self, blocks: Vec<Box<[u16]>>) {
        if let Some(mut allocator) = self.live_allocator() {
            allocator.free_char_blocks.extend(blocks);
        }
    }

    /// Drains `postings` into the free list.
    pub fn recycle_postings(&self, postings: &mut Vec<Posting>) {
        match self.live_allocator() {
            Some(mut allocator) => allocator.free_postings.append(postings),
            None => postings.clear(),
        }
    }

    fn live_allocator(&self) -> Option<MutexGuard<'_, BlockAllocator>> {
        let allocator = self.allocator.lock();
        (!self.shut_down.load(Ordering::Acquire)).then_some(allocator)
    }

    /// Frees pooled memory or raises the buffer-full flag, as the budget dictates.
    pub fn balance(&self) {
        let mut allocator = self.allocator.lock();
        self.budget.balance(&mut *allocator);
    }

    /// Shrinks the posting free list's spare capacity after a flush.
    pub fn trim_free_postings(&self) {
        let mut allocator = self.allocator.lock();
        let len = allocator.free_postings.len();
        if allocator.free_postings.capacity() as f64 > 1.5 * len as f64 {
            allocator.free_postings.shrink_to((1.25 * len as f64) as usize);
        }
    }

    /// Releases every free list. Memory handed back afterwards is dropped
    /// instead of being recycled.
    pub fn shutdown(&self) {
        let mut allocator = self.allocator.lock();
        self.shut_down.store(true, Ordering::Release);
        let released = allocator.release_all();
        self.budget.record_released(released);
        log::debug!("indexing context shut down, released {released} bytes");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn num_free_byte_blocks(&self) -> usize {
        self.allocator.lock().free_byte_blocks.len()
    }

    pub fn num_free_char_blocks(&self) -> usize {
        self.allocator.lock().free_char_blocks.len()
    }

    pub fn num_free_postings(&self) -> usize {
        self.allocator.lock().free_postings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_are_recycled() {
        let ctx = IndexingContext::new(RamBudget::new(None));
        let a = ctx.byte_block(true);
        let b = ctx.byte_block(false);
        assert_eq!(ctx.budget().allocated(), 2 * BYTE_BLOCK_SIZE as u64);
        assert_eq!(ctx.budget().used(), BYTE_BLOCK_SIZE as u64);
        ctx.recycle_byte_blocks(vec![a, b]);
        assert_eq!(ctx.num_free_byte_blocks(), 2);
        let _c = ctx.byte_block(true);
        assert_eq!(ctx.num_free_byte_blocks(), 1);
        assert_eq!(ctx.budget().allocated(), 2 * BYTE_BLOCK_SIZE as u64);
    }

    #[test]
    fn test_take_postings() {
        let ctx = IndexingContext::new(RamBudget::new(None));
        let mut local = Vec::new();
        ctx.take_postings(256, &mut local);
        assert_eq!(local.len(), 256);
        assert_eq!(ctx.budget().allocated(), 256 * POSTING_BYTES);
        ctx.recycle_postings(&mut local);
        assert!(local.is_empty());
        assert_eq!(ctx.num_free_postings(), 256);
        ctx.take_postings(100, &mut local);
        assert_eq!(ctx.num_free_postings(), 156);
        assert_eq!(ctx.budget().allocated(), 256 * POSTING_BYTES);
        assert_eq!(ctx.budget().used(), 356 * POSTING_BYTES);
    }

    #[test]
    fn test_balance_releases_free_blocks() {
        let limit = 4 * BYTE_BLOCK_SIZE as u64;
        let ctx = IndexingContext::new(RamBudget::new(Some(limit)));
        let blocks = (0..6).map(|_| ctx.byte_block(true)).collect::<Vec<_>>();
        assert!(ctx.budget().allocated() > limit);
        ctx.recycle_byte_blocks(blocks);
        ctx.budget().reset_used();
        // the sixth block overshot with nothing to free
        assert!(ctx.budget().is_full());
        ctx.budget().clear_full();
        ctx.balance();
        assert!(ctx.budget().allocated() as f64 <= 0.95 * limit as f64);
        assert_eq!(ctx.num_free_byte_blocks(), 3);
        assert!(!ctx.budget().is_full());
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let ctx = IndexingContext::new(RamBudget::new(None));
        let block = ctx.char_block();
        ctx.recycle_char_blocks(vec![block]);
        ctx.shutdown();
        assert_eq!(ctx.num_free_char_blocks(), 0);
        assert_eq!(ctx.budget().allocated(), 0);
        let block = ctx.char_block();
        ctx.recycle_char_blocks(vec![block]);
        assert_eq!(ctx.num_free_char_blocks(), 0);
    }
}
