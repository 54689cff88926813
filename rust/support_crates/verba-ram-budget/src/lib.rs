//! RAM accounting for the indexing buffers.
//!
//! A [`RamBudget`] tracks two quantities: bytes *allocated* (held by pools and
//! their free lists) and bytes *used* (holding live buffered data). When
//! allocation overshoots the budget, [`RamBudget::balance`] asks a [`Reclaim`]
//! implementation to give pooled memory back; when that is not possible, or when
//! the used bytes alone exceed the budget, a sticky "buffer full" flag is raised
//! to request a flush.

use std::sync::atomic::{AtomicBool, Ordering};

pub use counter::Counter;

pub mod counter;

/// Allocation level (relative to the budget) above which pooled memory is freed.
pub const DEFAULT_FREE_TRIGGER: f64 = 1.05;

/// Allocation level (relative to the budget) at which freeing stops.
pub const DEFAULT_FREE_LEVEL: f64 = 0.95;

/// Used level (relative to the budget) above which a flush is requested.
pub const DEFAULT_FLUSH_TRIGGER: f64 = 1.0;

/// Used level (relative to the budget) above which the end of a document
/// should trigger a balancing pass.
pub const DEFAULT_BALANCE_TRIGGER: f64 = 0.95;

/// A source of pooled memory that can be released on demand.
///
/// Sources are visited round-robin by index; each call releases one chunk.
pub trait Reclaim {
    /// Number of distinct sources.
    fn source_count(&self) -> usize;

    /// Returns `true` if no source holds reclaimable memory.
    fn is_exhausted(&self) -> bool;

    /// Releases one chunk from the given source, returning the number of bytes
    /// released (zero when that source is currently empty).
    fn release_chunk(&mut self, source: usize) -> u64;
}

pub struct RamBudget {
    limit: Option<u64>,
    free_trigger: f64,
    free_level: f64,
    flush_trigger: f64,
    balance_trigger: f64,
    allocated: Counter,
    used: Counter,
    full: AtomicBool,
}

impl RamBudget {
    /// Creates a budget of `limit` bytes, or a disabled budget when `limit` is `None`.
    pub fn new(limit: Option<u64>) -> RamBudget {
        RamBudget {
            limit,
            free_trigger: DEFAULT_FREE_TRIGGER,
            free_level: DEFAULT_FREE_LEVEL,
            flush_trigger: DEFAULT_FLUSH_TRIGGER,
            balance_trigger: DEFAULT_BALANCE_TRIGGER,
            allocated: Counter::default(),
            used: Counter::default(),
            full: AtomicBool::new(false),
        }
    }

    pub fn from_megabytes(mb: Option<f64>) -> RamBudget {
        RamBudget::new(mb.map(|mb| (mb * 1024.0 * 1024.0) as u64))
    }

    /// Overrides the free trigger and free level ratios.
    pub fn with_free_thresholds(mut self, trigger: f64, level: f64) -> RamBudget {
        self.free_trigger = trigger;
        self.free_level = level;
        self
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn is_enabled(&self) -> bool {
        self.limit.is_some()
    }

    pub fn allocated(&self) -> u64 {
        self.allocated.read()
    }

    pub fn used(&self) -> u64 {
        self.used.read()
    }

    pub fn record_allocated(&self, bytes: u64) {
        self.allocated.deposit(bytes);
    }

    pub fn record_released(&self, bytes: u64) {
        self.allocated.withdraw_saturating(bytes);
    }

    pub fn record_used(&self, bytes: u64) {
        self.used.deposit(bytes);
    }

    pub fn record_unused(&self, bytes: u64) {
        self.used.withdraw_saturating(bytes);
    }

    /// Forgets all used bytes (after a flush or abort recycled the buffers).
    pub fn reset_used(&self) {
        self.used.drain();
    }

    /// Returns `true` once a flush has been requested by the budget.
    pub fn is_full(&self) -> bool {
        self.full.load(Ordering::Acquire)
    }

    pub fn set_full(&self) {
        self.full.store(true, Ordering::Release);
    }

    pub fn clear_full(&self) {
        self.full.store(false, Ordering::Release);
    }

    /// Returns `true` if used bytes are close enough to the budget that a
    /// balancing pass is warranted.
    pub fn needs_balance(&self) -> bool {
        match self.limit {
            Some(limit) => self.used() as f64 > self.balance_trigger * limit as f64,
            None => false,
        }
    }

    /// Brings allocation back under the budget, or raises the full flag.
    ///
    /// If allocated bytes exceed the free trigger, chunks are released
    /// round-robin from `reclaim` until allocation drops to the free level. If
    /// nothing is left to release the buffer is marked full. Otherwise, if used
    /// bytes exceed the flush trigger, the buffer is marked full directly.
    pub fn balance(&self, reclaim: &mut dyn Reclaim) {
        let Some(limit) = self.limit else {
            return;
        };
        let limit = limit as f64;
        let free_trigger = (self.free_trigger * limit) as u64;
        let free_level = (self.free_level * limit) as u64;

        if self.allocated() > free_trigger {
            let start_allocated = self.allocated();
            let sources = reclaim.source_count().max(1);
            let mut iter = 0usize;
            while self.allocated() > free_level {
                if reclaim.is_exhausted() {
                    log::debug!(
                        "nothing left to free: allocated={} used={}; flush requested",
                        self.allocated(),
                        self.used()
                    );
                    self.set_full();
                    break;
                }
                let released = reclaim.release_chunk(iter % sources);
                self.record_released(released);
                iter += 1;
            }
            log::debug!(
                "freed {} bytes: allocated={} used={}",
                start_allocated.saturating_sub(self.allocated()),
                self.allocated(),
                self.used()
            );
        } else if self.used() as f64 > self.flush_trigger * limit {
            log::debug!(
                "used {} bytes exceed the budget of {} bytes; flush requested",
                self.used(),
                limit as u64
            );
            self.set_full();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pools {
        free: [Vec<u64>; 3],
    }

    impl Reclaim for Pools {
        fn source_count(&self) -> usize {
            self.free.len()
        }

        fn is_exhausted(&self) -> bool {
            self.free.iter().all(|f| f.is_empty())
        }

        fn release_chunk(&mut self, source: usize) -> u64 {
            self.free[source].pop().unwrap_or(0)
        }
    }

    #[test]
    fn test_balance_frees_down_to_level() {
        let budget = RamBudget::new(Some(1000));
        budget.record_allocated(1200);
        budget.record_used(500);
        let mut pools = Pools {
            free: [vec![100; 5], vec![50; 5], vec![10; 5]],
        };
        budget.balance(&mut pools);
        assert!(budget.allocated() <= 950);
        assert!(!budget.is_full());
        // round robin: one chunk from each source in turn
        assert_eq!(pools.free[0].len(), 3);
        assert_eq!(pools.free[1].len(), 4);
        assert_eq!(pools.free[2].len(), 4);
    }

    #[test]
    fn test_balance_exhausted_sets_full() {
        let budget = RamBudget::new(Some(1000));
        budget.record_allocated(1100);
        let mut pools = Pools {
            free: [vec![10], vec![], vec![]],
        };
        budget.balance(&mut pools);
        assert!(budget.is_full());
        assert_eq!(budget.allocated(), 1090);
    }

    #[test]
    fn test_used_over_budget_sets_full() {
        let budget = RamBudget::new(Some(1000));
        budget.record_allocated(1040);
        budget.record_used(1001);
        let mut pools = Pools {
            free: [vec![100], vec![], vec![]],
        };
        budget.balance(&mut pools);
        assert!(budget.is_full());
        assert_eq!(pools.free[0].len(), 1);
        budget.clear_full();
        assert!(!budget.is_full());
    }

    #[test]
    fn test_disabled_budget() {
        let budget = RamBudget::new(None);
        budget.record_allocated(u64::MAX / 2);
        budget.record_used(u64::MAX / 2);
        let mut pools = Pools {
            free: [vec![], vec![], vec![]],
        };
        budget.balance(&mut pools);
        assert!(!budget.is_full());
        assert!(!budget.needs_balance());
    }
}
