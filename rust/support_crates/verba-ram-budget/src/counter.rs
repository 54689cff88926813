use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe byte counter that never goes below zero.
#[derive(Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new(amount: u64) -> Counter {
        Counter(AtomicU64::new(amount))
    }

    /// Adds `amount` to the counter.
    pub fn deposit(&self, amount: u64) {
        self.0.fetch_add(amount, Ordering::AcqRel);
    }

    /// Subtracts up to `amount` from the counter, stopping at zero.
    ///
    /// Returns the amount actually subtracted.
    pub fn withdraw_saturating(&self, amount: u64) -> u64 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let taken = current.min(amount);
            match self.0.compare_exchange_weak(
                current,
                current - taken,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return taken,
                Err(updated) => current = updated,
            }
        }
    }

    /// Returns the counter value (possibly stale by the time it is observed).
    pub fn read(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Sets the counter to zero, returning the previous value.
    pub fn drain(&self) -> u64 {
        self.0.swap(0, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_withdraw_saturating() {
        let counter = Counter::new(100);
        assert_eq!(counter.withdraw_saturating(30), 30);
        assert_eq!(counter.read(), 70);
        assert_eq!(counter.withdraw_saturating(100), 70);
        assert_eq!(counter.read(), 0);
        assert_eq!(counter.withdraw_saturating(1), 0);
    }

    #[test]
    fn test_concurrent_deposits() {
        let counter = Arc::new(Counter::default());
        let handles = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.deposit(3);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.drain(), 24_000);
        assert_eq!(counter.read(), 0);
    }
}
