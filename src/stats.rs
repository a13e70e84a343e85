//! Lifetime counters reported when a pool closes

use std::sync::atomic::{AtomicUsize, Ordering};

/// Snapshot of a pool's size and lifetime counters.
///
/// # Examples
///
/// ```
/// use esox_pooling::{factory_fn, Pool, SimplePool};
///
/// let pool = SimplePool::new(factory_fn(|| Ok(0u8)));
/// let obj = pool.get_object().unwrap();
/// pool.return_object(obj);
///
/// let stats = pool.stats();
/// assert_eq!(stats.created, 1);
/// assert_eq!(stats.borrowed, 1);
/// assert_eq!(stats.idle, 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Objects currently borrowed
    pub active: usize,

    /// Objects waiting in the idle set
    pub idle: usize,

    /// Objects created over the pool's lifetime
    pub created: usize,

    /// Objects destroyed over the pool's lifetime
    pub destroyed: usize,

    /// Successful borrows
    pub borrowed: usize,

    /// Objects handed back
    pub returned: usize,

    /// Objects evicted by validation or expiry
    pub evicted: usize,

    /// `destroy` calls that reported an error
    pub destroy_failures: usize,
}

impl PoolStats {
    pub fn total(&self) -> usize {
        self.active + self.idle
    }
}

/// Internal counter set
#[derive(Debug, Default)]
pub(crate) struct StatsTracker {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub borrowed: AtomicUsize,
    pub returned: AtomicUsize,
    pub evicted: AtomicUsize,
    pub destroy_failures: AtomicUsize,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, active: usize, idle: usize) -> PoolStats {
        PoolStats {
            active,
            idle,
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            borrowed: self.borrowed.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            destroy_failures: self.destroy_failures.load(Ordering::Relaxed),
        }
    }
}
