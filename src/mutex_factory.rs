//! Per-key lock striping with automatic reclamation

use dashmap::DashMap;
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A lock handed out by [`MutexFactory`]. Hold the `Arc` for as long as the
/// key's critical sections may run; the entry is reclaimed once it is dropped.
pub type KeyedMutex = Arc<Mutex<()>>;

/// `get_mutex` calls between automatic sweeps.
pub const DEFAULT_SWEEP_INTERVAL: usize = 1024;

/// Maps keys to locks so callers can serialize work per key without a
/// global lock.
///
/// Concurrent `get_mutex` calls for equal keys always observe the same lock.
/// Entries that nobody outside the factory still references are removed by
/// a sweep that runs every `sweep_interval` calls, or on [`purge`](Self::purge).
/// Reclamation is therefore best-effort: an unused entry survives until the
/// next sweep.
///
/// # Examples
///
/// ```
/// use esox_pooling::MutexFactory;
/// use std::sync::Arc;
///
/// let locks = MutexFactory::new();
/// let a = locks.get_mutex("user-1");
/// let b = locks.get_mutex("user-1");
/// assert!(Arc::ptr_eq(&a, &b));
///
/// {
///     let _guard = a.lock();
///     // one session builder per user id
/// }
///
/// drop((a, b));
/// assert_eq!(locks.purge(), 1);
/// assert!(locks.is_empty());
/// ```
pub struct MutexFactory<K: Eq + Hash> {
    mutexes: DashMap<K, KeyedMutex>,
    sweep_interval: usize,
    calls: AtomicUsize,
}

impl<K: Eq + Hash> MutexFactory<K> {
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    /// Sweep unused entries every `interval` calls; zero disables automatic
    /// sweeps.
    pub fn with_sweep_interval(interval: usize) -> Self {
        Self {
            mutexes: DashMap::new(),
            sweep_interval: interval,
            calls: AtomicUsize::new(0),
        }
    }

    /// The lock for `key`, created on first use.
    pub fn get_mutex(&self, key: K) -> KeyedMutex {
        if self.sweep_interval > 0 {
            let calls = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            if calls % self.sweep_interval == 0 {
                self.purge();
            }
        }

        // The shard stays write-locked until the clone is taken, so a
        // concurrent purge cannot observe the fresh entry as unused.
        self.mutexes
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Remove every entry whose lock is referenced only by the factory.
    /// Returns the number of entries removed.
    pub fn purge(&self) -> usize {
        let before = self.mutexes.len();
        self.mutexes.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        let removed = before.saturating_sub(self.mutexes.len());
        if removed > 0 {
            tracing::trace!(removed, remaining = self.mutexes.len(), "reclaimed unused key mutexes");
        }
        removed
    }

    /// Keys currently tracked, including ones awaiting a sweep.
    pub fn len(&self) -> usize {
        self.mutexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutexes.is_empty()
    }
}

impl<K: Eq + Hash> Default for MutexFactory<K> {
    fn default() -> Self {
        Self::new()
    }
}
