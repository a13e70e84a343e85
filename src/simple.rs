//! Unbounded reuse pool

use crate::errors::{PoolError, PoolResult};
use crate::factory::ObjectFactory;
use crate::eviction::PooledEntry;
use crate::pool::{Pool, Pooled, destroy_quietly, log_close_summary};
use crate::stats::{PoolStats, StatsTracker};

use crossbeam::queue::SegQueue;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

/// Pool that never blocks and never caps its size.
///
/// Borrowing takes the oldest idle object or creates a new one; nothing is
/// validated. Idle objects are only discarded by [`close`](Pool::close).
///
/// # Examples
///
/// ```
/// use esox_pooling::{factory_fn, Pool, SimplePool};
///
/// let pool = SimplePool::new(factory_fn(|| Ok(String::new())));
/// let s = pool.get_object().unwrap();
/// assert!(s.is_empty());
/// pool.return_object(s);
/// assert_eq!(pool.total_size(), 1);
/// ```
pub struct SimplePool<T> {
    idle: SegQueue<PooledEntry<T>>,
    factory: Arc<dyn ObjectFactory<T>>,
    stats: StatsTracker,
    total: AtomicUsize,
    closed: AtomicBool,
    destroy_on_close: bool,
}

impl<T: Send + 'static> SimplePool<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: ObjectFactory<T> + 'static,
    {
        Self {
            idle: SegQueue::new(),
            factory: Arc::new(factory),
            stats: StatsTracker::new(),
            total: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            destroy_on_close: false,
        }
    }

    /// Call `destroy` on every idle object at close, oldest return first.
    /// Off by default: objects are simply dropped.
    pub fn with_destroy_on_close(mut self, enabled: bool) -> Self {
        self.destroy_on_close = enabled;
        self
    }

    fn discard(&self, obj: T) {
        if self.destroy_on_close {
            destroy_quietly(self.factory.as_ref(), obj, &self.stats);
        } else {
            drop(obj);
        }
        self.release_slot();
    }

    fn release_slot(&self) {
        let _ = self
            .total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Mark the pool closed and empty the idle queue. Returns the counters
    /// as they stand afterwards, or `None` if the pool was already closed.
    fn clear_for_close(&self) -> Option<PoolStats> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return None;
        }

        let active = self.num_active();
        let mut drained = 0usize;
        while let Some(entry) = self.idle.pop() {
            self.discard(entry.value);
            drained += 1;
        }
        tracing::debug!(
            object_type = std::any::type_name::<T>(),
            count = drained,
            "cleared simple pool"
        );
        Some(self.stats.snapshot(active, drained))
    }

    fn create(&self) -> PoolResult<PooledEntry<T>> {
        let obj = self.factory.create().map_err(PoolError::creation)?;
        self.total.fetch_add(1, Ordering::AcqRel);
        StatsTracker::bump(&self.stats.created);
        Ok(PooledEntry::new(obj, Instant::now()))
    }
}

impl<T: Send + 'static> Pool<T> for SimplePool<T> {
    fn get_object(&self) -> PoolResult<Pooled<T>> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let mut entry = match self.idle.pop() {
            Some(entry) => entry,
            None => self.create()?,
        };

        // close() may have drained the queue while we were creating
        if self.is_closed() {
            self.discard(entry.value);
            return Err(PoolError::Closed);
        }

        self.factory.activate(&mut entry.value);
        StatsTracker::bump(&self.stats.borrowed);
        tracing::trace!("object borrowed from simple pool");
        Ok(Pooled::new(entry))
    }

    fn return_object(&self, obj: Pooled<T>) {
        StatsTracker::bump(&self.stats.returned);
        let mut entry = obj.into_entry();
        if self.is_closed() {
            self.discard(entry.value);
            return;
        }
        self.factory.passivate(&mut entry.value);
        entry.touch(Instant::now());
        self.idle.push(entry);
    }

    fn invalidate_object(&self, obj: Pooled<T>) {
        destroy_quietly(self.factory.as_ref(), obj.into_entry().value, &self.stats);
        self.release_slot();
    }

    fn detach(&self, obj: Pooled<T>) -> T {
        self.release_slot();
        obj.into_entry().value
    }

    fn close(&self) {
        if let Some(summary) = self.clear_for_close() {
            log_close_summary::<T>("simple", &summary);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn num_active(&self) -> usize {
        self.total
            .load(Ordering::Acquire)
            .saturating_sub(self.idle.len())
    }

    fn num_idle(&self) -> usize {
        self.idle.len()
    }

    fn total_size(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    fn stats(&self) -> PoolStats {
        self.stats.snapshot(self.num_active(), self.num_idle())
    }
}

impl<T> Drop for SimplePool<T> {
    fn drop(&mut self) {
        // Objects still queued are dropped with the queue; only run destroy
        // callbacks when the pool was never closed explicitly.
        if self.destroy_on_close && !*self.closed.get_mut() {
            while let Some(entry) = self.idle.pop() {
                destroy_quietly(self.factory.as_ref(), entry.value, &self.stats);
            }
        }
    }
}
