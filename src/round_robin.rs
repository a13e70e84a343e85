//! Fixed-size pool that hands out shared objects in cyclic order

use crate::errors::{PoolError, PoolResult};
use crate::factory::ObjectFactory;
use crate::eviction::PooledEntry;
use crate::pool::{Pool, Pooled, destroy_quietly, log_close_summary};
use crate::stats::{PoolStats, StatsTracker};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

struct Ring<T> {
    objects: Vec<PooledEntry<T>>,
    cursor: usize,
    size: usize,
}

/// Pool that dispatches a fixed set of objects round-robin.
///
/// Objects are never checked out exclusively: `get_object` hands back a
/// clone of the next slot, so `T` is normally a shared handle such as an
/// `Arc`. Slots are filled lazily up to `size`, then reused in strict order
/// across all callers. Returning is a no-op.
///
/// # Examples
///
/// ```
/// use esox_pooling::{factory_fn, Pool, RoundRobinPool};
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// let next = AtomicU32::new(0);
/// let pool = RoundRobinPool::with_size(
///     factory_fn(move || Ok(next.fetch_add(1, Ordering::SeqCst) + 1)),
///     2,
/// )
/// .unwrap();
///
/// assert_eq!(*pool.get_object().unwrap(), 1);
/// assert_eq!(*pool.get_object().unwrap(), 2);
/// assert_eq!(*pool.get_object().unwrap(), 1);
/// ```
pub struct RoundRobinPool<T> {
    ring: Mutex<Ring<T>>,
    factory: Arc<dyn ObjectFactory<T>>,
    stats: StatsTracker,
    capacity: usize,
    destroy_on_shutdown: bool,
}

/// Number of parallel execution units plus one.
pub fn default_round_robin_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        + 1
}

impl<T: Clone + Send + 'static> RoundRobinPool<T> {
    /// Create a pool sized by [`default_round_robin_size`].
    pub fn new<F>(factory: F) -> Self
    where
        F: ObjectFactory<T> + 'static,
    {
        Self::build(Arc::new(factory), default_round_robin_size())
    }

    /// Create a pool with exactly `size` slots. Zero is rejected, since a
    /// zero-sized pool is indistinguishable from a shut-down one.
    pub fn with_size<F>(factory: F, size: usize) -> PoolResult<Self>
    where
        F: ObjectFactory<T> + 'static,
    {
        if size == 0 {
            return Err(PoolError::invalid("round-robin pool size must be positive"));
        }
        Ok(Self::build(Arc::new(factory), size))
    }

    fn build(factory: Arc<dyn ObjectFactory<T>>, size: usize) -> Self {
        tracing::info!(size, "round-robin pool created");
        Self {
            ring: Mutex::new(Ring {
                objects: Vec::with_capacity(size),
                cursor: 0,
                size,
            }),
            factory,
            stats: StatsTracker::new(),
            capacity: size,
            destroy_on_shutdown: true,
        }
    }

    /// Whether [`shutdown`](Self::shutdown) calls `destroy` on each object.
    /// Enabled by default; disable when the objects are owned elsewhere.
    pub fn with_destroy_on_shutdown(mut self, enabled: bool) -> Self {
        self.destroy_on_shutdown = enabled;
        self
    }

    /// Configured number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Borrow the next object in cyclic order.
    pub fn borrow_object(&self) -> PoolResult<Pooled<T>> {
        let mut ring = self.ring.lock();
        if ring.size == 0 {
            return Err(PoolError::PoolExhausted);
        }

        if ring.objects.len() < ring.size {
            let obj = self.factory.create().map_err(PoolError::creation)?;
            StatsTracker::bump(&self.stats.created);
            ring.objects.push(PooledEntry::new(obj, Instant::now()));
        }

        let cursor = ring.cursor;
        let slot = &ring.objects[cursor];
        let obj = Pooled::new(PooledEntry {
            value: slot.value.clone(),
            created_at: slot.created_at,
            last_returned: slot.last_returned,
        });
        ring.cursor = (cursor + 1) % ring.size;
        drop(ring);

        StatsTracker::bump(&self.stats.borrowed);
        tracing::trace!(slot = cursor, "round-robin dispatch");
        Ok(obj)
    }

    /// Stop dispatching. Further borrows fail with `PoolExhausted`.
    pub fn shutdown(&self) {
        if let Some(summary) = self.take_down() {
            log_close_summary::<T>("round-robin", &summary);
        }
    }

    /// Empty the ring and destroy its objects if configured. Returns the
    /// counters as they stand afterwards, or `None` if already shut down.
    fn take_down(&self) -> Option<PoolStats> {
        let objects = {
            let mut ring = self.ring.lock();
            if ring.size == 0 {
                return None;
            }
            ring.size = 0;
            ring.cursor = 0;
            std::mem::take(&mut ring.objects)
        };

        let count = objects.len();
        if self.destroy_on_shutdown {
            for entry in objects {
                destroy_quietly(self.factory.as_ref(), entry.value, &self.stats);
            }
        }
        Some(self.stats.snapshot(0, count))
    }
}

impl<T: Clone + Send + 'static> Pool<T> for RoundRobinPool<T> {
    fn get_object(&self) -> PoolResult<Pooled<T>> {
        self.borrow_object()
    }

    fn return_object(&self, _obj: Pooled<T>) {}

    /// Drops the handed-out clone. The slot itself stays in rotation since
    /// other callers may share it.
    fn invalidate_object(&self, obj: Pooled<T>) {
        drop(obj);
    }

    fn detach(&self, obj: Pooled<T>) -> T {
        obj.into_entry().value
    }

    fn close(&self) {
        self.shutdown();
    }

    fn is_closed(&self) -> bool {
        self.ring.lock().size == 0
    }

    /// Always zero: objects are shared, never checked out.
    fn num_active(&self) -> usize {
        0
    }

    fn num_idle(&self) -> usize {
        self.ring.lock().objects.len()
    }

    fn stats(&self) -> PoolStats {
        self.stats.snapshot(0, self.num_idle())
    }
}

impl<T> Drop for RoundRobinPool<T> {
    fn drop(&mut self) {
        if !self.destroy_on_shutdown {
            return;
        }
        for entry in self.ring.get_mut().objects.drain(..) {
            destroy_quietly(self.factory.as_ref(), entry.value, &self.stats);
        }
    }
}
