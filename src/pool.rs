//! The `Pool` contract shared by every pool variant

use crate::errors::PoolResult;
use crate::eviction::PooledEntry;
use crate::expiry::{ExpiryPool, ExpiryPoolConfig};
use crate::factory::ObjectFactory;
use crate::round_robin::RoundRobinPool;
use crate::simple::SimplePool;
use crate::stats::{PoolStats, StatsTracker};

use std::fmt;
use std::ops::{Deref, DerefMut};

/// A borrowed object.
///
/// Dereferences to the pooled value. The handle also carries the pool's
/// bookkeeping for the object, which is why it, rather than the bare value,
/// goes back through [`Pool::return_object`].
pub struct Pooled<T> {
    entry: PooledEntry<T>,
}

impl<T> Pooled<T> {
    pub(crate) fn new(entry: PooledEntry<T>) -> Self {
        Self { entry }
    }

    pub(crate) fn into_entry(self) -> PooledEntry<T> {
        self.entry
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.entry.value
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entry.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.entry.value).finish()
    }
}

/// A thread-safe source of reusable objects.
///
/// Every variant is usable through `&self` from any thread. Once
/// [`close`](Self::close) returns, no borrow succeeds.
pub trait Pool<T>: Send + Sync {
    /// Borrow an object, creating one if the pool's policy allows.
    fn get_object(&self) -> PoolResult<Pooled<T>>;

    /// Hand an object back to the pool.
    fn return_object(&self, obj: Pooled<T>);

    /// Destroy a borrowed object instead of returning it, freeing its slot.
    fn invalidate_object(&self, obj: Pooled<T>);

    /// Take a borrowed object out of the pool's care for good.
    fn detach(&self, obj: Pooled<T>) -> T;

    /// Drain the pool. Safe to call more than once.
    fn close(&self);

    fn is_closed(&self) -> bool;

    /// Objects currently borrowed.
    fn num_active(&self) -> usize;

    /// Objects waiting to be borrowed.
    fn num_idle(&self) -> usize;

    fn total_size(&self) -> usize {
        self.num_active() + self.num_idle()
    }

    fn stats(&self) -> PoolStats;

    /// Borrow an object wrapped in a guard that returns it on drop.
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_pooling::{factory_fn, Pool, SimplePool};
    ///
    /// let pool = SimplePool::new(factory_fn(|| Ok(vec![0u8; 16])));
    /// {
    ///     let mut buf = pool.lease().unwrap();
    ///     buf[0] = 1;
    ///     assert_eq!(pool.num_active(), 1);
    /// }
    /// assert_eq!(pool.num_idle(), 1);
    /// ```
    fn lease(&self) -> PoolResult<PooledObject<'_, T>>
    where
        Self: Sized,
    {
        let obj = self.get_object()?;
        Ok(PooledObject::new(obj, self))
    }
}

impl<T> Pool<T> for Box<dyn Pool<T>> {
    fn get_object(&self) -> PoolResult<Pooled<T>> {
        (**self).get_object()
    }

    fn return_object(&self, obj: Pooled<T>) {
        (**self).return_object(obj)
    }

    fn invalidate_object(&self, obj: Pooled<T>) {
        (**self).invalidate_object(obj)
    }

    fn detach(&self, obj: Pooled<T>) -> T {
        (**self).detach(obj)
    }

    fn close(&self) {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn num_active(&self) -> usize {
        (**self).num_active()
    }

    fn num_idle(&self) -> usize {
        (**self).num_idle()
    }

    fn total_size(&self) -> usize {
        (**self).total_size()
    }

    fn stats(&self) -> PoolStats {
        (**self).stats()
    }
}

/// A leased object that goes back to its pool when dropped
pub struct PooledObject<'a, T> {
    value: Option<Pooled<T>>,
    pool: &'a dyn Pool<T>,
}

impl<'a, T> PooledObject<'a, T> {
    fn new(value: Pooled<T>, pool: &'a dyn Pool<T>) -> Self {
        Self {
            value: Some(value),
            pool,
        }
    }

    /// Keep the object; it will not be returned to the pool.
    pub fn detach(mut self) -> T {
        let value = self.value.take().expect("Value already taken");
        self.pool.detach(value)
    }

    /// Destroy the object instead of returning it.
    pub fn invalidate(mut self) {
        if let Some(value) = self.value.take() {
            self.pool.invalidate_object(value);
        }
    }
}

impl<T> Deref for PooledObject<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.value.as_deref().expect("Value already taken")
    }
}

impl<T> DerefMut for PooledObject<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value.as_deref_mut().expect("Value already taken")
    }
}

impl<T> Drop for PooledObject<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.return_object(value);
        }
    }
}

/// Destroy `obj`, logging instead of propagating a failure.
pub(crate) fn destroy_quietly<T>(factory: &dyn ObjectFactory<T>, obj: T, stats: &StatsTracker) {
    StatsTracker::bump(&stats.destroyed);
    if let Err(err) = factory.destroy(obj) {
        StatsTracker::bump(&stats.destroy_failures);
        tracing::warn!(
            object_type = std::any::type_name::<T>(),
            error = %err,
            "failed to destroy pooled object"
        );
    }
}

/// Emit the diagnostic summary every pool logs on close.
pub(crate) fn log_close_summary<T>(kind: &'static str, stats: &PoolStats) {
    tracing::info!(
        pool = kind,
        object_type = std::any::type_name::<T>(),
        total = stats.total(),
        active = stats.active,
        idle = stats.idle,
        created = stats.created,
        destroyed = stats.destroyed,
        "pool closed"
    );
}

/// Which pool variant [`build_pool`] should construct.
#[derive(Debug, Clone)]
pub enum PoolStrategy {
    /// Unbounded reuse queue, see [`SimplePool`]
    Simple,

    /// Fixed-size cyclic dispatch, see [`RoundRobinPool`]
    RoundRobin {
        size: usize,
        destroy_on_shutdown: bool,
    },

    /// Bounded pool with time-to-live, see [`ExpiryPool`]
    Expiry(ExpiryPoolConfig),
}

/// Build the pool variant named by `strategy` behind a common interface.
///
/// `T` must be `Clone` for every strategy because the round-robin variant
/// hands out clones of its slots. For objects that cannot be cloned, box a
/// [`SimplePool`] or [`ExpiryPool`] directly:
///
/// ```
/// use esox_pooling::{factory_fn, Pool, SimplePool};
///
/// struct Connection(u32);
///
/// let pool: Box<dyn Pool<Connection>> = Box::new(SimplePool::new(factory_fn(|| Ok(Connection(1)))));
/// assert_eq!(pool.get_object().unwrap().0, 1);
/// ```
///
/// # Examples
///
/// ```
/// use esox_pooling::{build_pool, factory_fn, Pool, PoolStrategy};
///
/// let pool = build_pool(
///     PoolStrategy::RoundRobin { size: 2, destroy_on_shutdown: true },
///     factory_fn(|| Ok(1u32)),
/// )
/// .unwrap();
/// assert_eq!(*pool.get_object().unwrap(), 1);
/// ```
pub fn build_pool<T, F>(strategy: PoolStrategy, factory: F) -> PoolResult<Box<dyn Pool<T>>>
where
    T: Clone + Send + Sync + 'static,
    F: ObjectFactory<T> + 'static,
{
    let pool: Box<dyn Pool<T>> = match strategy {
        PoolStrategy::Simple => Box::new(SimplePool::new(factory)),
        PoolStrategy::RoundRobin {
            size,
            destroy_on_shutdown,
        } => Box::new(
            RoundRobinPool::with_size(factory, size)?.with_destroy_on_shutdown(destroy_on_shutdown),
        ),
        PoolStrategy::Expiry(config) => Box::new(ExpiryPool::from_config(config, factory)?),
    };
    Ok(pool)
}
