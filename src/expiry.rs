//! Expiry-backed pool: a [`GenericPool`] whose objects live for a fixed time
//!
//! Objects older than `expiry` fail validation the next time someone tries
//! to borrow them and are destroyed instead. The cost of eviction is paid by
//! the borrower that would otherwise have received a stale object; a
//! background sweep is available but off by default.

use crate::clock::{Clock, SystemClock};
use crate::errors::{FactoryError, PoolError, PoolResult};
use crate::factory::{EntryInfo, ObjectFactory};
use crate::generic::{GenericPool, GenericPoolConfig};
use crate::pool::{Pool, Pooled};
use crate::stats::PoolStats;

use std::any::{Any, type_name};
use std::sync::Arc;
use std::time::Duration;

/// Default time-to-live for pooled objects.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(60 * 60);

/// Factory decorator that rejects objects once they reach their time-to-live.
pub struct ExpiryObjectFactory<T> {
    inner: Arc<dyn ObjectFactory<T>>,
    expiry: Duration,
    clock: Arc<dyn Clock>,
}

impl<T> ExpiryObjectFactory<T> {
    pub fn new(inner: Arc<dyn ObjectFactory<T>>, expiry: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            expiry,
            clock,
        }
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Whether an entry created at `info.created_at()` has lived `expiry` or longer.
    pub fn is_expired(&self, info: &EntryInfo) -> bool {
        self.clock
            .now()
            .saturating_duration_since(info.created_at())
            >= self.expiry
    }
}

impl<T> ObjectFactory<T> for ExpiryObjectFactory<T> {
    fn create(&self) -> Result<T, FactoryError> {
        self.inner.create()
    }

    fn activate(&self, obj: &mut T) {
        self.inner.activate(obj)
    }

    fn passivate(&self, obj: &mut T) {
        self.inner.passivate(obj)
    }

    fn validate(&self, obj: &T) -> bool {
        self.inner.validate(obj)
    }

    fn validate_entry(&self, obj: &T, info: &EntryInfo) -> bool {
        !self.is_expired(info) && self.inner.validate_entry(obj, info)
    }

    fn destroy(&self, obj: T) -> Result<(), FactoryError> {
        self.inner.destroy(obj)
    }
}

/// Configuration for [`ExpiryPool`]
///
/// # Examples
///
/// ```
/// use esox_pooling::ExpiryPoolConfig;
/// use std::time::Duration;
///
/// let config = ExpiryPoolConfig::new()
///     .with_min_size(2)
///     .with_max_size(8)
///     .with_expiry(Duration::from_secs(600));
///
/// assert!(config.validate().is_ok());
/// assert!(ExpiryPoolConfig::new().with_min_size(5).with_max_size(2).validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExpiryPoolConfig {
    /// Objects created up front and kept idle
    pub min_size: usize,

    /// Ceiling on live objects; `None` means unbounded
    pub max_size: Option<usize>,

    /// Time-to-live measured from creation
    pub expiry: Duration,

    /// Longest a borrow waits when the pool is at `max_size`
    pub max_wait: Option<Duration>,

    /// Period of an optional background expiry sweep
    pub eviction_interval: Option<Duration>,
}

impl Default for ExpiryPoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: None,
            expiry: DEFAULT_EXPIRY,
            max_wait: Some(Duration::from_secs(30)),
            eviction_interval: None,
        }
    }
}

impl ExpiryPoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = Some(size);
        self
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = Some(wait);
        self
    }

    pub fn without_max_wait(mut self) -> Self {
        self.max_wait = None;
        self
    }

    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = Some(interval);
        self
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.min_size == 0 {
            return Err(PoolError::invalid("min_size must be positive"));
        }
        match self.max_size {
            Some(0) => return Err(PoolError::invalid("max_size must be positive")),
            Some(max) if self.min_size > max => {
                return Err(PoolError::invalid(format!(
                    "min_size ({}) exceeds max_size ({max})",
                    self.min_size
                )));
            }
            _ => {}
        }
        if self.expiry.is_zero() {
            return Err(PoolError::invalid("expiry must be positive"));
        }
        Ok(())
    }

    /// Engine settings: fair queuing, validate on borrow, trust returns.
    fn engine_config(&self) -> GenericPoolConfig {
        GenericPoolConfig {
            max_total: self.max_size,
            min_idle: self.min_size,
            max_idle: None,
            fairness: true,
            lifo: false,
            test_on_borrow: true,
            test_on_return: false,
            test_while_idle: self.eviction_interval.is_some(),
            block_when_exhausted: true,
            max_wait: self.max_wait,
            eviction_interval: self.eviction_interval,
            eviction_policy: Default::default(),
        }
    }
}

/// Builder for [`ExpiryPool`]
pub struct ExpiryPoolBuilder<T> {
    config: ExpiryPoolConfig,
    factory: Option<Arc<dyn ObjectFactory<T>>>,
    clock: Arc<dyn Clock>,
}

impl<T: Send + 'static> ExpiryPoolBuilder<T> {
    pub fn new() -> Self {
        Self {
            config: ExpiryPoolConfig::default(),
            factory: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(mut self, config: ExpiryPoolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn min_size(mut self, size: usize) -> Self {
        self.config.min_size = size;
        self
    }

    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = Some(size);
        self
    }

    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.config.expiry = expiry;
        self
    }

    pub fn max_wait(mut self, wait: Duration) -> Self {
        self.config.max_wait = Some(wait);
        self
    }

    pub fn eviction_interval(mut self, interval: Duration) -> Self {
        self.config.eviction_interval = Some(interval);
        self
    }

    /// The factory that supplies pooled objects. Required.
    pub fn object_supplier<F>(mut self, factory: F) -> Self
    where
        F: ObjectFactory<T> + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Substitute the clock used for creation timestamps and expiry.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration and build the pool, creating `min_size`
    /// objects up front.
    pub fn build(self) -> PoolResult<ExpiryPool<T>> {
        self.config.validate()?;
        let inner = self
            .factory
            .ok_or_else(|| PoolError::invalid("an object supplier is required"))?;

        let factory = Arc::new(ExpiryObjectFactory::new(
            inner,
            self.config.expiry,
            Arc::clone(&self.clock),
        ));
        let engine = GenericPool::build(
            factory.clone(),
            self.config.engine_config(),
            self.clock,
            "expiry",
        )?;

        tracing::debug!(expiry = ?self.config.expiry, "expiry pool ready");
        Ok(ExpiryPool {
            engine,
            factory,
            config: self.config,
        })
    }
}

impl<T: Send + 'static> Default for ExpiryPoolBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded, fair pool whose objects expire a fixed time after creation.
///
/// # Examples
///
/// ```
/// use esox_pooling::{factory_fn, ExpiryPool, Pool};
/// use std::time::Duration;
///
/// let pool = ExpiryPool::builder()
///     .min_size(1)
///     .max_size(4)
///     .expiry(Duration::from_secs(300))
///     .object_supplier(factory_fn(|| Ok(String::from("session"))))
///     .build()
///     .unwrap();
///
/// let session = pool.get_object().unwrap();
/// assert_eq!(&*session, "session");
/// pool.return_object(session);
/// pool.close();
/// ```
pub struct ExpiryPool<T: Send + 'static> {
    engine: GenericPool<T>,
    factory: Arc<ExpiryObjectFactory<T>>,
    config: ExpiryPoolConfig,
}

impl<T: Send + 'static> ExpiryPool<T> {
    pub fn builder() -> ExpiryPoolBuilder<T> {
        ExpiryPoolBuilder::new()
    }

    pub fn from_config<F>(config: ExpiryPoolConfig, factory: F) -> PoolResult<Self>
    where
        F: ObjectFactory<T> + 'static,
    {
        Self::builder().config(config).object_supplier(factory).build()
    }

    pub fn config(&self) -> &ExpiryPoolConfig {
        &self.config
    }

    /// Async borrow on the underlying engine.
    pub async fn get_object_async(&self) -> PoolResult<Pooled<T>> {
        self.engine.get_object_async().await
    }

    /// Whether [`unwrap`](Self::unwrap) can produce a `U`.
    pub fn is_wrapper_for<U: Any>(&self) -> bool {
        self.unwrap::<U>().is_ok()
    }

    /// Reach this pool, its [`GenericPool`] engine, or its
    /// [`ExpiryObjectFactory`] as a concrete `U`.
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_pooling::{factory_fn, ExpiryPool, GenericPool, SimplePool};
    ///
    /// let pool = ExpiryPool::builder()
    ///     .object_supplier(factory_fn(|| Ok(1u8)))
    ///     .build()
    ///     .unwrap();
    ///
    /// let engine = pool.unwrap::<GenericPool<u8>>().unwrap();
    /// assert_eq!(engine.config().min_idle, 1);
    /// assert!(!pool.is_wrapper_for::<SimplePool<u8>>());
    /// ```
    pub fn unwrap<U: Any>(&self) -> PoolResult<&U> {
        let layers: [&dyn Any; 3] = [self, &self.engine, &*self.factory];
        layers
            .into_iter()
            .find_map(|layer| layer.downcast_ref::<U>())
            .ok_or_else(|| {
                PoolError::UnsupportedOperation(format!(
                    "{} does not wrap {}",
                    type_name::<Self>(),
                    type_name::<U>()
                ))
            })
    }
}

impl<T: Send + 'static> Pool<T> for ExpiryPool<T> {
    fn get_object(&self) -> PoolResult<Pooled<T>> {
        self.engine.get_object()
    }

    fn return_object(&self, obj: Pooled<T>) {
        self.engine.return_object(obj)
    }

    fn invalidate_object(&self, obj: Pooled<T>) {
        self.engine.invalidate_object(obj)
    }

    fn detach(&self, obj: Pooled<T>) -> T {
        self.engine.detach(obj)
    }

    fn close(&self) {
        self.engine.close()
    }

    fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }

    fn num_active(&self) -> usize {
        self.engine.num_active()
    }

    fn num_idle(&self) -> usize {
        self.engine.num_idle()
    }

    fn total_size(&self) -> usize {
        self.engine.total_size()
    }

    fn stats(&self) -> PoolStats {
        self.engine.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::simple::SimplePool;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const EXPIRY: Duration = Duration::from_secs(60);

    struct Counting {
        next: AtomicUsize,
        destroyed: Arc<AtomicUsize>,
    }

    impl ObjectFactory<usize> for Counting {
        fn create(&self) -> Result<usize, FactoryError> {
            Ok(self.next.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn destroy(&self, _obj: usize) -> Result<(), FactoryError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counting() -> (Counting, Arc<AtomicUsize>) {
        let destroyed = Arc::new(AtomicUsize::new(0));
        (
            Counting {
                next: AtomicUsize::new(0),
                destroyed: Arc::clone(&destroyed),
            },
            destroyed,
        )
    }

    fn expiring_pool() -> (ExpiryPool<usize>, Arc<ManualClock>, Arc<AtomicUsize>) {
        let (factory, destroyed) = counting();
        let clock = Arc::new(ManualClock::new());
        let pool = ExpiryPool::builder()
            .expiry(EXPIRY)
            .object_supplier(factory)
            .clock(clock.clone())
            .build()
            .unwrap();
        (pool, clock, destroyed)
    }

    #[test]
    fn defaults() {
        let config = ExpiryPoolConfig::default();
        assert_eq!(config.min_size, 1);
        assert_eq!(config.max_size, None);
        assert_eq!(config.expiry, Duration::from_secs(3600));
    }

    #[test]
    fn prepopulates_min_size() {
        let (factory, _) = counting();
        let pool = ExpiryPool::builder()
            .min_size(3)
            .max_size(5)
            .object_supplier(factory)
            .build()
            .unwrap();
        assert_eq!(pool.num_idle(), 3);
        assert_eq!(pool.total_size(), 3);
    }

    #[test]
    fn object_just_before_expiry_is_reused() {
        let (pool, clock, destroyed) = expiring_pool();
        clock.advance(EXPIRY - Duration::from_millis(1));
        assert_eq!(*pool.get_object().unwrap(), 1);
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn object_at_expiry_is_replaced() {
        let (pool, clock, destroyed) = expiring_pool();
        let first = pool.get_object().unwrap();
        assert_eq!(*first, 1);
        pool.return_object(first);

        clock.advance(EXPIRY);
        assert_eq!(*pool.get_object().unwrap(), 2);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().evicted, 1);
    }

    #[test]
    fn expiry_counts_from_creation_not_return() {
        let (pool, clock, _) = expiring_pool();
        clock.advance(EXPIRY / 2);
        let obj = pool.get_object().unwrap();
        pool.return_object(obj);
        clock.advance(EXPIRY / 2);
        assert_eq!(*pool.get_object().unwrap(), 2);
    }

    #[test]
    fn rejects_bad_sizes() {
        let (factory, _) = counting();
        let err = ExpiryPool::builder()
            .min_size(5)
            .max_size(2)
            .object_supplier(factory)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PoolError::InvalidConfiguration(_)));

        let (factory, _) = counting();
        let err = ExpiryPool::builder()
            .max_size(0)
            .object_supplier(factory)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PoolError::InvalidConfiguration(_)));

        let (factory, _) = counting();
        let err = ExpiryPool::builder()
            .min_size(0)
            .object_supplier(factory)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PoolError::InvalidConfiguration(_)));
    }

    #[test]
    fn requires_supplier() {
        let err = ExpiryPool::<usize>::builder().build().err().unwrap();
        assert!(matches!(err, PoolError::InvalidConfiguration(_)));
    }

    #[test]
    fn creation_failure_during_build() {
        let err = ExpiryPool::builder()
            .object_supplier(crate::factory_fn(|| -> Result<u8, FactoryError> {
                Err("database down".into())
            }))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PoolError::Creation(_)));
    }

    #[test]
    fn exhausted_with_zero_wait() {
        let (factory, _) = counting();
        let pool = ExpiryPool::builder()
            .max_size(1)
            .max_wait(Duration::ZERO)
            .object_supplier(factory)
            .build()
            .unwrap();
        let _held = pool.get_object().unwrap();
        assert!(matches!(pool.get_object(), Err(PoolError::PoolExhausted)));
    }

    #[test]
    fn unwrap_reaches_each_layer() {
        let (pool, _, _) = expiring_pool();
        assert!(pool.is_wrapper_for::<ExpiryPool<usize>>());
        assert!(pool.is_wrapper_for::<GenericPool<usize>>());
        let factory = pool.unwrap::<ExpiryObjectFactory<usize>>().unwrap();
        assert_eq!(factory.expiry(), EXPIRY);

        assert!(!pool.is_wrapper_for::<SimplePool<usize>>());
        let err = pool.unwrap::<String>().err().unwrap();
        assert!(matches!(err, PoolError::UnsupportedOperation(_)));
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let (pool, _, destroyed) = expiring_pool();
        pool.close();
        pool.close();
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert!(matches!(pool.get_object(), Err(PoolError::Closed)));
    }

    #[test]
    fn background_sweep_removes_expired_idle() {
        let (factory, destroyed) = counting();
        let clock = Arc::new(ManualClock::new());
        let pool = ExpiryPool::builder()
            .expiry(EXPIRY)
            .eviction_interval(Duration::from_millis(10))
            .object_supplier(factory)
            .clock(clock.clone())
            .build()
            .unwrap();

        clock.advance(EXPIRY);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while destroyed.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        pool.close();
    }

    struct SlowValidate {
        validating: Arc<AtomicBool>,
        destroyed: Arc<AtomicUsize>,
    }

    impl ObjectFactory<usize> for SlowValidate {
        fn create(&self) -> Result<usize, FactoryError> {
            Ok(1)
        }

        fn validate(&self, _obj: &usize) -> bool {
            self.validating.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            true
        }

        fn destroy(&self, _obj: usize) -> Result<(), FactoryError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn close_during_validation_fails_the_borrow() {
        let validating = Arc::new(AtomicBool::new(false));
        let destroyed = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(
            ExpiryPool::builder()
                .min_size(1)
                .object_supplier(SlowValidate {
                    validating: Arc::clone(&validating),
                    destroyed: Arc::clone(&destroyed),
                })
                .build()
                .unwrap(),
        );

        let borrower = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || pool.get_object().map(|obj| *obj))
        };
        while !validating.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }

        pool.close();
        assert!(pool.is_closed());
        assert!(matches!(borrower.join().unwrap(), Err(PoolError::Closed)));
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.num_active(), 0);
    }
}
