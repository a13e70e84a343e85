//! Bounded general-purpose pool engine
//!
//! `GenericPool` caps the number of live objects, queues borrowers when the
//! cap is reached (optionally in strict arrival order), validates objects on
//! borrow and/or return, and can run a background evictor. The expiry-backed
//! pool is built on top of it.

use crate::clock::{Clock, SystemClock};
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{EvictionPolicy, PooledEntry};
use crate::factory::ObjectFactory;
use crate::pool::{Pool, Pooled, destroy_quietly, log_close_summary};
use crate::stats::{PoolStats, StatsTracker};

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Configuration for [`GenericPool`]
///
/// # Examples
///
/// ```
/// use esox_pooling::GenericPoolConfig;
/// use std::time::Duration;
///
/// let config = GenericPoolConfig::new()
///     .with_max_total(10)
///     .with_min_idle(2)
///     .with_max_wait(Duration::from_millis(250));
///
/// assert_eq!(config.max_total, Some(10));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GenericPoolConfig {
    /// Maximum live objects (idle + borrowed); `None` means unbounded
    pub max_total: Option<usize>,

    /// Idle objects the pool keeps ready
    pub min_idle: usize,

    /// Idle objects beyond this are destroyed on return
    pub max_idle: Option<usize>,

    /// Serve blocked borrowers in arrival order
    pub fairness: bool,

    /// Borrow the most recently returned object first
    pub lifo: bool,

    /// Validate idle objects before handing them out
    pub test_on_borrow: bool,

    /// Validate objects as they are returned
    pub test_on_return: bool,

    /// Validate idle objects during background eviction runs
    pub test_while_idle: bool,

    /// Wait for an object when exhausted instead of failing
    pub block_when_exhausted: bool,

    /// Longest a borrow waits; `None` waits indefinitely, zero never waits
    pub max_wait: Option<Duration>,

    /// Period of the background evictor; `None` disables it
    pub eviction_interval: Option<Duration>,

    /// Age limits applied on borrow and by the evictor
    pub eviction_policy: EvictionPolicy,
}

impl Default for GenericPoolConfig {
    fn default() -> Self {
        Self {
            max_total: None,
            min_idle: 0,
            max_idle: None,
            fairness: true,
            lifo: false,
            test_on_borrow: true,
            test_on_return: false,
            test_while_idle: false,
            block_when_exhausted: true,
            max_wait: Some(Duration::from_secs(30)),
            eviction_interval: None,
            eviction_policy: EvictionPolicy::None,
        }
    }
}

impl GenericPoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_total(mut self, max: usize) -> Self {
        self.max_total = Some(max);
        self
    }

    pub fn with_min_idle(mut self, min: usize) -> Self {
        self.min_idle = min;
        self
    }

    pub fn with_max_idle(mut self, max: usize) -> Self {
        self.max_idle = Some(max);
        self
    }

    pub fn with_fairness(mut self, fair: bool) -> Self {
        self.fairness = fair;
        self
    }

    pub fn with_lifo(mut self, lifo: bool) -> Self {
        self.lifo = lifo;
        self
    }

    pub fn with_test_on_borrow(mut self, enabled: bool) -> Self {
        self.test_on_borrow = enabled;
        self
    }

    pub fn with_test_on_return(mut self, enabled: bool) -> Self {
        self.test_on_return = enabled;
        self
    }

    pub fn with_test_while_idle(mut self, enabled: bool) -> Self {
        self.test_while_idle = enabled;
        self
    }

    pub fn with_block_when_exhausted(mut self, block: bool) -> Self {
        self.block_when_exhausted = block;
        self
    }

    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = Some(wait);
        self
    }

    /// Block indefinitely when exhausted.
    pub fn without_max_wait(mut self) -> Self {
        self.max_wait = None;
        self
    }

    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = Some(interval);
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Check the limits are consistent with each other.
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_total == Some(0) {
            return Err(PoolError::invalid("max_total must be positive"));
        }
        if let Some(max) = self.max_total
            && self.min_idle > max
        {
            return Err(PoolError::invalid(format!(
                "min_idle ({}) exceeds max_total ({max})",
                self.min_idle
            )));
        }
        if let Some(max_idle) = self.max_idle
            && self.min_idle > max_idle
        {
            return Err(PoolError::invalid(format!(
                "min_idle ({}) exceeds max_idle ({max_idle})",
                self.min_idle
            )));
        }
        if self.eviction_interval == Some(Duration::ZERO) {
            return Err(PoolError::invalid("eviction_interval must be positive"));
        }
        Ok(())
    }
}

struct State<T> {
    idle: VecDeque<PooledEntry<T>>,
    active: usize,
    /// Creations (or evictor checks) in flight; they count against `max_total`.
    pending: usize,
    waiters: VecDeque<u64>,
    next_ticket: u64,
    closed: bool,
}

impl<T> State<T> {
    fn live(&self) -> usize {
        self.idle.len() + self.active + self.pending
    }

    fn has_capacity(&self, max_total: Option<usize>) -> bool {
        max_total.is_none_or(|max| self.live() < max)
    }

    fn is_turn(&self, fair: bool, ticket: Option<u64>) -> bool {
        if !fair {
            return true;
        }
        match ticket {
            Some(t) => self.waiters.front() == Some(&t),
            None => self.waiters.is_empty(),
        }
    }

    fn enqueue(&mut self, front: bool) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        if front {
            self.waiters.push_front(ticket);
        } else {
            self.waiters.push_back(ticket);
        }
        ticket
    }

    fn dequeue(&mut self, ticket: Option<u64>) {
        if let Some(t) = ticket
            && let Some(pos) = self.waiters.iter().position(|w| *w == t)
        {
            self.waiters.remove(pos);
        }
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    factory: Arc<dyn ObjectFactory<T>>,
    clock: Arc<dyn Clock>,
    config: GenericPoolConfig,
    stats: StatsTracker,
    label: &'static str,
}

#[derive(Clone, Copy)]
enum Wait {
    Never,
    Until(Option<Instant>),
}

impl<T: Send + 'static> Shared<T> {
    fn acquire(&self, wait: Wait) -> PoolResult<Pooled<T>> {
        let config = &self.config;
        let mut ticket: Option<u64> = None;
        let mut timed_out = false;
        let mut state = self.state.lock();

        loop {
            if state.closed {
                state.dequeue(ticket);
                return Err(PoolError::Closed);
            }

            if state.is_turn(config.fairness, ticket) {
                if let Some(entry) = state.idle.pop_front() {
                    state.active += 1;
                    state.dequeue(ticket.take());
                    self.available.notify_all();
                    drop(state);

                    match self.prepare(entry) {
                        Some(obj) => return self.hand_out(obj),
                        None => {
                            state = self.state.lock();
                            state.active = state.active.saturating_sub(1);
                            // Keep our place at the head of the queue for the retry
                            if config.fairness {
                                ticket = Some(state.enqueue(true));
                            }
                            self.available.notify_all();
                            continue;
                        }
                    }
                }

                if state.has_capacity(config.max_total) {
                    state.pending += 1;
                    state.dequeue(ticket.take());
                    self.available.notify_all();
                    drop(state);
                    return self.create_for_borrow();
                }
            }

            let may_wait = matches!(wait, Wait::Until(_))
                && config.block_when_exhausted
                && config.max_wait != Some(Duration::ZERO);
            if !may_wait {
                state.dequeue(ticket);
                self.available.notify_all();
                return Err(PoolError::PoolExhausted);
            }
            if timed_out {
                state.dequeue(ticket);
                self.available.notify_all();
                return Err(PoolError::Timeout(config.max_wait.unwrap_or_default()));
            }

            if ticket.is_none() {
                ticket = Some(state.enqueue(false));
            }
            match wait {
                Wait::Until(Some(deadline)) => {
                    timed_out = self.available.wait_until(&mut state, deadline).timed_out();
                }
                _ => self.available.wait(&mut state),
            }
        }
    }

    /// Activate and, if configured, validate an idle entry. Failing entries
    /// are destroyed.
    fn prepare(&self, mut entry: PooledEntry<T>) -> Option<Pooled<T>> {
        self.factory.activate(&mut entry.value);
        if self.config.test_on_borrow && !self.is_valid(&entry) {
            tracing::debug!(pool = self.label, "evicting object that failed validation on borrow");
            self.evict(entry);
            return None;
        }
        Some(Pooled::new(entry))
    }

    fn create_for_borrow(&self) -> PoolResult<Pooled<T>> {
        let created = self.create_entry();
        let mut state = self.state.lock();
        state.pending -= 1;
        match created {
            Ok(mut entry) => {
                state.active += 1;
                drop(state);
                self.factory.activate(&mut entry.value);
                self.hand_out(Pooled::new(entry))
            }
            Err(err) => {
                self.available.notify_all();
                Err(err)
            }
        }
    }

    /// Complete a borrow, unless the pool was closed while the object was
    /// being created or validated. Such an object is destroyed instead.
    fn hand_out(&self, obj: Pooled<T>) -> PoolResult<Pooled<T>> {
        let mut state = self.state.lock();
        if state.closed {
            state.active = state.active.saturating_sub(1);
            self.available.notify_all();
            drop(state);
            tracing::debug!(pool = self.label, "pool closed during borrow; destroying object");
            destroy_quietly(self.factory.as_ref(), obj.into_entry().value, &self.stats);
            return Err(PoolError::Closed);
        }
        drop(state);

        StatsTracker::bump(&self.stats.borrowed);
        tracing::trace!(pool = self.label, "object borrowed");
        Ok(obj)
    }

    fn create_entry(&self) -> PoolResult<PooledEntry<T>> {
        let value = self.factory.create().map_err(PoolError::creation)?;
        StatsTracker::bump(&self.stats.created);
        Ok(PooledEntry::new(value, self.clock.now()))
    }

    fn is_valid(&self, entry: &PooledEntry<T>) -> bool {
        !entry.is_expired(&self.config.eviction_policy, self.clock.now())
            && self.factory.validate_entry(&entry.value, &entry.info())
    }

    fn evict(&self, entry: PooledEntry<T>) {
        StatsTracker::bump(&self.stats.evicted);
        destroy_quietly(self.factory.as_ref(), entry.value, &self.stats);
    }

    fn release(&self, obj: Pooled<T>) {
        let mut entry = obj.into_entry();
        StatsTracker::bump(&self.stats.returned);
        self.factory.passivate(&mut entry.value);

        if self.config.test_on_return && !self.is_valid(&entry) {
            tracing::debug!(pool = self.label, "evicting object that failed validation on return");
            self.evict(entry);
            self.free_slot();
            return;
        }

        let mut state = self.state.lock();
        let over_idle = self
            .config
            .max_idle
            .is_some_and(|max| state.idle.len() >= max);
        if state.closed || over_idle {
            state.active = state.active.saturating_sub(1);
            self.available.notify_all();
            drop(state);
            destroy_quietly(self.factory.as_ref(), entry.value, &self.stats);
            return;
        }

        entry.touch(self.clock.now());
        if self.config.lifo {
            state.idle.push_front(entry);
        } else {
            state.idle.push_back(entry);
        }
        state.active = state.active.saturating_sub(1);
        self.available.notify_all();
        tracing::trace!(pool = self.label, "object returned");
    }

    fn free_slot(&self) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        self.available.notify_all();
    }

    /// Create idle objects until `target` are idle or the cap is reached.
    fn ensure_idle(&self, target: usize) -> PoolResult<()> {
        loop {
            {
                let mut state = self.state.lock();
                if state.closed
                    || state.idle.len() + state.pending >= target
                    || !state.has_capacity(self.config.max_total)
                {
                    return Ok(());
                }
                state.pending += 1;
            }

            let created = self.create_entry();
            let mut state = self.state.lock();
            state.pending -= 1;
            match created {
                Ok(entry) if !state.closed => {
                    state.idle.push_back(entry);
                    self.available.notify_all();
                }
                Ok(entry) => {
                    drop(state);
                    destroy_quietly(self.factory.as_ref(), entry.value, &self.stats);
                    return Ok(());
                }
                Err(err) => {
                    self.available.notify_all();
                    return Err(err);
                }
            }
        }
    }

    /// One eviction pass over the idle set, then refill to `min_idle`.
    fn run_eviction(&self) {
        let taken: Vec<PooledEntry<T>> = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            let taken: Vec<_> = state.idle.drain(..).collect();
            state.pending += taken.len();
            taken
        };

        let examined = taken.len();
        let now = self.clock.now();
        let mut kept = Vec::with_capacity(examined);
        for entry in taken {
            let expired = entry.is_expired(&self.config.eviction_policy, now)
                || (self.config.test_while_idle
                    && !self.factory.validate_entry(&entry.value, &entry.info()));
            if expired {
                self.evict(entry);
            } else {
                kept.push(entry);
            }
        }
        let evicted = examined - kept.len();

        {
            let mut state = self.state.lock();
            state.pending -= examined;
            if state.closed {
                drop(state);
                for entry in kept {
                    destroy_quietly(self.factory.as_ref(), entry.value, &self.stats);
                }
                return;
            }
            // Entries returned during the pass are newer than the kept ones
            for entry in kept.into_iter().rev() {
                state.idle.push_front(entry);
            }
            self.available.notify_all();
        }

        if evicted > 0 {
            tracing::debug!(pool = self.label, examined, evicted, "eviction run finished");
        }
        if let Err(err) = self.ensure_idle(self.config.min_idle) {
            tracing::warn!(pool = self.label, error = %err, "failed to refill idle objects");
        }
    }

    fn drain_idle(&self) -> Vec<PooledEntry<T>> {
        let mut state = self.state.lock();
        let drained = state.idle.drain(..).collect();
        self.available.notify_all();
        drained
    }
}

struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

struct Evictor {
    signal: Arc<StopSignal>,
    handle: JoinHandle<()>,
}

impl Evictor {
    fn spawn<T: Send + 'static>(shared: &Arc<Shared<T>>, interval: Duration) -> Option<Self> {
        let weak: Weak<Shared<T>> = Arc::downgrade(shared);
        let signal = Arc::new(StopSignal {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });
        let thread_signal = Arc::clone(&signal);

        let spawned = std::thread::Builder::new()
            .name(format!("{}-pool-evictor", shared.label))
            .spawn(move || {
                loop {
                    {
                        let mut stopped = thread_signal.stopped.lock();
                        if !*stopped {
                            thread_signal.wake.wait_for(&mut stopped, interval);
                        }
                        if *stopped {
                            break;
                        }
                    }
                    match weak.upgrade() {
                        Some(shared) => shared.run_eviction(),
                        None => break,
                    }
                }
            });

        match spawned {
            Ok(handle) => Some(Self { signal, handle }),
            Err(err) => {
                tracing::warn!(error = %err, "failed to start pool evictor; idle objects are only checked on borrow");
                None
            }
        }
    }

    fn stop(self) {
        *self.signal.stopped.lock() = true;
        self.signal.wake.notify_all();
        if self.handle.join().is_err() {
            tracing::warn!("pool evictor thread panicked");
        }
    }
}

/// Bounded pool with fair queuing, validation and optional background eviction.
///
/// # Examples
///
/// ```
/// use esox_pooling::{factory_fn, GenericPool, GenericPoolConfig, Pool, PoolError};
/// use std::time::Duration;
///
/// let config = GenericPoolConfig::new()
///     .with_max_total(1)
///     .with_max_wait(Duration::ZERO);
/// let pool = GenericPool::new(factory_fn(|| Ok(42u32)), config).unwrap();
///
/// let held = pool.get_object().unwrap();
/// assert!(matches!(pool.get_object(), Err(PoolError::PoolExhausted)));
/// pool.return_object(held);
/// assert_eq!(*pool.get_object().unwrap(), 42);
/// ```
pub struct GenericPool<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    evictor: Mutex<Option<Evictor>>,
}

impl<T: Send + 'static> GenericPool<T> {
    /// Create a pool on the system clock and pre-populate `min_idle` objects.
    pub fn new<F>(factory: F, config: GenericPoolConfig) -> PoolResult<Self>
    where
        F: ObjectFactory<T> + 'static,
    {
        Self::with_clock(Arc::new(factory), config, Arc::new(SystemClock))
    }

    /// Create a pool stamping entries with `clock`. Borrow timeouts always
    /// use real time.
    pub fn with_clock(
        factory: Arc<dyn ObjectFactory<T>>,
        config: GenericPoolConfig,
        clock: Arc<dyn Clock>,
    ) -> PoolResult<Self> {
        Self::build(factory, config, clock, "generic")
    }

    pub(crate) fn build(
        factory: Arc<dyn ObjectFactory<T>>,
        config: GenericPoolConfig,
        clock: Arc<dyn Clock>,
        label: &'static str,
    ) -> PoolResult<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                idle: VecDeque::new(),
                active: 0,
                pending: 0,
                waiters: VecDeque::new(),
                next_ticket: 0,
                closed: false,
            }),
            available: Condvar::new(),
            factory,
            clock,
            config,
            stats: StatsTracker::new(),
            label,
        });

        shared.ensure_idle(shared.config.min_idle)?;

        let evictor = shared
            .config
            .eviction_interval
            .and_then(|interval| Evictor::spawn(&shared, interval));

        tracing::info!(
            pool = label,
            max_total = ?shared.config.max_total,
            min_idle = shared.config.min_idle,
            fairness = shared.config.fairness,
            "pool created"
        );

        Ok(Self {
            shared,
            evictor: Mutex::new(evictor),
        })
    }

    pub fn config(&self) -> &GenericPoolConfig {
        &self.shared.config
    }

    /// Borrow an object, waiting up to `max_wait` when the pool is exhausted.
    pub fn borrow_object(&self) -> PoolResult<Pooled<T>> {
        let deadline = self.shared.config.max_wait.map(|wait| Instant::now() + wait);
        self.shared.acquire(Wait::Until(deadline))
    }

    /// Borrow an object without waiting.
    pub fn try_get_object(&self) -> PoolResult<Pooled<T>> {
        self.shared.acquire(Wait::Never)
    }

    /// Borrow an object asynchronously, polling until `max_wait` elapses.
    /// With no `max_wait` this waits until an object frees up or the pool
    /// closes.
    pub async fn get_object_async(&self) -> PoolResult<Pooled<T>> {
        let config = &self.shared.config;
        if !config.block_when_exhausted || config.max_wait == Some(Duration::ZERO) {
            return self.try_get_object();
        }

        let poll = async {
            loop {
                match self.try_get_object() {
                    Err(PoolError::PoolExhausted) => {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    other => return other,
                }
            }
        };

        match config.max_wait {
            Some(timeout) => tokio::time::timeout(timeout, poll)
                .await
                .map_err(|_| PoolError::Timeout(timeout))?,
            None => poll.await,
        }
    }

    /// Run one eviction pass now, regardless of the background schedule.
    pub fn evict(&self) {
        self.shared.run_eviction();
    }

    /// Create idle objects up to `min_idle`.
    pub fn prepare_pool(&self) -> PoolResult<()> {
        self.shared.ensure_idle(self.shared.config.min_idle)
    }

    /// Destroy every idle object without closing the pool.
    pub fn clear(&self) {
        for entry in self.shared.drain_idle() {
            destroy_quietly(self.shared.factory.as_ref(), entry.value, &self.shared.stats);
        }
    }

    /// Borrowers currently queued for an object.
    pub fn num_waiters(&self) -> usize {
        self.shared.state.lock().waiters.len()
    }

    /// Close the pool and destroy its idle objects. Returns the counters as
    /// they stand afterwards, or `None` if the pool was already closed.
    fn shut_down(&self) -> Option<PoolStats> {
        let (active, idle) = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return None;
            }
            state.closed = true;
            let idle: Vec<_> = state.idle.drain(..).collect();
            self.shared.available.notify_all();
            (state.active, idle)
        };
        self.stop_evictor();

        let count = idle.len();
        for entry in idle {
            destroy_quietly(self.shared.factory.as_ref(), entry.value, &self.shared.stats);
        }
        Some(self.shared.stats.snapshot(active, count))
    }

    fn stop_evictor(&self) {
        if let Some(evictor) = self.evictor.lock().take() {
            evictor.stop();
        }
    }
}

impl<T: Send + 'static> Pool<T> for GenericPool<T> {
    fn get_object(&self) -> PoolResult<Pooled<T>> {
        self.borrow_object()
    }

    fn return_object(&self, obj: Pooled<T>) {
        self.shared.release(obj);
    }

    fn invalidate_object(&self, obj: Pooled<T>) {
        self.shared.evict(obj.into_entry());
        self.shared.free_slot();
    }

    fn detach(&self, obj: Pooled<T>) -> T {
        self.shared.free_slot();
        obj.into_entry().value
    }

    fn close(&self) {
        if let Some(summary) = self.shut_down() {
            log_close_summary::<T>(self.shared.label, &summary);
        }
    }

    fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    fn num_active(&self) -> usize {
        self.shared.state.lock().active
    }

    fn num_idle(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    fn total_size(&self) -> usize {
        let state = self.shared.state.lock();
        state.active + state.idle.len()
    }

    fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        self.shared.stats.snapshot(state.active, state.idle.len())
    }
}

impl<T: Send + 'static> Drop for GenericPool<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::errors::FactoryError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Counting {
        next: AtomicUsize,
        destroyed: Arc<AtomicUsize>,
        fail_validation: bool,
    }

    impl ObjectFactory<usize> for Counting {
        fn create(&self) -> Result<usize, FactoryError> {
            Ok(self.next.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn validate(&self, _obj: &usize) -> bool {
            !self.fail_validation
        }

        fn destroy(&self, _obj: usize) -> Result<(), FactoryError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counting(fail_validation: bool) -> (Arc<Counting>, Arc<AtomicUsize>) {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let factory = Arc::new(Counting {
            next: AtomicUsize::new(0),
            destroyed: Arc::clone(&destroyed),
            fail_validation,
        });
        (factory, destroyed)
    }

    fn pool(config: GenericPoolConfig) -> (GenericPool<usize>, Arc<AtomicUsize>) {
        let (factory, destroyed) = counting(false);
        (GenericPool::new(factory, config).unwrap(), destroyed)
    }

    #[test]
    fn config_validation() {
        assert!(GenericPoolConfig::new().with_max_total(0).validate().is_err());
        assert!(
            GenericPoolConfig::new()
                .with_max_total(2)
                .with_min_idle(3)
                .validate()
                .is_err()
        );
        assert!(
            GenericPoolConfig::new()
                .with_max_idle(1)
                .with_min_idle(2)
                .validate()
                .is_err()
        );
        assert!(
            GenericPoolConfig::new()
                .with_eviction_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(GenericPoolConfig::new().validate().is_ok());
    }

    #[test]
    fn prepopulates_min_idle() {
        let (pool, _) = pool(GenericPoolConfig::new().with_min_idle(3));
        assert_eq!(pool.num_idle(), 3);
        assert_eq!(pool.stats().created, 3);
    }

    #[test]
    fn fifo_reuse_order() {
        let (pool, _) = pool(GenericPoolConfig::new());
        let a = pool.get_object().unwrap();
        let b = pool.get_object().unwrap();
        pool.return_object(a);
        pool.return_object(b);
        assert_eq!(*pool.get_object().unwrap(), 1);
    }

    #[test]
    fn lifo_reuse_order() {
        let (pool, _) = pool(GenericPoolConfig::new().with_lifo(true));
        let a = pool.get_object().unwrap();
        let b = pool.get_object().unwrap();
        pool.return_object(a);
        pool.return_object(b);
        assert_eq!(*pool.get_object().unwrap(), 2);
    }

    #[test]
    fn exhausted_without_wait() {
        let (pool, _) = pool(
            GenericPoolConfig::new()
                .with_max_total(2)
                .with_block_when_exhausted(false),
        );
        let _a = pool.get_object().unwrap();
        let _b = pool.get_object().unwrap();
        assert!(matches!(pool.get_object(), Err(PoolError::PoolExhausted)));
        assert!(matches!(pool.try_get_object(), Err(PoolError::PoolExhausted)));
    }

    #[test]
    fn bounded_wait_times_out() {
        let wait = Duration::from_millis(30);
        let (pool, _) = pool(GenericPoolConfig::new().with_max_total(1).with_max_wait(wait));
        let _held = pool.get_object().unwrap();

        let started = Instant::now();
        let err = pool.get_object().unwrap_err();
        assert!(matches!(err, PoolError::Timeout(d) if d == wait));
        assert!(started.elapsed() >= wait);
        assert_eq!(pool.num_waiters(), 0);
    }

    #[test]
    fn failed_validation_evicts_and_replaces() {
        let (factory, destroyed) = counting(true);
        let pool = GenericPool::new(factory, GenericPoolConfig::new().with_min_idle(1)).unwrap();
        assert_eq!(*pool.get_object().unwrap(), 2);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().evicted, 1);
    }

    #[test]
    fn test_on_return_discards_invalid() {
        let (factory, destroyed) = counting(true);
        let config = GenericPoolConfig::new()
            .with_test_on_borrow(false)
            .with_test_on_return(true);
        let pool = GenericPool::new(factory, config).unwrap();
        let obj = pool.get_object().unwrap();
        pool.return_object(obj);
        assert_eq!(pool.num_idle(), 0);
        assert_eq!(pool.num_active(), 0);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn max_idle_destroys_surplus() {
        let (pool, destroyed) = pool(GenericPoolConfig::new().with_max_idle(1));
        let a = pool.get_object().unwrap();
        let b = pool.get_object().unwrap();
        pool.return_object(a);
        pool.return_object(b);
        assert_eq!(pool.num_idle(), 1);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ttl_policy_with_manual_clock() {
        let (factory, destroyed) = counting(false);
        let clock = Arc::new(ManualClock::new());
        let config = GenericPoolConfig::new()
            .with_eviction_policy(EvictionPolicy::TimeToLive(Duration::from_secs(10)));
        let pool = GenericPool::with_clock(factory, config, clock.clone()).unwrap();

        let obj = pool.get_object().unwrap();
        pool.return_object(obj);
        clock.advance(Duration::from_secs(10));
        assert_eq!(*pool.get_object().unwrap(), 2);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn manual_eviction_refills_min_idle() {
        let (factory, destroyed) = counting(false);
        let clock = Arc::new(ManualClock::new());
        let config = GenericPoolConfig::new()
            .with_min_idle(2)
            .with_eviction_policy(EvictionPolicy::IdleTimeout(Duration::from_secs(5)));
        let pool = GenericPool::with_clock(factory, config, clock.clone()).unwrap();

        clock.advance(Duration::from_secs(6));
        pool.evict();
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.num_idle(), 2);
        assert_eq!(pool.stats().created, 4);
    }

    #[test]
    fn background_evictor_runs() {
        let (factory, destroyed) = counting(false);
        let clock = Arc::new(ManualClock::new());
        let config = GenericPoolConfig::new()
            .with_min_idle(1)
            .with_eviction_interval(Duration::from_millis(10))
            .with_eviction_policy(EvictionPolicy::TimeToLive(Duration::from_secs(1)));
        let pool = GenericPool::with_clock(factory, config, clock.clone()).unwrap();

        clock.advance(Duration::from_secs(2));
        let deadline = Instant::now() + Duration::from_secs(5);
        while destroyed.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(destroyed.load(Ordering::SeqCst) >= 1);
        pool.close();
    }

    #[test]
    fn clear_keeps_pool_open() {
        let (pool, destroyed) = pool(GenericPoolConfig::new().with_min_idle(2));
        pool.clear();
        assert_eq!(pool.num_idle(), 0);
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
        assert!(!pool.is_closed());
        assert!(pool.get_object().is_ok());
    }

    #[test]
    fn close_destroys_idle_and_late_returns() {
        let (pool, destroyed) = pool(GenericPoolConfig::new().with_min_idle(2));
        let borrowed = pool.get_object().unwrap();
        pool.close();
        pool.close();
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert!(matches!(pool.get_object(), Err(PoolError::Closed)));

        pool.return_object(borrowed);
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.total_size(), 0);
    }

    #[test]
    fn creation_failure_frees_capacity() {
        let attempts = AtomicUsize::new(0);
        let factory = crate::factory_fn(move || -> Result<usize, FactoryError> {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("first connect fails".into())
            } else {
                Ok(9)
            }
        });
        let pool = GenericPool::new(factory, GenericPoolConfig::new().with_max_total(1)).unwrap();
        assert!(matches!(pool.get_object(), Err(PoolError::Creation(_))));
        assert_eq!(*pool.get_object().unwrap(), 9);
    }

    #[test]
    fn invalidate_and_detach_release_capacity() {
        let (pool, destroyed) = pool(
            GenericPoolConfig::new()
                .with_max_total(1)
                .with_max_wait(Duration::ZERO),
        );
        let obj = pool.get_object().unwrap();
        pool.invalidate_object(obj);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);

        let obj = pool.get_object().unwrap();
        assert_eq!(pool.detach(obj), 2);
        assert_eq!(*pool.get_object().unwrap(), 3);
    }

    struct SlowCreate {
        creating: Arc<AtomicBool>,
        destroyed: Arc<AtomicUsize>,
    }

    impl ObjectFactory<usize> for SlowCreate {
        fn create(&self) -> Result<usize, FactoryError> {
            self.creating.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            Ok(7)
        }

        fn destroy(&self, _obj: usize) -> Result<(), FactoryError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn close_during_creation_fails_the_borrow() {
        let creating = Arc::new(AtomicBool::new(false));
        let destroyed = Arc::new(AtomicUsize::new(0));
        let factory = SlowCreate {
            creating: Arc::clone(&creating),
            destroyed: Arc::clone(&destroyed),
        };
        let pool = Arc::new(GenericPool::new(factory, GenericPoolConfig::new()).unwrap());

        let borrower = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || pool.get_object().map(|obj| *obj))
        };
        while !creating.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }

        pool.close();
        assert!(pool.is_closed());
        assert!(matches!(borrower.join().unwrap(), Err(PoolError::Closed)));
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.num_active(), 0);
        assert_eq!(pool.stats().borrowed, 0);
    }

    #[tokio::test]
    async fn async_borrow_waits_for_return() {
        let (pool, _) = pool(
            GenericPoolConfig::new()
                .with_max_total(1)
                .with_max_wait(Duration::from_secs(2)),
        );
        let pool = Arc::new(pool);
        let held = pool.get_object().unwrap();

        let returner = Arc::clone(&pool);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            returner.return_object(held);
        });

        let obj = pool.get_object_async().await.unwrap();
        assert_eq!(*obj, 1);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn async_borrow_times_out() {
        let (pool, _) = pool(
            GenericPoolConfig::new()
                .with_max_total(1)
                .with_max_wait(Duration::from_millis(40)),
        );
        let _held = pool.get_object().unwrap();
        let err = pool.get_object_async().await.unwrap_err();
        assert!(matches!(err, PoolError::Timeout(_)));
    }

    #[tokio::test]
    async fn async_borrow_without_max_wait_keeps_waiting() {
        let (pool, _) = pool(
            GenericPoolConfig::new()
                .with_max_total(1)
                .without_max_wait(),
        );
        let pool = Arc::new(pool);
        let held = pool.get_object().unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.get_object_async().await.map(|obj| *obj) })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        pool.return_object(held);
        assert_eq!(waiter.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn async_borrow_fails_fast_when_not_blocking() {
        let (pool, _) = pool(
            GenericPoolConfig::new()
                .with_max_total(1)
                .with_block_when_exhausted(false),
        );
        let _held = pool.get_object().unwrap();
        let err = pool.get_object_async().await.unwrap_err();
        assert!(matches!(err, PoolError::PoolExhausted));
    }

    #[test]
    fn close_summary_includes_close_time_destroys() {
        let (pool, _) = pool(GenericPoolConfig::new().with_min_idle(2));
        let _held = pool.get_object().unwrap();

        let summary = pool.shut_down().unwrap();
        assert_eq!(summary.destroyed, 1);
        assert_eq!(summary.idle, 1);
        assert_eq!(summary.active, 1);
        assert!(pool.shut_down().is_none());
    }
}
