//! # Esox Pooling
//!
//! Generic, thread-safe object pools and per-key lock striping.
//!
//! ## Pools
//!
//! - [`SimplePool`]: unbounded reuse queue, never blocks
//! - [`RoundRobinPool`]: fixed set of shared objects dispatched in cyclic order
//! - [`GenericPool`]: bounded engine with fair queuing, validation and eviction
//! - [`ExpiryPool`]: bounded pool whose objects expire a fixed time after creation
//!
//! All of them implement [`Pool`] and get their objects from an
//! [`ObjectFactory`]. [`build_pool`] picks a variant at runtime.
//!
//! ## Lock striping
//!
//! [`MutexFactory`] hands out one lock per key and reclaims locks nobody
//! holds any more.
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_pooling::{factory_fn, Pool, SimplePool};
//!
//! let pool = SimplePool::new(factory_fn(|| Ok(Vec::<u8>::with_capacity(1024))));
//! {
//!     let mut buf = pool.lease().unwrap();
//!     buf.extend_from_slice(b"hello");
//!     // Buffer automatically returned when `buf` goes out of scope
//! }
//! assert_eq!(pool.num_idle(), 1);
//! ```

mod clock;
mod errors;
mod eviction;
mod expiry;
mod factory;
mod generic;
mod mutex_factory;
mod pool;
mod round_robin;
mod simple;
mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{FactoryError, PoolError, PoolResult};
pub use eviction::EvictionPolicy;
pub use expiry::{DEFAULT_EXPIRY, ExpiryObjectFactory, ExpiryPool, ExpiryPoolBuilder, ExpiryPoolConfig};
pub use factory::{EntryInfo, FnFactory, ObjectFactory, factory_fn};
pub use generic::{GenericPool, GenericPoolConfig};
pub use mutex_factory::{DEFAULT_SWEEP_INTERVAL, KeyedMutex, MutexFactory};
pub use pool::{Pool, PoolStrategy, Pooled, PooledObject, build_pool};
pub use round_robin::{RoundRobinPool, default_round_robin_size};
pub use simple::SimplePool;
pub use stats::PoolStats;
