//! Eviction policies and the per-entry metadata they read

use crate::factory::EntryInfo;
use std::time::{Duration, Instant};

/// Time-based eviction policy applied by [`GenericPool`](crate::GenericPool).
///
/// An entry is expired once the relevant age reaches the limit, so an entry
/// exactly `ttl` old no longer validates.
///
/// # Examples
///
/// ```
/// use esox_pooling::EvictionPolicy;
/// use std::time::{Duration, Instant};
///
/// let policy = EvictionPolicy::TimeToLive(Duration::from_secs(60));
/// let created = Instant::now();
/// assert!(!policy.is_expired(created, created, created + Duration::from_secs(59)));
/// assert!(policy.is_expired(created, created, created + Duration::from_secs(60)));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EvictionPolicy {
    /// No eviction
    #[default]
    None,

    /// Objects expire a fixed duration after creation
    TimeToLive(Duration),

    /// Objects expire after sitting idle for the duration
    IdleTimeout(Duration),

    /// TTL or idle timeout, whichever comes first
    Combined {
        ttl: Duration,
        idle_timeout: Duration,
    },
}

impl EvictionPolicy {
    pub fn is_expired(&self, created_at: Instant, last_returned: Instant, now: Instant) -> bool {
        let age = now.saturating_duration_since(created_at);
        let idle = now.saturating_duration_since(last_returned);
        match *self {
            EvictionPolicy::None => false,
            EvictionPolicy::TimeToLive(ttl) => age >= ttl,
            EvictionPolicy::IdleTimeout(timeout) => idle >= timeout,
            EvictionPolicy::Combined { ttl, idle_timeout } => age >= ttl || idle >= idle_timeout,
        }
    }
}

/// A pooled object plus the timestamps eviction needs. Never leaves the pool.
#[derive(Debug)]
pub(crate) struct PooledEntry<T> {
    pub value: T,
    pub created_at: Instant,
    pub last_returned: Instant,
}

impl<T> PooledEntry<T> {
    pub fn new(value: T, now: Instant) -> Self {
        Self {
            value,
            created_at: now,
            last_returned: now,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_returned = now;
    }

    pub fn info(&self) -> EntryInfo {
        EntryInfo::new(self.created_at, self.last_returned)
    }

    pub fn is_expired(&self, policy: &EvictionPolicy, now: Instant) -> bool {
        policy.is_expired(self.created_at, self.last_returned, now)
    }
}
