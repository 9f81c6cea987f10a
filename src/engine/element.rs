//! Element Module
//!
//! The engine's unit of storage: key, shared value and access metadata.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;

// == Expiry Policy ==
/// Idle and live timeouts applied to every element of a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// Maximum time since last access
    pub time_to_idle: Option<Duration>,
    /// Maximum time since creation or last update
    pub time_to_live: Option<Duration>,
}

impl ExpiryPolicy {
    /// Derives the policy from a cache configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            time_to_idle: config.time_to_idle(),
            time_to_live: config.time_to_live(),
        }
    }

    /// True when neither dimension expires elements.
    pub fn is_eternal(&self) -> bool {
        self.time_to_idle.is_none() && self.time_to_live.is_none()
    }
}

// == Element ==
/// A stored key/value pair with engine metadata.
#[derive(Debug, Clone)]
pub struct Element<K, V> {
    key: K,
    value: Arc<V>,
    created_at: Instant,
    last_accessed_at: Instant,
    hit_count: u64,
}

impl<K, V> Element<K, V> {
    // == Constructor ==
    /// Creates a new element owning `value`.
    pub fn new(key: K, value: V) -> Self {
        Self::from_shared(key, Arc::new(value))
    }

    /// Creates a new element around an already shared value.
    pub fn from_shared(key: K, value: Arc<V>) -> Self {
        let now = Instant::now();
        Self {
            key,
            value,
            created_at: now,
            last_accessed_at: now,
            hit_count: 0,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// The stored value handle, shared with every by-reference reader.
    pub fn shared_value(&self) -> &Arc<V> {
        &self.value
    }

    /// Creation or last update time.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> Instant {
        self.last_accessed_at
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    // == Touch ==
    /// Records a read of this element.
    pub(crate) fn touch(&mut self) {
        self.last_accessed_at = Instant::now();
        self.hit_count += 1;
    }

    // == Is Expired ==
    /// Checks expiry against the current time.
    pub fn is_expired(&self, policy: &ExpiryPolicy) -> bool {
        self.is_expired_at(policy, Instant::now())
    }

    /// Checks expiry at `now`.
    ///
    /// Boundary condition: an element is expired once the elapsed time is
    /// greater than or equal to the timeout, in either dimension.
    pub fn is_expired_at(&self, policy: &ExpiryPolicy, now: Instant) -> bool {
        self.time_to_expiry_at(policy, now)
            .map(|remaining| remaining.is_zero())
            .unwrap_or(false)
    }

    // == Time To Expiry ==
    /// Remaining lifetime at `now`, `None` under an eternal policy.
    ///
    /// A timeout too large to be represented as an instant never elapses.
    pub fn time_to_expiry_at(&self, policy: &ExpiryPolicy, now: Instant) -> Option<Duration> {
        let idle = policy
            .time_to_idle
            .and_then(|tti| self.last_accessed_at.checked_add(tti))
            .map(|deadline| deadline.saturating_duration_since(now));
        let live = policy
            .time_to_live
            .and_then(|ttl| self.created_at.checked_add(ttl))
            .map(|deadline| deadline.saturating_duration_since(now));

        match (idle, live) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
