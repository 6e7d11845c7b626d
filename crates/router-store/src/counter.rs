//! Counter store abstraction.
//!
//! A counter store holds small integer counters, opaque byte values and
//! integer hashes, each with an optional expiry. Quota admission needs a
//! multi-key read-check-increment to be atomic, so that sequence is a
//! single trait method ([`CounterStore::reserve_slot`]) rather than being
//! composed from individual calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::StoreResult;

/// Keys touched by one quota reservation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotKeys {
    /// Requests admitted in the current minute
    pub rate: String,
    /// Requests in flight
    pub concurrent: String,
    /// Configured requests-per-minute ceiling
    pub rate_limit: String,
    /// Configured in-flight ceiling
    pub concurrency_limit: String,
    /// Start of the current minute window, in unix seconds
    pub last_reset: String,
}

impl SlotKeys {
    /// Derive all slot keys from a base key
    #[must_use]
    pub fn new(base: &str) -> Self {
        Self {
            rate: format!("{base}:qps"),
            concurrent: format!("{base}:concurrent"),
            rate_limit: format!("{base}:limit"),
            concurrency_limit: format!("{base}:max_concurrent"),
            last_reset: format!("{base}:last_reset"),
        }
    }

    /// Keys in the order the reservation reads them
    #[must_use]
    pub fn as_array(&self) -> [&str; 5] {
        [
            &self.rate,
            &self.concurrent,
            &self.rate_limit,
            &self.concurrency_limit,
            &self.last_reset,
        ]
    }
}

/// Parameters of one reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRequest {
    /// Current time in unix seconds
    pub now_secs: i64,
    /// Ceiling used when no rate limit key is set
    pub default_rate_limit: i64,
    /// Ceiling used when no concurrency limit key is set
    pub default_concurrency_limit: i64,
    /// Expiry applied to the rate counter
    pub rate_ttl: Duration,
    /// Expiry applied to the in-flight counter
    pub concurrency_ttl: Duration,
}

impl SlotRequest {
    /// Start of the minute containing `now_secs`
    #[must_use]
    pub fn current_minute(&self) -> i64 {
        self.now_secs.div_euclid(60) * 60
    }
}

/// Outcome of a reservation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotReservation {
    /// Both counters were incremented
    Reserved {
        /// Rate counter after the increment
        rate_count: i64,
        /// In-flight counter after the increment
        concurrent: i64,
    },
    /// The minute counter is at its ceiling; nothing changed
    RateLimited {
        /// Current count
        current: i64,
        /// Ceiling
        limit: i64,
    },
    /// The in-flight counter is at its ceiling; nothing changed
    ConcurrencyLimited {
        /// Current count
        current: i64,
        /// Ceiling
        limit: i64,
    },
}

impl SlotReservation {
    /// Whether the slot was granted
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::Reserved { .. })
    }
}

/// Result of a clamped decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    /// Counter value after the decrement
    pub value: i64,
    /// Whether the counter went below zero and was reset to zero
    pub clamped: bool,
}

/// Counter store trait for polymorphic backends
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Get a raw value
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Set a raw value, with expiry when `ttl` is given
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()>;

    /// Read several integer counters; missing keys are `None`
    async fn get_counters(&self, keys: &[String]) -> StoreResult<Vec<Option<i64>>>;

    /// Set several integer counters, with expiry when `ttl` is given
    async fn set_counters(&self, entries: &[(String, i64)], ttl: Option<Duration>)
        -> StoreResult<()>;

    /// Add to a counter and refresh its expiry
    async fn incr_by(&self, key: &str, delta: i64, ttl: Option<Duration>) -> StoreResult<i64>;

    /// Decrement a counter, resetting it to zero with `ttl` if it went negative
    async fn decr_clamped(&self, key: &str, ttl: Duration) -> StoreResult<Release>;

    /// Add to a hash field and refresh the hash expiry
    async fn hash_incr(&self, key: &str, field: &str, delta: i64, ttl: Duration)
        -> StoreResult<i64>;

    /// Read every field of an integer hash
    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, i64>>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;

    /// List live keys matching a glob pattern (`*` wildcard)
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Atomically roll the minute window, check both ceilings and take a slot
    async fn reserve_slot(&self, keys: &SlotKeys, request: &SlotRequest)
        -> StoreResult<SlotReservation>;

    /// Check if the backend is healthy
    async fn health_check(&self) -> StoreResult<()>;

    /// Get backend name for metrics
    fn name(&self) -> &'static str;

    /// Check if backend is shared across processes
    fn is_distributed(&self) -> bool;
}

/// Operation counters for a store
#[derive(Debug, Default)]
pub struct CounterStoreStats {
    operations: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
}

impl CounterStoreStats {
    /// Record a completed call
    pub fn record_operation(&self) {
        self.operations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed call
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a timed out call
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot as (operations, errors, timeouts)
    #[must_use]
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.operations.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
            self.timeouts.load(Ordering::Relaxed),
        )
    }
}

/// Match a key against a glob pattern where `*` matches any run of characters
#[must_use]
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };

    let segments: Vec<&str> = parts.collect();
    let Some((last, middle)) = segments.split_last() else {
        // no wildcard at all
        return rest.is_empty();
    };

    for segment in middle {
        match rest.find(segment) {
            Some(idx) => rest = &rest[idx + segment.len()..],
            None => return false,
        }
    }

    rest.len() >= last.len() && rest.ends_with(last)
}
