//! In-memory counter store for single-instance deployments and tests.
//!
//! All keys live in one map behind a single mutex, which makes every
//! multi-key operation (notably [`CounterStore::reserve_slot`]) one
//! critical section. Expiry is evaluated lazily against the injected clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use router_core::{SharedClock, SystemClock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::counter::{
    glob_match, CounterStore, CounterStoreStats, Release, SlotKeys, SlotRequest, SlotReservation,
};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Bytes(Vec<u8>),
    Hash(HashMap<String, i64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    fn as_int(&self) -> StoreResult<i64> {
        match &self.value {
            Value::Int(v) => Ok(*v),
            Value::Bytes(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| StoreError::backend("value is not an integer")),
            Value::Hash(_) => Err(StoreError::backend("wrong type: hash")),
        }
    }
}

struct Map<'a> {
    entries: &'a mut HashMap<String, Entry>,
    now: DateTime<Utc>,
}

impl Map<'_> {
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = self.now;
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
            return None;
        }
        self.entries.get_mut(key)
    }

    fn int(&mut self, key: &str) -> StoreResult<Option<i64>> {
        self.live(key).map(|e| e.as_int()).transpose()
    }

    fn put_int(&mut self, key: &str, value: i64) {
        match self.live(key) {
            // SET keeps no previous expiry
            Some(entry) => {
                entry.value = Value::Int(value);
                entry.expires_at = None;
            }
            None => {
                self.entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Int(value),
                        expires_at: None,
                    },
                );
            }
        }
    }

    fn incr(&mut self, key: &str, delta: i64) -> StoreResult<i64> {
        let next = self.int(key)?.unwrap_or(0) + delta;
        let expires_at = self.live(key).and_then(|e| e.expires_at);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Int(next),
                expires_at,
            },
        );
        Ok(next)
    }

    fn expire(&mut self, key: &str, ttl: Duration) {
        let at = self.deadline(ttl);
        if let Some(entry) = self.live(key) {
            entry.expires_at = Some(at);
        }
    }

    fn deadline(&self, ttl: Duration) -> DateTime<Utc> {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// In-memory counter store
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: SharedClock,
    stats: CounterStoreStats,
}

impl MemoryCounterStore {
    /// Create a store using the wall clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store using the given clock for expiry
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            stats: CounterStoreStats::default(),
        }
    }

    /// Number of live keys
    #[must_use]
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    /// Whether the store holds no live keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Operation counters
    #[must_use]
    pub fn stats(&self) -> &CounterStoreStats {
        &self.stats
    }

    fn with_map<T>(&self, f: impl FnOnce(&mut Map<'_>) -> StoreResult<T>) -> StoreResult<T> {
        let now = self.clock.now();
        let mut guard = self.entries.lock();
        let mut map = Map {
            entries: &mut guard,
            now,
        };
        let result = f(&mut map);
        drop(guard);

        if result.is_err() {
            self.stats.record_error();
        } else {
            self.stats.record_operation();
        }
        result
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCounterStore")
            .field("keys", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.with_map(|map| {
            Ok(map.live(key).and_then(|entry| match &entry.value {
                Value::Bytes(bytes) => Some(bytes.clone()),
                Value::Int(v) => Some(v.to_string().into_bytes()),
                Value::Hash(_) => None,
            }))
        })
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        self.with_map(|map| {
            let expires_at = ttl.map(|ttl| map.deadline(ttl));
            map.entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Bytes(value),
                    expires_at,
                },
            );
            Ok(())
        })
    }

    async fn get_counters(&self, keys: &[String]) -> StoreResult<Vec<Option<i64>>> {
        self.with_map(|map| keys.iter().map(|key| map.int(key)).collect())
    }

    async fn set_counters(
        &self,
        entries: &[(String, i64)],
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        self.with_map(|map| {
            for (key, value) in entries {
                map.put_int(key, *value);
                if let Some(ttl) = ttl {
                    map.expire(key, ttl);
                }
            }
            Ok(())
        })
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl: Option<Duration>) -> StoreResult<i64> {
        self.with_map(|map| {
            let value = map.incr(key, delta)?;
            if let Some(ttl) = ttl {
                map.expire(key, ttl);
            }
            Ok(value)
        })
    }

    async fn decr_clamped(&self, key: &str, ttl: Duration) -> StoreResult<Release> {
        self.with_map(|map| {
            let value = map.incr(key, -1)?;
            if value < 0 {
                map.put_int(key, 0);
                map.expire(key, ttl);
                return Ok(Release {
                    value: 0,
                    clamped: true,
                });
            }
            Ok(Release {
                value,
                clamped: false,
            })
        })
    }

    async fn hash_incr(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        ttl: Duration,
    ) -> StoreResult<i64> {
        self.with_map(|map| {
            let deadline = map.deadline(ttl);
            if map.live(key).is_none() {
                map.entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Hash(HashMap::new()),
                        expires_at: None,
                    },
                );
            }
            let entry = map
                .live(key)
                .ok_or_else(|| StoreError::backend("hash vanished during insert"))?;
            let Value::Hash(fields) = &mut entry.value else {
                return Err(StoreError::backend("wrong type: expected hash"));
            };
            let value = fields.entry(field.to_string()).or_insert(0);
            *value += delta;
            let value = *value;
            entry.expires_at = Some(deadline);
            Ok(value)
        })
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, i64>> {
        self.with_map(|map| match map.live(key) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.clone()),
            Some(_) => Err(StoreError::backend("wrong type: expected hash")),
        })
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        self.with_map(|map| {
            let mut removed = 0;
            for key in keys {
                if map.live(key).is_some() {
                    map.entries.remove(key);
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.with_map(|map| {
            let now = map.now;
            map.entries.retain(|_, entry| !entry.is_expired(now));
            let mut keys: Vec<String> = map
                .entries
                .keys()
                .filter(|key| glob_match(pattern, key))
                .cloned()
                .collect();
            keys.sort();
            Ok(keys)
        })
    }

    async fn reserve_slot(
        &self,
        keys: &SlotKeys,
        request: &SlotRequest,
    ) -> StoreResult<SlotReservation> {
        self.with_map(|map| {
            let minute = request.current_minute();
            let last_reset = map.int(&keys.last_reset)?.unwrap_or(0);
            if minute > last_reset {
                map.put_int(&keys.rate, 0);
                map.put_int(&keys.last_reset, minute);
                map.expire(&keys.rate, request.rate_ttl);
                map.expire(&keys.last_reset, request.rate_ttl);
            }

            let rate = map.int(&keys.rate)?.unwrap_or(0);
            let rate_limit = map
                .int(&keys.rate_limit)?
                .unwrap_or(request.default_rate_limit);
            if rate >= rate_limit {
                return Ok(SlotReservation::RateLimited {
                    current: rate,
                    limit: rate_limit,
                });
            }

            let concurrent = map.int(&keys.concurrent)?.unwrap_or(0);
            let concurrency_limit = map
                .int(&keys.concurrency_limit)?
                .unwrap_or(request.default_concurrency_limit);
            if concurrent >= concurrency_limit {
                return Ok(SlotReservation::ConcurrencyLimited {
                    current: concurrent,
                    limit: concurrency_limit,
                });
            }

            let rate_count = map.incr(&keys.rate, 1)?;
            let concurrent = map.incr(&keys.concurrent, 1)?;
            map.expire(&keys.rate, request.rate_ttl);
            map.expire(&keys.concurrent, request.concurrency_ttl);

            debug!(
                key = %keys.rate,
                rate_count,
                concurrent,
                "Reserved quota slot"
            );
            Ok(SlotReservation::Reserved {
                rate_count,
                concurrent,
            })
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_distributed(&self) -> bool {
        false
    }
}
