//! Redis counter store for multi-instance deployments.
//!
//! Multi-step sequences run as Lua scripts so they execute atomically on the
//! server. Every call is bounded by the configured operation timeout; a
//! timeout surfaces as [`StoreError::Timeout`].

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::{RedisResult, Script};
use router_core::CounterStoreConfig;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::counter::{
    CounterStore, CounterStoreStats, Release, SlotKeys, SlotRequest, SlotReservation,
};
use crate::error::{StoreError, StoreResult};

/// KEYS: rate, concurrent, rate_limit, concurrency_limit, last_reset
/// ARGV: current minute, default rate limit, default concurrency limit,
///       rate ttl secs, concurrency ttl secs
static RESERVE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local minute = tonumber(ARGV[1])
local last_reset = tonumber(redis.call('GET', KEYS[5]) or '0')
if minute > last_reset then
  redis.call('SET', KEYS[1], 0, 'EX', ARGV[4])
  redis.call('SET', KEYS[5], minute, 'EX', ARGV[4])
end

local rate = tonumber(redis.call('GET', KEYS[1]) or '0')
local rate_limit = tonumber(redis.call('GET', KEYS[3]) or ARGV[2])
if rate >= rate_limit then
  return {0, rate, rate_limit}
end

local concurrent = tonumber(redis.call('GET', KEYS[2]) or '0')
local max_concurrent = tonumber(redis.call('GET', KEYS[4]) or ARGV[3])
if concurrent >= max_concurrent then
  return {-1, concurrent, max_concurrent}
end

rate = redis.call('INCR', KEYS[1])
concurrent = redis.call('INCR', KEYS[2])
redis.call('EXPIRE', KEYS[1], ARGV[4])
redis.call('EXPIRE', KEYS[2], ARGV[5])
return {1, rate, concurrent}
",
    )
});

static RELEASE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local v = redis.call('DECR', KEYS[1])
if v < 0 then
  redis.call('SET', KEYS[1], 0, 'EX', ARGV[1])
  return {0, 1}
end
return {v, 0}
",
    )
});

/// Redis-backed counter store
pub struct RedisCounterStore {
    connection: ConnectionManager,
    key_prefix: String,
    timeout: Duration,
    stats: Arc<CounterStoreStats>,
}

impl RedisCounterStore {
    /// Connect using the store configuration
    ///
    /// # Errors
    /// Returns error if the URL is missing or invalid, or the server is unreachable
    pub async fn connect(config: &CounterStoreConfig) -> StoreResult<Self> {
        let url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| StoreError::Config("redis_url is required".to_string()))?;

        let client = redis::Client::open(url).map_err(|e| StoreError::Config(e.to_string()))?;
        let connection = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "connect",
                after: config.connect_timeout,
            })??;

        info!(
            prefix = %config.key_prefix,
            timeout_ms = config.operation_timeout.as_millis() as u64,
            "Redis counter store connected"
        );

        Ok(Self {
            connection,
            key_prefix: config.key_prefix.clone(),
            timeout: config.operation_timeout,
            stats: Arc::new(CounterStoreStats::default()),
        })
    }

    /// Operation counters
    #[must_use]
    pub fn stats(&self) -> Arc<CounterStoreStats> {
        Arc::clone(&self.stats)
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(&self.key_prefix)
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(key)
    }

    async fn run<T, F>(&self, operation: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => {
                self.stats.record_operation();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.stats.record_error();
                warn!(operation, error = %e, "Redis command failed");
                Err(e.into())
            }
            Err(_) => {
                self.stats.record_timeout();
                warn!(operation, timeout_ms = self.timeout.as_millis() as u64, "Redis command timed out");
                Err(StoreError::Timeout {
                    operation,
                    after: self.timeout,
                })
            }
        }
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("key_prefix", &self.key_prefix)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let key = self.prefixed_key(key);
        let mut conn = self.connection.clone();
        self.run("get", async move {
            redis::cmd("GET").arg(&key).query_async(&mut conn).await
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        let key = self.prefixed_key(key);
        let mut conn = self.connection.clone();
        self.run("set", async move {
            let mut cmd = redis::cmd("SET");
            cmd.arg(&key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("EX").arg(ttl_secs(ttl));
            }
            cmd.query_async::<_, ()>(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn get_counters(&self, keys: &[String]) -> StoreResult<Vec<Option<i64>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = keys.iter().map(|k| self.prefixed_key(k)).collect();
        let mut conn = self.connection.clone();
        self.run("get_counters", async move {
            redis::cmd("MGET").arg(&keys).query_async(&mut conn).await
        })
        .await
    }

    async fn set_counters(
        &self,
        entries: &[(String, i64)],
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            let cmd = pipe.cmd("SET").arg(self.prefixed_key(key)).arg(*value);
            if let Some(ttl) = ttl {
                cmd.arg("EX").arg(ttl_secs(ttl));
            }
            pipe.ignore();
        }
        let mut conn = self.connection.clone();
        self.run("set_counters", async move { pipe.query_async(&mut conn).await })
            .await
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl: Option<Duration>) -> StoreResult<i64> {
        let key = self.prefixed_key(key);
        let mut conn = self.connection.clone();
        let (value,): (i64,) = self
            .run("incr_by", async move {
                let mut pipe = redis::pipe();
                pipe.atomic().cmd("INCRBY").arg(&key).arg(delta);
                if let Some(ttl) = ttl {
                    pipe.cmd("EXPIRE").arg(&key).arg(ttl_secs(ttl)).ignore();
                }
                let reply: (i64,) = pipe.query_async(&mut conn).await?;
                Ok(reply)
            })
            .await?;
        Ok(value)
    }

    async fn decr_clamped(&self, key: &str, ttl: Duration) -> StoreResult<Release> {
        let key = self.prefixed_key(key);
        let mut conn = self.connection.clone();
        let (value, clamped): (i64, i64) = self
            .run("decr_clamped", async move {
                RELEASE_SCRIPT
                    .key(&key)
                    .arg(ttl_secs(ttl))
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;
        Ok(Release {
            value,
            clamped: clamped == 1,
        })
    }

    async fn hash_incr(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        ttl: Duration,
    ) -> StoreResult<i64> {
        let key = self.prefixed_key(key);
        let field = field.to_string();
        let mut conn = self.connection.clone();
        let (value,): (i64,) = self
            .run("hash_incr", async move {
                redis::pipe()
                    .atomic()
                    .cmd("HINCRBY")
                    .arg(&key)
                    .arg(&field)
                    .arg(delta)
                    .cmd("EXPIRE")
                    .arg(&key)
                    .arg(ttl_secs(ttl))
                    .ignore()
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(value)
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, i64>> {
        let key = self.prefixed_key(key);
        let mut conn = self.connection.clone();
        self.run("hash_get_all", async move {
            redis::cmd("HGETALL").arg(&key).query_async(&mut conn).await
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let keys: Vec<String> = keys.iter().map(|k| self.prefixed_key(k)).collect();
        let mut conn = self.connection.clone();
        self.run("delete", async move {
            redis::cmd("DEL").arg(&keys).query_async(&mut conn).await
        })
        .await
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let pattern = self.prefixed_key(pattern);
        let mut conn = self.connection.clone();
        let found: Vec<String> = self
            .run("keys", async move {
                let mut cursor: u64 = 0;
                let mut found = Vec::new();
                loop {
                    let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(500)
                        .query_async(&mut conn)
                        .await?;
                    found.extend(batch);
                    if next == 0 {
                        break;
                    }
                    cursor = next;
                }
                Ok(found)
            })
            .await?;

        let mut keys: Vec<String> = found
            .iter()
            .map(|k| self.strip_prefix(k).to_string())
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn reserve_slot(
        &self,
        keys: &SlotKeys,
        request: &SlotRequest,
    ) -> StoreResult<SlotReservation> {
        let prefixed: Vec<String> = keys
            .as_array()
            .iter()
            .map(|k| self.prefixed_key(k))
            .collect();
        let request = *request;
        let mut conn = self.connection.clone();

        let (status, a, b): (i64, i64, i64) = self
            .run("reserve_slot", async move {
                let mut invocation = RESERVE_SCRIPT.prepare_invoke();
                for key in &prefixed {
                    invocation.key(key);
                }
                let reply: (i64, i64, i64) = invocation
                    .arg(request.current_minute())
                    .arg(request.default_rate_limit)
                    .arg(request.default_concurrency_limit)
                    .arg(ttl_secs(request.rate_ttl))
                    .arg(ttl_secs(request.concurrency_ttl))
                    .invoke_async(&mut conn)
                    .await?;
                Ok(reply)
            })
            .await?;

        let outcome = match status {
            1 => SlotReservation::Reserved {
                rate_count: a,
                concurrent: b,
            },
            0 => SlotReservation::RateLimited {
                current: a,
                limit: b,
            },
            -1 => SlotReservation::ConcurrencyLimited {
                current: a,
                limit: b,
            },
            other => {
                return Err(StoreError::backend(format!(
                    "unexpected reservation status {other}"
                )))
            }
        };

        debug!(key = %keys.rate, ?outcome, "Redis slot reservation");
        Ok(outcome)
    }

    async fn health_check(&self) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let pong: String = self
            .run("health_check", async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::backend(format!("unexpected PING reply: {pong}")))
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }

    fn is_distributed(&self) -> bool {
        true
    }
}
