//! Response cache manager.
//!
//! Entries live under `cache:{org}:{prompt_hash}:{input_hash}` as JSON with
//! their own creation and expiry timestamps. The store-side expiry matches
//! the entry lifetime, and a read that finds an entry past its expiry
//! deletes it and counts a miss. Hit, miss and put counters are kept in the
//! `cache_stats:{org}` hash.

use chrono::{DateTime, Utc};
use router_core::{
    CacheConfig, CachePolicy, CacheRequest, CacheResponse, OrgId, QualityTier, RouterError,
    RouterResult, SharedClock, SystemClock,
};
use router_store::CounterStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::policy::{derive_policy, ContentTag};

const STORE: &str = "counter";
const HITS: &str = "hits";
const MISSES: &str = "misses";
const PUTS: &str = "puts";

/// Stored form of a cached response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry {
    /// The cached response
    pub response: serde_json::Value,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
    /// When the entry stops being served
    pub expires_at: DateTime<Utc>,
    /// Policy the entry was written under
    pub policy: CachePolicy,
}

impl CachedEntry {
    /// Whether the entry is past its expiry at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Cache statistics for one organization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that found a live entry
    pub hits: u64,
    /// Lookups that found nothing or an expired entry
    pub misses: u64,
    /// Entries written
    pub puts: u64,
    /// Hits over lookups, in percent
    pub hit_rate: f64,
    /// Entries currently stored
    pub size: u64,
}

impl CacheStats {
    fn from_counters(counters: &HashMap<String, i64>, size: u64) -> Self {
        let read = |field: &str| counters.get(field).copied().unwrap_or(0).max(0) as u64;
        let hits = read(HITS);
        let misses = read(MISSES);
        let lookups = hits + misses;
        Self {
            hits,
            misses,
            puts: read(PUTS),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                (hits as f64 / lookups as f64) * 100.0
            },
            size,
        }
    }
}

/// SHA-256 hex digest of a value's JSON form
pub fn generate_hash<T: Serialize + ?Sized>(value: &T) -> RouterResult<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Hashes become key segments, so only hex digits are accepted
fn check_hash(hash: &str, field: &str) -> RouterResult<()> {
    if hash.is_empty() || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(RouterError::validation(
            format!("{field} must be a non-empty hex digest"),
            Some(field.to_string()),
            "invalid_hash",
        ));
    }
    Ok(())
}

/// Response cache over a counter store
pub struct CacheManager {
    store: Arc<dyn CounterStore>,
    config: CacheConfig,
    clock: SharedClock,
}

impl CacheManager {
    /// Create a cache manager
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            clock: SystemClock::shared(),
        }
    }

    /// Use a specific clock
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Cache configuration
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn entry_key(org_id: OrgId, prompt_hash: &str, input_hash: &str) -> RouterResult<String> {
        check_hash(prompt_hash, "prompt_hash")?;
        check_hash(input_hash, "input_hash")?;
        Ok(format!("cache:{org_id}:{prompt_hash}:{input_hash}"))
    }

    fn stats_key(org_id: OrgId) -> String {
        format!("cache_stats:{org_id}")
    }

    fn org_pattern(org_id: OrgId) -> String {
        format!("cache:{org_id}:*")
    }

    async fn bump(&self, org_id: OrgId, field: &str) {
        let result = self
            .store
            .hash_incr(&Self::stats_key(org_id), field, 1, self.config.stats_ttl)
            .await;
        if let Err(e) = result {
            warn!(org_id = %org_id, field, error = %e, "Failed to update cache statistics");
        }
    }

    async fn evict(&self, key: &str) {
        if let Err(e) = self.store.delete(&[key.to_string()]).await {
            warn!(key, error = %e, "Failed to evict cache entry");
        }
    }

    /// Look up a cached response
    pub async fn get(
        &self,
        org_id: OrgId,
        prompt_hash: &str,
        input_hash: &str,
    ) -> RouterResult<CacheResponse> {
        if !self.config.enabled {
            return Ok(CacheResponse::miss());
        }

        let key = Self::entry_key(org_id, prompt_hash, input_hash)?;
        let data = self
            .store
            .get(&key)
            .await
            .map_err(|e| e.into_router_error(STORE))?;

        let Some(data) = data else {
            self.bump(org_id, MISSES).await;
            debug!(org_id = %org_id, "Cache miss");
            return Ok(CacheResponse::miss());
        };

        let entry = match serde_json::from_slice::<CachedEntry>(&data) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(org_id = %org_id, error = %e, "Failed to deserialize cache entry");
                self.evict(&key).await;
                self.bump(org_id, MISSES).await;
                return Ok(CacheResponse::miss());
            }
        };

        if entry.is_expired(self.clock.now()) {
            self.evict(&key).await;
            self.bump(org_id, MISSES).await;
            debug!(org_id = %org_id, expires_at = %entry.expires_at, "Cache entry expired");
            return Ok(CacheResponse::miss());
        }

        self.bump(org_id, HITS).await;
        debug!(org_id = %org_id, "Cache hit");
        Ok(CacheResponse {
            hit: true,
            response: Some(entry.response),
            created_at: Some(entry.created_at),
            expires_at: Some(entry.expires_at),
        })
    }

    /// Store a response, returning whether it was written
    pub async fn put(&self, org_id: OrgId, request: &CacheRequest) -> RouterResult<bool> {
        if !self.config.enabled || !request.policy.enabled {
            debug!(org_id = %org_id, "Caching disabled by policy");
            return Ok(false);
        }
        if !request.policy.privacy_level.is_cacheable() {
            debug!(
                org_id = %org_id,
                privacy = ?request.policy.privacy_level,
                "Privacy level not cacheable"
            );
            return Ok(false);
        }

        let ttl = self.ttl_for(request);
        let lifetime = chrono::Duration::from_std(ttl)
            .map_err(|e| RouterError::validation(e.to_string(), Some("ttl".into()), "invalid_ttl"))?;

        let created_at = self.clock.now();
        let entry = CachedEntry {
            response: request.response.clone(),
            created_at,
            expires_at: created_at + lifetime,
            policy: request.policy.clone(),
        };
        let data = serde_json::to_vec(&entry)?;

        let key = Self::entry_key(org_id, &request.prompt_hash, &request.input_hash)?;
        self.store
            .set(&key, data, Some(ttl))
            .await
            .map_err(|e| e.into_router_error(STORE))?;
        self.bump(org_id, PUTS).await;

        debug!(org_id = %org_id, ttl_secs = ttl.as_secs(), "Response cached");
        Ok(true)
    }

    /// Remove one entry, returning whether it existed
    pub async fn delete(
        &self,
        org_id: OrgId,
        prompt_hash: &str,
        input_hash: &str,
    ) -> RouterResult<bool> {
        let key = Self::entry_key(org_id, prompt_hash, input_hash)?;
        let removed = self
            .store
            .delete(&[key])
            .await
            .map_err(|e| e.into_router_error(STORE))?;
        Ok(removed > 0)
    }

    /// Remove every entry of an organization
    pub async fn clear(&self, org_id: OrgId) -> RouterResult<u64> {
        let keys = self
            .store
            .keys(&Self::org_pattern(org_id))
            .await
            .map_err(|e| e.into_router_error(STORE))?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = self
            .store
            .delete(&keys)
            .await
            .map_err(|e| e.into_router_error(STORE))?;
        info!(org_id = %org_id, removed, "Cache cleared");
        Ok(removed)
    }

    /// Statistics of an organization
    pub async fn stats(&self, org_id: OrgId) -> RouterResult<CacheStats> {
        let counters = self
            .store
            .hash_get_all(&Self::stats_key(org_id))
            .await
            .map_err(|e| e.into_router_error(STORE))?;
        let size = self
            .store
            .keys(&Self::org_pattern(org_id))
            .await
            .map_err(|e| e.into_router_error(STORE))?
            .len() as u64;
        Ok(CacheStats::from_counters(&counters, size))
    }

    /// Policy for a tier and content tag under this cache's configuration
    #[must_use]
    pub fn policy_for(&self, tier: Option<QualityTier>, tag: Option<ContentTag>) -> CachePolicy {
        derive_policy(&self.config, tier, tag)
    }

    /// Lifetime a request would be stored with
    #[must_use]
    pub fn ttl_for(&self, request: &CacheRequest) -> Duration {
        let ttl = request.effective_ttl();
        if ttl.is_zero() {
            self.config.default_ttl
        } else {
            ttl
        }
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("store", &self.store.name())
            .field("enabled", &self.config.enabled)
            .finish_non_exhaustive()
    }
}
