//! Quota manager.
//!
//! Every (organization, provider, model) triple owns a family of counters
//! under `quota:{org}:{provider}:{model}`:
//!
//! | suffix            | meaning                         | expiry        |
//! |-------------------|---------------------------------|---------------|
//! | `:qps`            | requests admitted this minute   | rate window   |
//! | `:concurrent`     | requests in flight              | concurrency   |
//! | `:limit`          | requests-per-minute ceiling     | none          |
//! | `:max_concurrent` | in-flight ceiling               | none          |
//! | `:last_reset`     | start of the current minute     | rate window   |
//! | `:usage`          | tokens consumed                 | usage window  |
//!
//! Reservation is a single atomic store call; release only ever touches
//! the in-flight counter.

use chrono::{DateTime, TimeZone, Utc};
use router_core::{
    OrgId, ProviderConfig, QuotaConfig, QuotaStatus, RouterError, RouterResult, SharedClock,
    SystemClock,
};
use router_store::{CounterStore, SlotKeys, SlotRequest, SlotReservation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const STORE: &str = "counter";

/// Token and request counters for one provider/model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    /// Tokens recorded in the usage window
    pub tokens_used: i64,
    /// Requests admitted in the current minute
    pub requests_this_minute: i64,
    /// Requests in flight
    pub concurrent_calls: i64,
}

/// Enforces per-provider rate and concurrency ceilings
pub struct QuotaManager {
    store: Arc<dyn CounterStore>,
    config: QuotaConfig,
    clock: SharedClock,
}

impl QuotaManager {
    /// Create a quota manager
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>, config: QuotaConfig) -> Self {
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

    /// Quota configuration
    #[must_use]
    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    fn base_key(org_id: OrgId, provider: &str, model: &str) -> String {
        format!("quota:{org_id}:{provider}:{model}")
    }

    fn usage_key(org_id: OrgId, provider: &str, model: &str) -> String {
        format!("{}:usage", Self::base_key(org_id, provider, model))
    }

    fn now_secs(&self) -> i64 {
        self.clock.now().timestamp()
    }

    fn minute_start(now_secs: i64) -> i64 {
        now_secs.div_euclid(60) * 60
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn provider_rpm(&self, provider: &ProviderConfig) -> i64 {
        if provider.qps_limit > 0 {
            provider.qps_limit
        } else {
            self.config.default_rpm
        }
    }

    async fn status_with_defaults(
        &self,
        org_id: OrgId,
        provider: &str,
        model: &str,
        default_rpm: i64,
    ) -> RouterResult<QuotaStatus> {
        let keys = SlotKeys::new(&Self::base_key(org_id, provider, model));
        let names: Vec<String> = keys.as_array().iter().map(ToString::to_string).collect();
        let values = self
            .store
            .get_counters(&names)
            .await
            .map_err(|e| e.into_router_error(STORE))?;
        let value = |i: usize| values.get(i).copied().flatten();

        let now_secs = self.now_secs();
        let minute = Self::minute_start(now_secs);
        // a stale window is reset by the next reservation
        let current_qps = match value(4) {
            Some(last_reset) if last_reset >= minute => value(0).unwrap_or(0),
            _ => 0,
        };
        let status = QuotaStatus {
            provider_name: provider.to_string(),
            model_name: model.to_string(),
            current_qps,
            limit_qps: value(2).unwrap_or(default_rpm),
            concurrent_calls: value(1).unwrap_or(0),
            max_concurrent: value(3).unwrap_or(self.config.default_max_concurrent),
            last_reset: Self::at(minute),
            next_reset: Self::at(minute + 60),
        };

        if status.current_qps > status.limit_qps || status.concurrent_calls > status.max_concurrent {
            warn!(
                org_id = %org_id,
                provider,
                model,
                current_qps = status.current_qps,
                limit_qps = status.limit_qps,
                concurrent_calls = status.concurrent_calls,
                max_concurrent = status.max_concurrent,
                "Quota counter above its limit"
            );
        }
        Ok(status)
    }

    async fn reserve_with_defaults(
        &self,
        org_id: OrgId,
        provider: &str,
        model: &str,
        default_rpm: i64,
    ) -> RouterResult<()> {
        let keys = SlotKeys::new(&Self::base_key(org_id, provider, model));
        let request = SlotRequest {
            now_secs: self.now_secs(),
            default_rate_limit: default_rpm,
            default_concurrency_limit: self.config.default_max_concurrent,
            rate_ttl: self.config.rate_window_ttl,
            concurrency_ttl: self.config.concurrency_ttl,
        };

        let outcome = self
            .store
            .reserve_slot(&keys, &request)
            .await
            .map_err(|e| e.into_router_error(STORE))?;

        match outcome {
            SlotReservation::Reserved {
                rate_count,
                concurrent,
            } => {
                debug!(
                    org_id = %org_id,
                    provider,
                    model,
                    rate_count,
                    concurrent,
                    "Quota reserved"
                );
                Ok(())
            }
            SlotReservation::RateLimited { current, limit } => {
                debug!(org_id = %org_id, provider, model, current, limit, "Rate limit reached");
                Err(RouterError::reservation_lost(provider, model, "rate limit"))
            }
            SlotReservation::ConcurrencyLimited { current, limit } => {
                debug!(org_id = %org_id, provider, model, current, limit, "Concurrency limit reached");
                Err(RouterError::reservation_lost(provider, model, "concurrency limit"))
            }
        }
    }

    /// Current counters and ceilings, without changing anything
    pub async fn check_quota(
        &self,
        org_id: OrgId,
        provider: &str,
        model: &str,
    ) -> RouterResult<QuotaStatus> {
        self.status_with_defaults(org_id, provider, model, self.config.default_rpm)
            .await
    }

    /// Like [`Self::check_quota`], defaulting the rate ceiling to the provider's own limit
    pub async fn check_provider(&self, provider: &ProviderConfig) -> RouterResult<QuotaStatus> {
        self.status_with_defaults(
            provider.org_id,
            &provider.provider_name,
            &provider.model_name,
            self.provider_rpm(provider),
        )
        .await
    }

    /// Take one rate slot and one in-flight slot
    ///
    /// A refused reservation is [`RouterError::ReservationRaceLost`]; the
    /// counters are unchanged in that case.
    pub async fn reserve_quota(&self, org_id: OrgId, provider: &str, model: &str) -> RouterResult<()> {
        self.reserve_with_defaults(org_id, provider, model, self.config.default_rpm)
            .await
    }

    /// Like [`Self::reserve_quota`], defaulting the rate ceiling to the provider's own limit
    pub async fn reserve_provider(&self, provider: &ProviderConfig) -> RouterResult<()> {
        self.reserve_with_defaults(
            provider.org_id,
            &provider.provider_name,
            &provider.model_name,
            self.provider_rpm(provider),
        )
        .await
    }

    /// Give back one in-flight slot
    pub async fn release_quota(&self, org_id: OrgId, provider: &str, model: &str) -> RouterResult<()> {
        let keys = SlotKeys::new(&Self::base_key(org_id, provider, model));
        let release = self
            .store
            .decr_clamped(&keys.concurrent, self.config.concurrency_ttl)
            .await
            .map_err(|e| e.into_router_error(STORE))?;

        if release.clamped {
            warn!(
                org_id = %org_id,
                provider,
                model,
                "In-flight counter went below zero and was reset"
            );
        } else {
            debug!(org_id = %org_id, provider, model, concurrent = release.value, "Quota released");
        }
        Ok(())
    }

    /// Add tokens to the usage counter, then release the in-flight slot
    pub async fn record_usage(
        &self,
        org_id: OrgId,
        provider: &str,
        model: &str,
        tokens: u64,
    ) -> RouterResult<()> {
        let tokens = i64::try_from(tokens).unwrap_or(i64::MAX);
        self.store
            .incr_by(
                &Self::usage_key(org_id, provider, model),
                tokens,
                Some(self.config.usage_ttl),
            )
            .await
            .map_err(|e| e.into_router_error(STORE))?;
        self.release_quota(org_id, provider, model).await
    }

    /// Configure both ceilings; limits never expire
    pub async fn set_quota_limits(
        &self,
        org_id: OrgId,
        provider: &str,
        model: &str,
        rpm: i64,
        max_concurrent: i64,
    ) -> RouterResult<()> {
        if rpm <= 0 || max_concurrent <= 0 {
            return Err(RouterError::validation(
                "quota limits must be positive",
                Some("limits".to_string()),
                "invalid_limit",
            ));
        }

        let keys = SlotKeys::new(&Self::base_key(org_id, provider, model));
        self.store
            .set_counters(
                &[(keys.rate_limit, rpm), (keys.concurrency_limit, max_concurrent)],
                None,
            )
            .await
            .map_err(|e| e.into_router_error(STORE))?;

        info!(org_id = %org_id, provider, model, rpm, max_concurrent, "Quota limits set");
        Ok(())
    }

    /// Clear the rate and in-flight counters and start a fresh window
    pub async fn reset_quota(&self, org_id: OrgId, provider: &str, model: &str) -> RouterResult<()> {
        let keys = SlotKeys::new(&Self::base_key(org_id, provider, model));
        self.store
            .delete(&[keys.rate.clone(), keys.concurrent.clone()])
            .await
            .map_err(|e| e.into_router_error(STORE))?;
        self.store
            .set_counters(
                &[(keys.last_reset, Self::minute_start(self.now_secs()))],
                Some(self.config.reset_marker_ttl),
            )
            .await
            .map_err(|e| e.into_router_error(STORE))?;

        info!(org_id = %org_id, provider, model, "Quota reset");
        Ok(())
    }

    /// Token and request counters
    pub async fn usage_stats(
        &self,
        org_id: OrgId,
        provider: &str,
        model: &str,
    ) -> RouterResult<QuotaUsage> {
        let status = self.check_quota(org_id, provider, model).await?;
        let usage = self
            .store
            .get_counters(&[Self::usage_key(org_id, provider, model)])
            .await
            .map_err(|e| e.into_router_error(STORE))?;

        Ok(QuotaUsage {
            tokens_used: usage.first().copied().flatten().unwrap_or(0),
            requests_this_minute: status.current_qps,
            concurrent_calls: status.concurrent_calls,
        })
    }

    /// Status of every provider/model with live counters for an organization
    pub async fn all_quota_status(&self, org_id: OrgId) -> RouterResult<Vec<QuotaStatus>> {
        let prefix = format!("quota:{org_id}:");
        let mut pairs = BTreeSet::new();
        for suffix in [":qps", ":concurrent", ":limit"] {
            let keys = self
                .store
                .keys(&format!("{prefix}*{suffix}"))
                .await
                .map_err(|e| e.into_router_error(STORE))?;
            for key in keys {
                let pair = key
                    .strip_prefix(&prefix)
                    .and_then(|rest| rest.strip_suffix(suffix))
                    .and_then(|rest| rest.split_once(':'));
                if let Some((provider, model)) = pair {
                    pairs.insert((provider.to_string(), model.to_string()));
                }
            }
        }

        let mut statuses = Vec::with_capacity(pairs.len());
        for (provider, model) in pairs {
            statuses.push(self.check_quota(org_id, &provider, &model).await?);
        }
        Ok(statuses)
    }
}

impl std::fmt::Debug for QuotaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaManager")
            .field("store", &self.store.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
