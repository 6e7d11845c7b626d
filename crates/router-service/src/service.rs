//! Routing service.

use futures::future::join_all;
use router_cache::CacheManager;
use router_core::{
    ensure_scalar_map, BanditArm, Budget, BudgetStatus, CacheRequest, CacheResponse, ConfigMap,
    EstimatorTables, OrgId, PeriodType, ProviderConfig, ProviderKey, QuotaStatus, RouterError,
    RouterResult, RoutingRequest, RoutingResponse,
};
use router_limits::{BudgetManager, QuotaManager};
use router_selection::{calculate_reward, SelectionEngine};
use router_store::{CounterStore, LedgerStore, SqlLedgerStore};
use router_telemetry::RouterMetrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::outcome::{UsageOutcome, UsageReport};

const LEDGER: &str = "ledger";
const COUNTER: &str = "counter";

/// Cost-aware provider routing
pub struct RoutingService {
    pub(crate) ledger: Arc<dyn LedgerStore>,
    pub(crate) counters: Arc<dyn CounterStore>,
    pub(crate) budget: Arc<BudgetManager>,
    pub(crate) quota: Arc<QuotaManager>,
    pub(crate) cache: Arc<CacheManager>,
    pub(crate) engine: Arc<SelectionEngine>,
    pub(crate) metrics: RouterMetrics,
    pub(crate) sql: Option<Arc<SqlLedgerStore>>,
}

impl RoutingService {
    /// Budget manager
    #[must_use]
    pub fn budget(&self) -> &Arc<BudgetManager> {
        &self.budget
    }

    /// Quota manager
    #[must_use]
    pub fn quota(&self) -> &Arc<QuotaManager> {
        &self.quota
    }

    /// Cache manager
    #[must_use]
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Selection engine
    #[must_use]
    pub fn engine(&self) -> &Arc<SelectionEngine> {
        &self.engine
    }

    /// Metrics
    #[must_use]
    pub fn metrics(&self) -> &RouterMetrics {
        &self.metrics
    }

    /// Choose a provider for a request and reserve its quota
    ///
    /// The caller owns one in-flight slot on the returned provider until it
    /// reports the outcome through [`RoutingService::record_usage`].
    ///
    /// # Errors
    /// - `BudgetExceeded` when the budget cannot cover the request
    /// - `NoEligibleProvider` when no enabled provider meets the tier
    /// - `NoCapacity` when every eligible provider is at quota
    /// - `StoreUnavailable` when a backing store fails
    #[instrument(
        skip(self, request),
        fields(org_id = %request.org_id, tier = %request.quality_tier)
    )]
    pub async fn route_request(&self, request: &RoutingRequest) -> RouterResult<RoutingResponse> {
        let started = Instant::now();
        let result = self.route(request).await;
        let outcome = match &result {
            Ok(_) => "routed",
            Err(e) => e.code(),
        };
        if let Err(RouterError::StoreUnavailable { store, .. }) = &result {
            self.metrics.record_store_error(store);
        }
        self.metrics.record_route(outcome, started.elapsed());
        result
    }

    async fn route(&self, request: &RoutingRequest) -> RouterResult<RoutingResponse> {
        request.validate()?;
        let org_id = request.org_id;
        let requested = request.requested_cents();

        let status = self.budget.check_budget(org_id, requested).await?;
        if status.is_exceeded() {
            info!(
                spent_cents = status.spent_cents,
                limit_cents = status.limit_cents,
                requested_cents = requested,
                "Request rejected by budget"
            );
            return Err(RouterError::budget_exceeded(
                status.budget_id,
                status.spent_cents,
                status.limit_cents,
                requested,
            ));
        }

        let providers = self
            .ledger
            .list_providers(org_id, true)
            .await
            .map_err(|e| e.into_router_error(LEDGER))?;
        let eligible = self.engine.eligible(providers, request.quality_tier);
        if eligible.is_empty() {
            return Err(RouterError::NoEligibleProvider {
                tier: request.quality_tier,
            });
        }

        let candidates = eligible.len();
        let available = self.with_headroom(eligible).await?;
        if available.is_empty() {
            return Err(RouterError::NoCapacity { candidates });
        }

        let available_cents = match request.budget_cents {
            Some(cents) if cents > 0 => cents,
            _ => status.remaining_cents,
        };
        let ranked = self.engine.rank(available, request, available_cents);

        let scope = org_id.to_string();
        let selection = self.engine.select(&scope, ranked).await?;

        for index in selection.fallback_order() {
            let candidate = &selection.ranked[index];
            match self.quota.reserve_provider(&candidate.provider).await {
                Ok(()) => {
                    let key = candidate.key();
                    if let Err(e) = self.engine.commit(&scope, &key).await {
                        warn!(provider = %key, error = %e, "Failed to record arm pull");
                    }
                    let response = self.engine.into_response(&selection, index);
                    info!(
                        provider = %key,
                        estimated_cost_cents = response.estimated_cost_cents,
                        confidence = response.confidence,
                        forced = selection.forced && index == selection.chosen,
                        fallback = index != selection.chosen,
                        "Request routed"
                    );
                    return Ok(response);
                }
                Err(RouterError::ReservationRaceLost {
                    provider,
                    model,
                    reason,
                }) => {
                    debug!(provider, model, reason, "Reservation lost, trying next candidate");
                    self.metrics
                        .record_quota_rejection(&provider, &model, &reason);
                }
                Err(e) => return Err(e),
            }
        }

        Err(RouterError::NoCapacity { candidates })
    }

    /// Providers whose rate and concurrency counters both have room
    ///
    /// A store failure skips that provider; if every check failed the
    /// first failure is returned as `StoreUnavailable`.
    async fn with_headroom(&self, eligible: Vec<ProviderConfig>) -> RouterResult<Vec<ProviderConfig>> {
        let checks = join_all(eligible.iter().map(|p| self.quota.check_provider(p))).await;

        let total = eligible.len();
        let mut failures = Vec::new();
        let mut available = Vec::with_capacity(total);
        for (provider, check) in eligible.into_iter().zip(checks) {
            match check {
                Ok(status) if status.has_headroom() => available.push(provider),
                Ok(status) => debug!(
                    provider = %provider.key(),
                    current_qps = status.current_qps,
                    limit_qps = status.limit_qps,
                    concurrent_calls = status.concurrent_calls,
                    max_concurrent = status.max_concurrent,
                    "Provider at quota"
                ),
                Err(e) => {
                    warn!(provider = %provider.key(), error = %e, "Quota check failed, skipping provider");
                    self.metrics.record_store_error(COUNTER);
                    failures.push(e);
                }
            }
        }

        if failures.len() == total {
            let first = failures.swap_remove(0);
            return Err(match first {
                e @ RouterError::StoreUnavailable { .. } => e,
                other => RouterError::store_unavailable(COUNTER, other.to_string()),
            });
        }
        Ok(available)
    }

    /// Apply the outcome of a routed call
    ///
    /// Spend, quota release and the bandit reward are all attempted; the
    /// first failure is returned.
    ///
    /// # Errors
    /// Returns error if the report is invalid or a store fails
    #[instrument(
        skip(self, report),
        fields(org_id = %report.org_id, provider = %report.key(), success = report.success)
    )]
    pub async fn record_usage(&self, report: &UsageReport) -> RouterResult<UsageOutcome> {
        report.validate()?;
        let org_id = report.org_id;

        let budget = self
            .budget
            .record_spending(org_id, report.actual_cost_cents)
            .await;
        let released = self
            .quota
            .record_usage(
                org_id,
                &report.provider_name,
                &report.model_name,
                report.tokens_used,
            )
            .await;

        let reward = calculate_reward(&report.reward_input());
        self.metrics.record_reward(reward);
        let arm = self
            .engine
            .update_reward(&org_id.to_string(), &report.key(), reward)
            .await;

        if let Err(e) = &released {
            warn!(error = %e, "Failed to release quota");
        }
        let budget = budget?;
        released?;
        let arm = arm?;

        debug!(
            spent_cents = budget.spent_cents,
            reward,
            average_reward = arm.average_reward,
            "Usage recorded"
        );
        Ok(UsageOutcome { budget, reward, arm })
    }

    /// Look up a cached response
    ///
    /// # Errors
    /// Returns error if the counter store fails
    pub async fn cache_get(
        &self,
        org_id: OrgId,
        prompt_hash: &str,
        input_hash: &str,
    ) -> RouterResult<CacheResponse> {
        let response = self.cache.get(org_id, prompt_hash, input_hash).await?;
        self.metrics.record_cache_lookup(response.hit);
        Ok(response)
    }

    /// Store a response, returning whether it was written
    ///
    /// # Errors
    /// Returns error if the counter store fails
    pub async fn cache_put(&self, org_id: OrgId, request: &CacheRequest) -> RouterResult<bool> {
        self.cache.put(org_id, request).await
    }

    /// Budget status with nothing requested
    ///
    /// # Errors
    /// Returns error if the ledger fails
    pub async fn get_budget_status(&self, org_id: OrgId) -> RouterResult<BudgetStatus> {
        self.budget.get_status(org_id).await
    }

    /// Create a budget for the current period
    ///
    /// # Errors
    /// Returns error if the limit is negative or the ledger fails
    pub async fn create_budget(
        &self,
        org_id: OrgId,
        project_id: Option<Uuid>,
        period_type: PeriodType,
        limit_cents: i64,
    ) -> RouterResult<Budget> {
        self.budget
            .create_budget(org_id, project_id, period_type, limit_cents)
            .await
    }

    /// Quota status of every provider of an organization
    ///
    /// # Errors
    /// Returns error if a store fails
    pub async fn get_quota_status(&self, org_id: OrgId) -> RouterResult<Vec<QuotaStatus>> {
        let providers = self.list_providers(org_id, false).await?;
        join_all(providers.iter().map(|p| self.quota.check_provider(p)))
            .await
            .into_iter()
            .collect()
    }

    /// Providers of an organization
    ///
    /// # Errors
    /// Returns error if the ledger fails
    pub async fn list_providers(
        &self,
        org_id: OrgId,
        enabled_only: bool,
    ) -> RouterResult<Vec<ProviderConfig>> {
        self.ledger
            .list_providers(org_id, enabled_only)
            .await
            .map_err(|e| e.into_router_error(LEDGER))
    }

    /// Insert or replace a provider
    ///
    /// # Errors
    /// Returns error if the provider is invalid or the ledger fails
    #[instrument(skip(self, provider), fields(org_id = %provider.org_id, provider = %provider.key()))]
    pub async fn upsert_provider(&self, provider: &ProviderConfig) -> RouterResult<()> {
        validate_provider(provider)?;
        self.ledger
            .upsert_provider(provider)
            .await
            .map_err(|e| e.into_router_error(LEDGER))?;
        info!("Provider saved");
        Ok(())
    }

    /// Replace a provider's configuration map
    ///
    /// # Errors
    /// Returns error if a value is not a scalar, the provider is unknown or
    /// the ledger fails
    #[instrument(skip(self, config), fields(org_id = %org_id))]
    pub async fn update_provider_config(
        &self,
        org_id: OrgId,
        provider_name: &str,
        model_name: &str,
        config: &ConfigMap,
    ) -> RouterResult<()> {
        ensure_scalar_map(config)?;
        self.ledger
            .update_provider_config(org_id, provider_name, model_name, config)
            .await
            .map_err(|e| e.into_router_error(LEDGER))?;
        info!(keys = config.len(), "Provider config updated");
        Ok(())
    }

    /// Decay bandit rewards of an organization
    ///
    /// # Errors
    /// Returns error if the factor is out of range or the arm store fails
    pub async fn decay_rewards(&self, org_id: OrgId, factor: Option<f64>) -> RouterResult<Vec<BanditArm>> {
        self.engine.decay(&org_id.to_string(), factor).await
    }

    /// Bandit arms of an organization
    ///
    /// # Errors
    /// Returns error if the arm store fails
    pub async fn arm_stats(&self, org_id: OrgId) -> RouterResult<Vec<BanditArm>> {
        self.engine.arm_stats(&org_id.to_string()).await
    }

    /// Zero one arm of an organization
    ///
    /// # Errors
    /// Returns error if the arm store fails
    pub async fn reset_arm(&self, org_id: OrgId, key: &ProviderKey) -> RouterResult<BanditArm> {
        self.engine.reset_arm(&org_id.to_string(), key).await
    }

    /// Swap the estimator tables
    ///
    /// # Errors
    /// Returns error if the engine runs a custom scorer
    pub fn update_estimator_tables(&self, tables: EstimatorTables) -> RouterResult<()> {
        self.engine.update_tables(tables)
    }

    /// Check both stores
    ///
    /// # Errors
    /// Returns the first failing store
    pub async fn health_check(&self) -> RouterResult<()> {
        self.counters
            .health_check()
            .await
            .map_err(|e| e.into_router_error(COUNTER))?;
        self.ledger
            .health_check()
            .await
            .map_err(|e| e.into_router_error(LEDGER))
    }

    /// Close database connections
    pub async fn shutdown(&self) {
        if let Some(sql) = &self.sql {
            sql.pool().close().await;
        }
        info!("Routing service stopped");
    }
}

fn validate_provider(provider: &ProviderConfig) -> RouterResult<()> {
    if provider.provider_name.trim().is_empty() || provider.model_name.trim().is_empty() {
        return Err(RouterError::validation(
            "provider and model names are required",
            Some("provider_name".to_string()),
            "missing_provider",
        ));
    }
    if provider.cost_per_token_prompt < 0.0 || provider.cost_per_token_completion < 0.0 {
        return Err(RouterError::validation(
            "per-token prices must not be negative",
            Some("cost_per_token_prompt".to_string()),
            "negative_price",
        ));
    }
    if provider.qps_limit <= 0 {
        return Err(RouterError::validation(
            format!("qps_limit must be positive, got {}", provider.qps_limit),
            Some("qps_limit".to_string()),
            "invalid_qps_limit",
        ));
    }
    ensure_scalar_map(&provider.config)
}

impl std::fmt::Debug for RoutingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingService")
            .field("ledger", &self.ledger.name())
            .field("counters", &self.counters.name())
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
