//! Prometheus metrics for routing decisions.

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

use crate::tracing_setup::TelemetryError;

const NAMESPACE: &str = "llm_router";

/// Router metrics registered on one registry
#[derive(Clone)]
pub struct RouterMetrics {
    registry: Registry,
    route_outcomes: IntCounterVec,
    route_duration: HistogramVec,
    quota_rejections: IntCounterVec,
    cache_lookups: IntCounterVec,
    budget_alerts: IntCounter,
    store_errors: IntCounterVec,
    rewards: Histogram,
}

impl RouterMetrics {
    /// Create metrics on a private registry
    ///
    /// # Errors
    /// Returns error if a metric cannot be created
    pub fn new() -> Result<Self, TelemetryError> {
        Self::with_registry(Registry::new())
    }

    /// Create metrics on a caller-supplied registry
    ///
    /// # Errors
    /// Returns error if a metric cannot be created or is already registered
    pub fn with_registry(registry: Registry) -> Result<Self, TelemetryError> {
        let route_outcomes = IntCounterVec::new(
            Opts::new("route_requests_total", "Routing requests by outcome").namespace(NAMESPACE),
            &["outcome"],
        )?;
        let route_duration = HistogramVec::new(
            HistogramOpts::new("route_duration_seconds", "Time spent deciding a route")
                .namespace(NAMESPACE)
                .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5]),
            &["outcome"],
        )?;
        let quota_rejections = IntCounterVec::new(
            Opts::new("quota_rejections_total", "Quota reservations refused")
                .namespace(NAMESPACE),
            &["provider", "model", "limit"],
        )?;
        let cache_lookups = IntCounterVec::new(
            Opts::new("cache_lookups_total", "Response cache lookups").namespace(NAMESPACE),
            &["result"],
        )?;
        let budget_alerts = IntCounter::with_opts(
            Opts::new("budget_alerts_total", "Budget exceeded alerts raised").namespace(NAMESPACE),
        )?;
        let store_errors = IntCounterVec::new(
            Opts::new("store_errors_total", "Backing store failures").namespace(NAMESPACE),
            &["store"],
        )?;
        let rewards = Histogram::with_opts(
            HistogramOpts::new("bandit_reward", "Rewards fed to the bandit")
                .namespace(NAMESPACE)
                .buckets(vec![-1.0, -0.5, 0.0, 0.5, 1.0, 1.25, 1.5, 1.75, 2.0]),
        )?;

        registry.register(Box::new(route_outcomes.clone()))?;
        registry.register(Box::new(route_duration.clone()))?;
        registry.register(Box::new(quota_rejections.clone()))?;
        registry.register(Box::new(cache_lookups.clone()))?;
        registry.register(Box::new(budget_alerts.clone()))?;
        registry.register(Box::new(store_errors.clone()))?;
        registry.register(Box::new(rewards.clone()))?;

        Ok(Self {
            registry,
            route_outcomes,
            route_duration,
            quota_rejections,
            cache_lookups,
            budget_alerts,
            store_errors,
            rewards,
        })
    }

    /// Registry holding these metrics
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Count a routing decision and its duration
    ///
    /// `outcome` is "routed" or an error code.
    pub fn record_route(&self, outcome: &str, elapsed: Duration) {
        self.route_outcomes.with_label_values(&[outcome]).inc();
        self.route_duration
            .with_label_values(&[outcome])
            .observe(elapsed.as_secs_f64());
    }

    /// Count a refused reservation
    pub fn record_quota_rejection(&self, provider: &str, model: &str, limit: &str) {
        self.quota_rejections
            .with_label_values(&[provider, model, limit])
            .inc();
    }

    /// Count a cache lookup
    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups.with_label_values(&[result]).inc();
    }

    /// Count a budget alert
    pub fn record_budget_alert(&self) {
        self.budget_alerts.inc();
    }

    /// Count a store failure
    pub fn record_store_error(&self, store: &str) {
        self.store_errors.with_label_values(&[store]).inc();
    }

    /// Observe a bandit reward
    pub fn record_reward(&self, reward: f64) {
        self.rewards.observe(reward);
    }

    /// Render every metric in the Prometheus text format
    ///
    /// # Errors
    /// Returns error if encoding fails
    pub fn gather_text(&self) -> Result<String, TelemetryError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

impl std::fmt::Debug for RouterMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterMetrics")
            .field("namespace", &NAMESPACE)
            .finish_non_exhaustive()
    }
}
