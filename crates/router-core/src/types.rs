//! Data model shared across the router.
//!
//! Provider configuration, budgets, quota snapshots, cache entries and
//! routing decisions. Monetary amounts are integer cents; provider prices
//! are dollars per token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::RouterError;

/// Organization identifier
pub type OrgId = Uuid;

/// Schema-less map of scalar configuration values
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// Check that every value of a configuration map is a scalar.
///
/// # Errors
/// Returns a validation error naming the first non-scalar key.
pub fn ensure_scalar_map(map: &ConfigMap) -> Result<(), RouterError> {
    for (key, value) in map {
        if value.is_array() || value.is_object() {
            return Err(RouterError::validation(
                format!("config value for '{key}' must be a scalar"),
                Some(key.clone()),
                "non_scalar_config",
            ));
        }
    }
    Ok(())
}

/// Ordered service-level bucket requested by a caller
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum QualityTier {
    /// Lowest tier, reputation score of at least 0.4
    #[default]
    Bronze,
    /// Middle tier, reputation score of at least 0.6
    Silver,
    /// Highest tier, reputation score of at least 0.8
    Gold,
}

impl QualityTier {
    /// Minimum reputation score a provider needs to serve this tier
    #[must_use]
    pub fn threshold(self) -> f64 {
        match self {
            Self::Gold => 0.8,
            Self::Silver => 0.6,
            Self::Bronze => 0.4,
        }
    }

    /// Whether a provider with this reputation score may serve the tier
    #[must_use]
    pub fn admits(self, quality_score: f64) -> bool {
        quality_score >= self.threshold()
    }

    /// Highest tier a reputation score qualifies for
    #[must_use]
    pub fn for_score(quality_score: f64) -> Option<Self> {
        [Self::Gold, Self::Silver, Self::Bronze]
            .into_iter()
            .find(|tier| tier.admits(quality_score))
    }

    /// Get the tier name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gold => "Gold",
            Self::Silver => "Silver",
            Self::Bronze => "Bronze",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gold" => Ok(Self::Gold),
            "silver" => Ok(Self::Silver),
            "bronze" => Ok(Self::Bronze),
            other => Err(RouterError::validation(
                format!("unknown quality tier '{other}'"),
                Some("quality_tier".to_string()),
                "invalid_quality_tier",
            )),
        }
    }
}

/// Identity of a selectable provider/model pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderKey {
    /// Provider name (e.g., "openai")
    pub provider: String,
    /// Model name (e.g., "gpt-4")
    pub model: String,
}

impl ProviderKey {
    /// Create a new provider key
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// Provider/model configuration scoped to an organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Row identifier
    pub id: Uuid,
    /// Owning organization
    pub org_id: OrgId,
    /// Provider name
    pub provider_name: String,
    /// Model name
    pub model_name: String,
    /// Free-form scalar configuration rendered into routing decisions
    #[serde(default)]
    pub config: ConfigMap,
    /// Dollars per prompt token
    pub cost_per_token_prompt: f64,
    /// Dollars per completion token
    pub cost_per_token_completion: f64,
    /// Requests-per-minute ceiling
    pub qps_limit: i64,
    /// Whether the provider takes part in routing
    pub enabled: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ProviderConfig {
    /// Create an enabled provider with zero pricing and the default ceiling
    pub fn new(org_id: OrgId, provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            provider_name: provider.into(),
            model_name: model.into(),
            config: ConfigMap::new(),
            cost_per_token_prompt: 0.0,
            cost_per_token_completion: 0.0,
            qps_limit: 100,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    /// Set per-token pricing in dollars
    #[must_use]
    pub fn with_pricing(mut self, prompt: f64, completion: f64) -> Self {
        self.cost_per_token_prompt = prompt;
        self.cost_per_token_completion = completion;
        self
    }

    /// Set the requests-per-minute ceiling
    #[must_use]
    pub fn with_qps_limit(mut self, limit: i64) -> Self {
        self.qps_limit = limit;
        self
    }

    /// Add a configuration entry
    #[must_use]
    pub fn with_config_value(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Set the creation timestamp
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Mark the provider disabled
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Get the provider/model key
    #[must_use]
    pub fn key(&self) -> ProviderKey {
        ProviderKey::new(&self.provider_name, &self.model_name)
    }

    /// Estimated cost in cents, truncated toward zero
    #[must_use]
    pub fn estimate_cost_cents(&self, prompt_tokens: u32, max_tokens: u32) -> i64 {
        let dollars = f64::from(prompt_tokens) * self.cost_per_token_prompt
            + f64::from(max_tokens) * self.cost_per_token_completion;
        (dollars * 100.0) as i64
    }
}

/// Budget period granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    /// Midnight to midnight UTC
    Daily,
    /// Monday to Monday UTC
    Weekly,
    /// First of the month to first of the next month UTC
    #[default]
    Monthly,
}

impl PeriodType {
    /// Get the period name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(RouterError::validation(
                format!("unknown period type '{other}'"),
                Some("period_type".to_string()),
                "invalid_period_type",
            )),
        }
    }
}

/// Spending limit for an organization (optionally a project) over one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    /// Budget identifier
    pub id: Uuid,
    /// Owning organization
    pub org_id: OrgId,
    /// Optional project scope
    pub project_id: Option<Uuid>,
    /// Period granularity
    pub period_type: PeriodType,
    /// Limit in cents
    pub limit_cents: i64,
    /// Spent in cents
    pub spent_cents: i64,
    /// Inclusive period start
    pub period_start: DateTime<Utc>,
    /// Exclusive period end
    pub period_end: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Budget {
    /// Cents left in the period, negative once overspent
    #[must_use]
    pub fn remaining_cents(&self) -> i64 {
        self.limit_cents - self.spent_cents
    }

    /// Whether the instant falls inside this budget's period
    #[must_use]
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.period_start <= at && at < self.period_end
    }

    /// Percentage of the limit spent, 0 when the limit is not positive
    #[must_use]
    pub fn utilization_pct(&self) -> f64 {
        if self.limit_cents > 0 {
            self.spent_cents as f64 / self.limit_cents as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// Budget health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetState {
    /// Below the warning threshold
    Healthy,
    /// At or above the warning threshold
    Warning,
    /// At or above the critical threshold
    Critical,
    /// Nothing left, or not enough for the request
    Exceeded,
}

impl fmt::Display for BudgetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Exceeded => "exceeded",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    /// Budget identifier
    pub budget_id: Uuid,
    /// Limit in cents
    pub limit_cents: i64,
    /// Spent in cents
    pub spent_cents: i64,
    /// Remaining in cents
    pub remaining_cents: i64,
    /// Spent as a percentage of the limit
    pub utilization_pct: f64,
    /// Period start
    pub period_start: DateTime<Utc>,
    /// Period end
    pub period_end: DateTime<Utc>,
    /// Classification
    pub status: BudgetState,
}

impl BudgetStatus {
    /// Whether the budget rejects new work
    #[must_use]
    pub fn is_exceeded(&self) -> bool {
        self.status == BudgetState::Exceeded
    }
}

/// Counter snapshot for one provider/model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    /// Provider name
    pub provider_name: String,
    /// Model name
    pub model_name: String,
    /// Requests admitted in the current minute
    pub current_qps: i64,
    /// Requests-per-minute ceiling
    pub limit_qps: i64,
    /// Requests currently in flight
    pub concurrent_calls: i64,
    /// In-flight ceiling
    pub max_concurrent: i64,
    /// Start of the current minute window
    pub last_reset: DateTime<Utc>,
    /// Start of the next minute window
    pub next_reset: DateTime<Utc>,
}

impl QuotaStatus {
    /// Whether both ceilings leave room for one more request
    #[must_use]
    pub fn has_headroom(&self) -> bool {
        self.current_qps < self.limit_qps && self.concurrent_calls < self.max_concurrent
    }
}

/// Visibility scope of a cached response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    /// Shared with everyone; never stored
    Public,
    /// Shared within the organization
    #[default]
    Org,
    /// Shared within a project
    Project,
    /// Private to a user
    User,
}

impl PrivacyLevel {
    /// Whether entries at this level may be written to the cache
    #[must_use]
    pub fn is_cacheable(self) -> bool {
        !matches!(self, Self::Public)
    }
}

/// Caching rules applied to a write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Whether caching is enabled
    pub enabled: bool,
    /// Entry lifetime
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Visibility scope
    pub privacy_level: PrivacyLevel,
    /// Extra conditions carried with the policy
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub conditions: ConfigMap,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(3600),
            privacy_level: PrivacyLevel::Org,
            conditions: ConfigMap::new(),
        }
    }
}

/// A response to store in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRequest {
    /// Fingerprint of the prompt
    pub prompt_hash: String,
    /// Fingerprint of the input
    pub input_hash: String,
    /// Response to cache
    pub response: serde_json::Value,
    /// Entry lifetime; zero means the policy TTL
    #[serde(default, with = "humantime_serde")]
    pub ttl: Duration,
    /// Policy the entry is written under
    #[serde(default)]
    pub policy: CachePolicy,
}

impl CacheRequest {
    /// Create a cache write with the default policy
    pub fn new(
        prompt_hash: impl Into<String>,
        input_hash: impl Into<String>,
        response: serde_json::Value,
    ) -> Self {
        Self {
            prompt_hash: prompt_hash.into(),
            input_hash: input_hash.into(),
            response,
            ttl: Duration::ZERO,
            policy: CachePolicy::default(),
        }
    }

    /// Set an explicit TTL
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the policy
    #[must_use]
    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// TTL the entry is stored with
    #[must_use]
    pub fn effective_ttl(&self) -> Duration {
        if self.ttl.is_zero() {
            self.policy.ttl
        } else {
            self.ttl
        }
    }
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheResponse {
    /// Whether a live entry was found
    pub hit: bool,
    /// Cached response on a hit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    /// When the entry was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// When the entry expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheResponse {
    /// A cache miss
    #[must_use]
    pub fn miss() -> Self {
        Self {
            hit: false,
            response: None,
            created_at: None,
            expires_at: None,
        }
    }
}

/// Bandit statistics for one provider/model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanditArm {
    /// Provider name
    pub provider_name: String,
    /// Model name
    pub model_name: String,
    /// Number of times the arm was selected
    pub pulls: u64,
    /// Cumulative reward
    pub total_reward: f64,
    /// Cumulative reward divided by pulls
    pub average_reward: f64,
    /// When the arm was last selected
    pub last_selected: Option<DateTime<Utc>>,
}

impl BanditArm {
    /// Create an arm with no history
    #[must_use]
    pub fn new(key: &ProviderKey) -> Self {
        Self {
            provider_name: key.provider.clone(),
            model_name: key.model.clone(),
            pulls: 0,
            total_reward: 0.0,
            average_reward: 0.0,
            last_selected: None,
        }
    }

    /// Get the provider/model key
    #[must_use]
    pub fn key(&self) -> ProviderKey {
        ProviderKey::new(&self.provider_name, &self.model_name)
    }

    /// Recompute the running average from the totals
    pub fn refresh_average(&mut self) {
        self.average_reward = if self.pulls == 0 {
            0.0
        } else {
            self.total_reward / self.pulls as f64
        };
    }
}

/// A ranked candidate that was not chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    /// Provider name
    pub provider_name: String,
    /// Model name
    pub model_name: String,
    /// Cost estimate in cents
    pub estimated_cost_cents: i64,
    /// Latency estimate
    #[serde(with = "humantime_serde")]
    pub estimated_latency: Duration,
    /// Reputation score
    pub quality_score: f64,
    /// Justification
    pub reason: String,
}

/// Routing decision returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResponse {
    /// Chosen provider
    pub provider_name: String,
    /// Chosen model
    pub model_name: String,
    /// Provider configuration to call with
    pub config: ConfigMap,
    /// Cost estimate in cents
    pub estimated_cost_cents: i64,
    /// Latency estimate
    #[serde(with = "humantime_serde")]
    pub estimated_latency: Duration,
    /// Composite score of the chosen provider
    pub confidence: f64,
    /// Justification
    pub reason: String,
    /// Up to three ranked alternatives
    pub alternatives: Vec<Alternative>,
}

impl RoutingResponse {
    /// Get the chosen provider/model key
    #[must_use]
    pub fn key(&self) -> ProviderKey {
        ProviderKey::new(&self.provider_name, &self.model_name)
    }
}
