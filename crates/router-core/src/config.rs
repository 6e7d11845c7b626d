//! Router configuration.
//!
//! [`RouterConfig`] is the single document the router is bootstrapped from.
//! It loads from YAML, TOML or JSON (chosen by file extension) and is
//! checked with `validator` before use. Every section has sane defaults so
//! an empty file yields a working in-memory router.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::types::{PeriodType, PrivacyLevel};

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that failed
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Document could not be parsed
    #[error("failed to parse {format} configuration: {message}")]
    Parse {
        /// Format name
        format: &'static str,
        /// Parser message
        message: String,
    },

    /// Unknown file extension
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// Document parsed but failed validation
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for crate::error::RouterError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Serialization format of a configuration document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML
    Yaml,
    /// TOML
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension
    ///
    /// # Errors
    /// Returns error for unknown extensions
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        match extension {
            "yaml" | "yml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_router_semantics"))]
pub struct RouterConfig {
    /// Counter store (quota and cache)
    #[validate(nested)]
    pub store: CounterStoreConfig,
    /// Ledger store (budgets, providers, arms)
    #[validate(nested)]
    pub ledger: LedgerConfig,
    /// Budget defaults and alert thresholds
    #[validate(nested)]
    pub budget: BudgetConfig,
    /// Quota defaults and counter lifetimes
    #[validate(nested)]
    pub quota: QuotaConfig,
    /// Cache lifetimes
    pub cache: CacheConfig,
    /// Scoring and bandit settings
    #[validate(nested)]
    pub selection: SelectionConfig,
    /// Logging and tracing
    #[validate(nested)]
    pub telemetry: TelemetrySettings,
}

impl RouterConfig {
    /// Load and validate configuration from a file
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::parse(&content, format)
    }

    /// Parse and validate configuration from a string
    ///
    /// # Errors
    /// Returns error if the content cannot be parsed or validated
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let config: Self = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
                format: "yaml",
                message: e.to_string(),
            })?,
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::Parse {
                format: "toml",
                message: e.to_string(),
            })?,
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::Parse {
                format: "json",
                message: e.to_string(),
            })?,
        };
        config.check()?;
        Ok(config)
    }

    /// Run validation, flattening errors into one message
    ///
    /// # Errors
    /// Returns error if any section is invalid
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()
            .map_err(|errors| ConfigError::Invalid(errors.to_string()))
    }
}

fn validate_router_semantics(config: &RouterConfig) -> Result<(), ValidationError> {
    if config.budget.warning_pct >= config.budget.critical_pct {
        return Err(ValidationError::new("budget_thresholds")
            .with_message(Cow::Borrowed("warning_pct must be below critical_pct")));
    }

    let weights = &config.selection.weights;
    let sum = weights.cost + weights.quality + weights.latency + weights.reliability;
    if (sum - 1.0).abs() > 1e-6 {
        return Err(ValidationError::new("scoring_weights")
            .with_message(Cow::Owned(format!("scoring weights must sum to 1.0, got {sum}"))));
    }

    if config.store.backend == CounterBackend::Redis && config.store.redis_url.is_none() {
        return Err(ValidationError::new("redis_url")
            .with_message(Cow::Borrowed("redis backend requires store.redis_url")));
    }

    if config.ledger.backend == LedgerBackend::Sql && config.ledger.database_url.is_none() {
        return Err(ValidationError::new("database_url")
            .with_message(Cow::Borrowed("sql ledger requires ledger.database_url")));
    }

    Ok(())
}

/// Counter store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterBackend {
    /// Process-local map
    #[default]
    Memory,
    /// Shared Redis instance
    Redis,
}

/// Counter store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CounterStoreConfig {
    /// Backend kind
    pub backend: CounterBackend,
    /// Redis URL
    pub redis_url: Option<String>,
    /// Prefix applied to every key in a shared store
    #[validate(length(min = 1))]
    pub key_prefix: String,
    /// Per-call timeout
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
    /// Connection timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for CounterStoreConfig {
    fn default() -> Self {
        Self {
            backend: CounterBackend::Memory,
            redis_url: None,
            key_prefix: "llm-router".to_string(),
            operation_timeout: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl CounterStoreConfig {
    /// Use a Redis backend at the given URL
    #[must_use]
    pub fn with_redis(mut self, url: impl Into<String>) -> Self {
        self.backend = CounterBackend::Redis;
        self.redis_url = Some(url.into());
        self
    }

    /// Set the key prefix
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the per-call timeout
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

/// Ledger store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerBackend {
    /// Process-local tables
    #[default]
    Memory,
    /// Relational database (PostgreSQL or SQLite)
    Sql,
}

/// Connection pool settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of connections
    #[validate(range(min = 1))]
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection acquire timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Idle timeout for connections
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Maximum lifetime for a connection
    #[serde(with = "humantime_serde")]
    pub max_lifetime: Duration,
    /// Whether to test connections on checkout
    pub test_on_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
            test_on_acquire: true,
        }
    }
}

impl PoolConfig {
    /// Create a new builder
    #[must_use]
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

/// Builder for pool configuration
#[derive(Debug, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Set maximum connections
    #[must_use]
    pub fn max_connections(mut self, max: u32) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Set minimum connections
    #[must_use]
    pub fn min_connections(mut self, min: u32) -> Self {
        self.config.min_connections = min;
        self
    }

    /// Set connection timeout
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set idle timeout
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Set max lifetime
    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.max_lifetime = lifetime;
        self
    }

    /// Set test on acquire
    #[must_use]
    pub fn test_on_acquire(mut self, test: bool) -> Self {
        self.config.test_on_acquire = test;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

/// Ledger store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LedgerConfig {
    /// Backend kind
    pub backend: LedgerBackend,
    /// Database URL (postgres:// or sqlite:)
    pub database_url: Option<String>,
    /// Pool settings
    #[validate(nested)]
    pub pool: PoolConfig,
    /// Per-statement timeout
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
    /// Create tables on startup when missing
    pub ensure_schema: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Memory,
            database_url: None,
            pool: PoolConfig::default(),
            operation_timeout: Duration::from_millis(250),
            ensure_schema: true,
        }
    }
}

impl LedgerConfig {
    /// Use a SQL backend at the given URL
    #[must_use]
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.backend = LedgerBackend::Sql;
        self.database_url = Some(url.into());
        self
    }

    /// Set pool settings
    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set the per-statement timeout
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

/// Budget defaults
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BudgetConfig {
    /// Limit of a lazily created budget, in cents
    #[validate(range(min = 0))]
    pub default_limit_cents: i64,
    /// Period of a lazily created budget
    pub default_period: PeriodType,
    /// Utilization percentage classified as warning
    #[validate(range(min = 0.0, max = 100.0))]
    pub warning_pct: f64,
    /// Utilization percentage classified as critical
    #[validate(range(min = 0.0, max = 100.0))]
    pub critical_pct: f64,
    /// Emit an alert when spend passes the limit
    pub alert_on_exceeded: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_limit_cents: 1_000_000,
            default_period: PeriodType::Monthly,
            warning_pct: 75.0,
            critical_pct: 90.0,
            alert_on_exceeded: true,
        }
    }
}

impl BudgetConfig {
    /// Set the default limit
    #[must_use]
    pub fn with_default_limit_cents(mut self, cents: i64) -> Self {
        self.default_limit_cents = cents;
        self
    }

    /// Set the default period
    #[must_use]
    pub fn with_default_period(mut self, period: PeriodType) -> Self {
        self.default_period = period;
        self
    }

    /// Set the warning and critical thresholds
    #[must_use]
    pub fn with_thresholds(mut self, warning_pct: f64, critical_pct: f64) -> Self {
        self.warning_pct = warning_pct;
        self.critical_pct = critical_pct;
        self
    }
}

/// Quota defaults
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct QuotaConfig {
    /// Requests-per-minute ceiling when none is configured
    #[validate(range(min = 1))]
    pub default_rpm: i64,
    /// In-flight ceiling when none is configured
    #[validate(range(min = 1))]
    pub default_max_concurrent: i64,
    /// Lifetime of the minute counter
    #[serde(with = "humantime_serde")]
    pub rate_window_ttl: Duration,
    /// Lifetime of the in-flight counter
    #[serde(with = "humantime_serde")]
    pub concurrency_ttl: Duration,
    /// Lifetime of the token usage counter
    #[serde(with = "humantime_serde")]
    pub usage_ttl: Duration,
    /// Lifetime of the reset marker written by a manual reset
    #[serde(with = "humantime_serde")]
    pub reset_marker_ttl: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_rpm: 100,
            default_max_concurrent: 10,
            rate_window_ttl: Duration::from_secs(120),
            concurrency_ttl: Duration::from_secs(300),
            usage_ttl: Duration::from_secs(24 * 3600),
            reset_marker_ttl: Duration::from_secs(3600),
        }
    }
}

impl QuotaConfig {
    /// Set the default ceilings
    #[must_use]
    pub fn with_defaults(mut self, rpm: i64, max_concurrent: i64) -> Self {
        self.default_rpm = rpm;
        self.default_max_concurrent = max_concurrent;
        self
    }
}

/// Cache lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch
    pub enabled: bool,
    /// Default entry lifetime
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Lifetime for Gold requests
    #[serde(with = "humantime_serde")]
    pub gold_ttl: Duration,
    /// Lifetime for Silver requests
    #[serde(with = "humantime_serde")]
    pub silver_ttl: Duration,
    /// Lifetime for Bronze requests
    #[serde(with = "humantime_serde")]
    pub bronze_ttl: Duration,
    /// Lifetime for system prompts
    #[serde(with = "humantime_serde")]
    pub system_prompt_ttl: Duration,
    /// Lifetime for user prompts
    #[serde(with = "humantime_serde")]
    pub user_prompt_ttl: Duration,
    /// Lifetime of the per-org statistics hash
    #[serde(with = "humantime_serde")]
    pub stats_ttl: Duration,
    /// Privacy level of derived policies
    pub default_privacy: PrivacyLevel,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(3600),
            gold_ttl: Duration::from_secs(30 * 60),
            silver_ttl: Duration::from_secs(3600),
            bronze_ttl: Duration::from_secs(4 * 3600),
            system_prompt_ttl: Duration::from_secs(24 * 3600),
            user_prompt_ttl: Duration::from_secs(15 * 60),
            stats_ttl: Duration::from_secs(30 * 24 * 3600),
            default_privacy: PrivacyLevel::Org,
        }
    }
}

impl CacheConfig {
    /// Disable caching
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Set the default lifetime
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

/// Explore/exploit strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Upper confidence bound
    #[default]
    Ucb,
    /// Epsilon-greedy
    EpsilonGreedy,
}

/// Where bandit arms are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmStoreKind {
    /// Process-local map
    #[default]
    Memory,
    /// Write-through to the ledger store
    Ledger,
}

/// Composite score weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ScoringWeights {
    /// Cost weight
    #[validate(range(min = 0.0, max = 1.0))]
    pub cost: f64,
    /// Quality weight
    #[validate(range(min = 0.0, max = 1.0))]
    pub quality: f64,
    /// Latency weight
    #[validate(range(min = 0.0, max = 1.0))]
    pub latency: f64,
    /// Reliability weight
    #[validate(range(min = 0.0, max = 1.0))]
    pub reliability: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            cost: 0.4,
            quality: 0.3,
            latency: 0.2,
            reliability: 0.1,
        }
    }
}

/// Score table keyed by provider name with per-model adjustments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreTable {
    /// Score for providers missing from the table
    pub default: f64,
    /// Base score per provider
    pub providers: HashMap<String, f64>,
    /// Additive adjustment per model
    pub model_adjustments: HashMap<String, f64>,
}

impl Default for ScoreTable {
    fn default() -> Self {
        Self {
            default: 0.6,
            providers: HashMap::new(),
            model_adjustments: HashMap::new(),
        }
    }
}

impl ScoreTable {
    /// Score for a provider/model, clamped to [0, 1]
    #[must_use]
    pub fn lookup(&self, provider: &str, model: &str) -> f64 {
        let base = self.providers.get(provider).copied().unwrap_or(self.default);
        let adjustment = self.model_adjustments.get(model).copied().unwrap_or(0.0);
        (base + adjustment).clamp(0.0, 1.0)
    }
}

/// Latency baselines keyed by provider name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyTable {
    /// Baseline for providers missing from the table
    #[serde(with = "humantime_serde")]
    pub default: Duration,
    /// Baseline per provider
    #[serde(with = "humantime_serde_map")]
    pub providers: HashMap<String, Duration>,
    /// Upper bound (exclusive) of random jitter added to the baseline
    #[serde(with = "humantime_serde")]
    pub jitter: Duration,
}

impl Default for LatencyTable {
    fn default() -> Self {
        Self {
            default: Duration::from_millis(1000),
            providers: HashMap::new(),
            jitter: Duration::from_millis(200),
        }
    }
}

impl LatencyTable {
    /// Baseline for a provider
    #[must_use]
    pub fn baseline(&self, provider: &str) -> Duration {
        self.providers.get(provider).copied().unwrap_or(self.default)
    }
}

/// Estimator lookup tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorTables {
    /// Reputation scores
    pub quality: ScoreTable,
    /// Latency baselines
    pub latency: LatencyTable,
    /// Success-rate estimates
    pub reliability: ScoreTable,
}

impl Default for EstimatorTables {
    fn default() -> Self {
        let quality = ScoreTable {
            default: 0.6,
            providers: [
                ("openai", 0.9),
                ("anthropic", 0.85),
                ("google", 0.8),
                ("cohere", 0.75),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
            model_adjustments: [
                ("gpt-4", 0.1),
                ("claude-3-opus", 0.1),
                ("gpt-3.5-turbo", 0.05),
                ("claude-3-sonnet", 0.05),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        };

        let latency = LatencyTable {
            default: Duration::from_millis(1000),
            providers: [
                ("openai", 800),
                ("anthropic", 1200),
                ("google", 600),
                ("cohere", 900),
            ]
            .into_iter()
            .map(|(k, ms)| (k.to_string(), Duration::from_millis(ms)))
            .collect(),
            jitter: Duration::from_millis(200),
        };

        let reliability = ScoreTable {
            default: 0.95,
            providers: [
                ("openai", 0.98),
                ("anthropic", 0.96),
                ("google", 0.94),
                ("cohere", 0.92),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
            model_adjustments: HashMap::new(),
        };

        Self {
            quality,
            latency,
            reliability,
        }
    }
}

impl EstimatorTables {
    /// Remove latency jitter
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.latency.jitter = Duration::ZERO;
        self
    }
}

/// Scoring and bandit settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SelectionConfig {
    /// Explore/exploit strategy
    pub strategy: StrategyKind,
    /// Where arms are kept
    pub arm_store: ArmStoreKind,
    /// UCB exploration constant
    #[validate(range(min = 0.0))]
    pub exploration: f64,
    /// Weight of the composite score inside the UCB value
    #[validate(range(min = 0.0))]
    pub prior_weight: f64,
    /// Epsilon-greedy exploration probability
    #[validate(range(min = 0.0, max = 1.0))]
    pub epsilon: f64,
    /// Factor applied by reward decay
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub decay_factor: f64,
    /// Maximum alternatives returned with a decision
    #[validate(range(max = 10))]
    pub max_alternatives: usize,
    /// Latency score used when the request has no SLA
    #[validate(range(min = 0.0, max = 1.0))]
    pub default_latency_score: f64,
    /// Composite score weights
    #[validate(nested)]
    pub weights: ScoringWeights,
    /// Estimator tables
    pub estimators: EstimatorTables,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Ucb,
            arm_store: ArmStoreKind::Memory,
            exploration: std::f64::consts::SQRT_2,
            prior_weight: 0.3,
            epsilon: 0.1,
            decay_factor: 0.95,
            max_alternatives: 3,
            default_latency_score: 0.8,
            weights: ScoringWeights::default(),
            estimators: EstimatorTables::default(),
        }
    }
}

impl SelectionConfig {
    /// Set the strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the arm store
    #[must_use]
    pub fn with_arm_store(mut self, arm_store: ArmStoreKind) -> Self {
        self.arm_store = arm_store;
        self
    }

    /// Set epsilon for the epsilon-greedy strategy
    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon.clamp(0.0, 1.0);
        self
    }

    /// Set estimator tables
    #[must_use]
    pub fn with_estimators(mut self, estimators: EstimatorTables) -> Self {
        self.estimators = estimators;
        self
    }
}

/// Logging and tracing settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Service name reported in spans
    #[validate(length(min = 1))]
    pub service_name: String,
    /// Deployment environment
    pub environment: String,
    /// Default log filter
    pub log_level: String,
    /// Emit JSON log lines
    pub json_logs: bool,
    /// Attach an OpenTelemetry layer
    pub otel_enabled: bool,
    /// Trace sampling rate
    #[validate(range(min = 0.0, max = 1.0))]
    pub sampling_rate: f64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            service_name: "llm-cost-router".to_string(),
            environment: "development".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            otel_enabled: false,
            sampling_rate: 1.0,
        }
    }
}

/// Serde adapter for maps of humantime durations
mod humantime_serde_map {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        map: &HashMap<String, Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let wrapped: HashMap<&String, humantime_serde::Serde<Duration>> = map
            .iter()
            .map(|(k, v)| (k, humantime_serde::Serde::from(*v)))
            .collect();
        wrapped.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<String, Duration>, D::Error> {
        let wrapped: HashMap<String, humantime_serde::Serde<Duration>> =
            HashMap::deserialize(deserializer)?;
        Ok(wrapped.into_iter().map(|(k, v)| (k, v.into_inner())).collect())
    }
}
