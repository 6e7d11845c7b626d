//! # Router Core
//!
//! Core types, errors and configuration for the LLM cost router.
//!
//! This crate provides the foundational types shared by every other crate:
//! - Provider, budget, quota and cache data model
//! - Routing requests and routing decisions
//! - The router error taxonomy
//! - File-backed router configuration
//! - An injectable clock and budget period arithmetic

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod period;
pub mod request;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    ArmStoreKind, BudgetConfig, CacheConfig, ConfigError, ConfigFormat, CounterBackend, CounterStoreConfig, EstimatorTables,
    LatencyTable, LedgerBackend, LedgerConfig, PoolConfig, QuotaConfig, RouterConfig,
    ScoreTable, ScoringWeights, SelectionConfig, StrategyKind, TelemetrySettings,
};
pub use error::{RouterError, RouterResult};
pub use request::{RoutingRequest, RoutingRequestBuilder};
pub use types::{
    Alternative, BanditArm, Budget, BudgetState, BudgetStatus, CachePolicy, CacheRequest,
    CacheResponse, ConfigMap, ensure_scalar_map, OrgId, PeriodType, PrivacyLevel, ProviderConfig, ProviderKey,
    QualityTier, QuotaStatus, RoutingResponse,
};
