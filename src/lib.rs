//! # LLM Cost Router
//!
//! Cost-aware provider routing for LLM inference.
//!
//! Given a request with a quality tier, token estimates and an optional
//! latency ceiling, the router picks one provider+model pair that:
//!
//! - fits the organization's budget for the current period
//! - meets the quality tier
//! - has rate and concurrency headroom, which it reserves
//! - scores well on cost, quality, latency and reliability, balanced against
//!   exploration by a UCB bandit that learns from reported outcomes
//!
//! A content-addressed response cache shares the counter store with the
//! quota manager.
//!
//! ## Usage
//!
//! ```no_run
//! use llm_cost_router::prelude::*;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let router = llm_cost_router::start_from_file("router.yaml").await?;
//! let org = OrgId::new_v4();
//!
//! let request = RoutingRequest::builder(org)
//!     .quality_tier(QualityTier::Silver)
//!     .prompt_tokens(800)
//!     .max_tokens(400)
//!     .build()?;
//! let decision = router.service().route_request(&request).await?;
//!
//! // call the provider, then report what happened
//! let report = UsageReport::for_response(org, &decision).succeeded(
//!     decision.estimated_cost_cents,
//!     std::time::Duration::from_millis(850),
//!     1200,
//! );
//! router.service().record_usage(&report).await?;
//!
//! router.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub use router_cache as cache;
pub use router_core as core;
pub use router_limits as limits;
pub use router_selection as selection;
pub use router_service as service;
pub use router_store as store;
pub use router_telemetry as telemetry;

use router_core::RouterConfig;
use router_service::{RoutingService, RoutingServiceBuilder};
use router_telemetry::{init_tracing, shutdown_tracing, TelemetryConfig, TracerProvider};

/// Commonly used types
pub mod prelude {
    pub use router_core::{
        BudgetStatus, CacheRequest, CacheResponse, OrgId, PeriodType, ProviderConfig, ProviderKey,
        QualityTier, QuotaStatus, RouterConfig, RouterError, RouterResult, RoutingRequest,
        RoutingResponse,
    };
    pub use router_service::{RoutingService, RoutingServiceBuilder, UsageOutcome, UsageReport};
}

/// A running router: the service plus the tracing it installed
pub struct CostRouter {
    service: Arc<RoutingService>,
    tracer: Option<TracerProvider>,
}

impl CostRouter {
    /// Routing service
    #[must_use]
    pub fn service(&self) -> &Arc<RoutingService> {
        &self.service
    }

    /// Close store connections and flush spans
    pub async fn shutdown(self) {
        self.service.shutdown().await;
        shutdown_tracing(self.tracer);
    }
}

impl std::fmt::Debug for CostRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostRouter")
            .field("service", &self.service)
            .field("otel", &self.tracer.is_some())
            .finish()
    }
}

/// Load a configuration file and start the router
///
/// # Errors
/// Returns error if the file cannot be loaded or startup fails
pub async fn start_from_file(path: impl AsRef<Path>) -> anyhow::Result<CostRouter> {
    let path = path.as_ref();
    let config = RouterConfig::load(path)
        .await
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    start(config).await
}

/// Install tracing, connect the configured stores and build the service
///
/// # Errors
/// Returns error if tracing is already installed or a store cannot connect
pub async fn start(config: RouterConfig) -> anyhow::Result<CostRouter> {
    let tracer = init_tracing(&TelemetryConfig::from(&config.telemetry))
        .context("failed to initialize tracing")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        counters = ?config.store.backend,
        ledger = ?config.ledger.backend,
        strategy = ?config.selection.strategy,
        "Starting LLM cost router"
    );

    let service = match RoutingServiceBuilder::new().config(config).connect().await {
        Ok(service) => service,
        Err(e) => {
            shutdown_tracing(tracer);
            return Err(e).context("failed to build routing service");
        }
    };

    Ok(CostRouter {
        service: Arc::new(service),
        tracer,
    })
}
