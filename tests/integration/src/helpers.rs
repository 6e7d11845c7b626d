//! Test helper utilities for integration tests

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use router_core::{ManualClock, OrgId, ProviderConfig, RouterConfig, SharedClock};
use router_limits::ChannelAlertNotifier;
use router_limits::BudgetAlert;
use router_service::{RoutingService, RoutingServiceBuilder};
use router_store::{CounterStore, LedgerStore, MemoryCounterStore, MemoryLedgerStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing for tests (only once)
static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// Midday on 10 March 2026, UTC
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0)
        .single()
        .expect("valid start time")
}

/// A routing service over process-local stores and a manual clock
pub struct Harness {
    /// The service under test
    pub service: Arc<RoutingService>,
    /// Clock shared by every component
    pub clock: Arc<ManualClock>,
    /// Ledger behind the service
    pub ledger: Arc<MemoryLedgerStore>,
    /// Counters behind the service
    pub counters: Arc<MemoryCounterStore>,
    /// Budget alerts raised by the service
    pub alerts: mpsc::UnboundedReceiver<BudgetAlert>,
}

impl Harness {
    /// Harness with the default configuration
    pub async fn new() -> Self {
        Self::with_config(RouterConfig::default()).await
    }

    /// Harness with a specific configuration
    pub async fn with_config(config: RouterConfig) -> Self {
        init_tracing();

        let clock = Arc::new(ManualClock::new(start_time()));
        let shared: SharedClock = clock.clone();
        let ledger = Arc::new(MemoryLedgerStore::new());
        let counters = Arc::new(MemoryCounterStore::with_clock(shared.clone()));
        let (notifier, alerts) = ChannelAlertNotifier::channel();

        let service = RoutingServiceBuilder::new()
            .config(config)
            .ledger(ledger.clone())
            .counters(counters.clone())
            .notifier(Arc::new(notifier))
            .clock(shared)
            .build()
            .expect("routing service");

        Self {
            service: Arc::new(service),
            clock,
            ledger,
            counters,
            alerts,
        }
    }

    /// Register providers for an organization
    pub async fn add_providers(&self, providers: &[ProviderConfig]) {
        for provider in providers {
            self.service
                .upsert_provider(provider)
                .await
                .expect("register provider");
        }
    }

    /// Scope of an organization's bandit arms
    pub fn scope(org_id: OrgId) -> String {
        org_id.to_string()
    }

    /// Whether both stores answer
    pub async fn stores_healthy(&self) -> bool {
        self.ledger.health_check().await.is_ok() && self.counters.health_check().await.is_ok()
    }
}
