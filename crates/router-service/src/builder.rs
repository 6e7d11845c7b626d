//! Service assembly.

use async_trait::async_trait;
use router_cache::CacheManager;
use router_core::{
    ArmStoreKind, BudgetConfig, CacheConfig, CounterBackend, LedgerBackend, QuotaConfig,
    RouterConfig, RouterError, RouterResult, SelectionConfig, SharedClock, SystemClock,
};
use router_limits::{AlertNotifier, BudgetAlert, BudgetManager, QuotaManager, TracingAlertNotifier};
use router_selection::{ArmStore, LedgerArmStore, MemoryArmStore, SelectionEngine, SelectionStrategy};
use router_store::{
    CounterStore, LedgerPool, LedgerStore, MemoryCounterStore, MemoryLedgerStore, SqlLedgerStore,
};
use router_telemetry::RouterMetrics;
use std::sync::Arc;
use tracing::info;

use crate::service::RoutingService;

/// Builder for [`RoutingService`]
///
/// Anything left unset falls back to the process-local stores and the
/// defaults of [`RouterConfig`].
#[derive(Default)]
pub struct RoutingServiceBuilder {
    config: RouterConfig,
    ledger: Option<Arc<dyn LedgerStore>>,
    counters: Option<Arc<dyn CounterStore>>,
    arm_store: Option<Arc<dyn ArmStore>>,
    strategy: Option<Arc<dyn SelectionStrategy>>,
    notifier: Option<Arc<dyn AlertNotifier>>,
    clock: Option<SharedClock>,
    metrics: Option<RouterMetrics>,
    sql: Option<Arc<SqlLedgerStore>>,
}

impl RoutingServiceBuilder {
    /// Create a builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a full router configuration
    #[must_use]
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the budget configuration
    #[must_use]
    pub fn budget_config(mut self, config: BudgetConfig) -> Self {
        self.config.budget = config;
        self
    }

    /// Set the quota configuration
    #[must_use]
    pub fn quota_config(mut self, config: QuotaConfig) -> Self {
        self.config.quota = config;
        self
    }

    /// Set the cache configuration
    #[must_use]
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.config.cache = config;
        self
    }

    /// Set the selection configuration
    #[must_use]
    pub fn selection_config(mut self, config: SelectionConfig) -> Self {
        self.config.selection = config;
        self
    }

    /// Set the ledger store
    #[must_use]
    pub fn ledger(mut self, ledger: Arc<dyn LedgerStore>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Set the counter store
    #[must_use]
    pub fn counters(mut self, counters: Arc<dyn CounterStore>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Set the arm store
    #[must_use]
    pub fn arm_store(mut self, arm_store: Arc<dyn ArmStore>) -> Self {
        self.arm_store = Some(arm_store);
        self
    }

    /// Override the configured selection strategy
    #[must_use]
    pub fn strategy(mut self, strategy: Arc<dyn SelectionStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Set where budget alerts go
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn AlertNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Set the clock shared by every component
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the metrics sink
    #[must_use]
    pub fn metrics(mut self, metrics: RouterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Connect the stores named by the configuration and build
    ///
    /// Stores already set on the builder are kept.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or a store cannot connect
    pub async fn connect(mut self) -> RouterResult<RoutingService> {
        self.config.check()?;

        if self.counters.is_none() {
            self.counters = Some(connect_counters(&self.config, self.clock.clone()).await?);
        }
        if self.ledger.is_none() && self.config.ledger.backend == LedgerBackend::Sql {
            let pool = LedgerPool::connect(&self.config.ledger)
                .await
                .map_err(|e| e.into_router_error("ledger"))?;
            let sql = Arc::new(SqlLedgerStore::new(pool, self.config.ledger.operation_timeout));
            self.ledger = Some(sql.clone());
            self.sql = Some(sql);
        }

        self.build()
    }

    /// Build, using process-local stores for anything unset
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or metrics cannot be
    /// registered
    pub fn build(self) -> RouterResult<RoutingService> {
        self.config.check()?;
        if self.ledger.is_none() && self.config.ledger.backend == LedgerBackend::Sql {
            return Err(RouterError::Config(
                "sql ledger must be connected before build".to_string(),
            ));
        }
        if self.counters.is_none() && self.config.store.backend == CounterBackend::Redis {
            return Err(RouterError::Config(
                "redis counters must be connected before build".to_string(),
            ));
        }

        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let ledger = self
            .ledger
            .unwrap_or_else(|| Arc::new(MemoryLedgerStore::new()));
        let counters = self
            .counters
            .unwrap_or_else(|| Arc::new(MemoryCounterStore::with_clock(clock.clone())));
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => RouterMetrics::new().map_err(|e| RouterError::internal(e.to_string()))?,
        };

        let notifier: Arc<dyn AlertNotifier> = Arc::new(CountingAlertNotifier {
            inner: self
                .notifier
                .unwrap_or_else(|| Arc::new(TracingAlertNotifier)),
            metrics: metrics.clone(),
        });
        let budget = BudgetManager::new(ledger.clone(), self.config.budget.clone())
            .with_notifier(notifier)
            .with_clock(clock.clone());
        let quota = QuotaManager::new(counters.clone(), self.config.quota.clone())
            .with_clock(clock.clone());
        let cache =
            CacheManager::new(counters.clone(), self.config.cache.clone()).with_clock(clock.clone());

        let arm_store = self.arm_store.unwrap_or_else(|| match self.config.selection.arm_store {
            ArmStoreKind::Memory => Arc::new(MemoryArmStore::new()) as Arc<dyn ArmStore>,
            ArmStoreKind::Ledger => Arc::new(LedgerArmStore::new(ledger.clone())),
        });
        let mut engine =
            SelectionEngine::new(self.config.selection.clone(), arm_store).with_clock(clock);
        if let Some(strategy) = self.strategy {
            engine = engine.with_strategy(strategy);
        }

        info!(
            ledger = ledger.name(),
            counters = counters.name(),
            strategy = engine.strategy_name(),
            "Routing service ready"
        );

        Ok(RoutingService {
            ledger,
            counters,
            budget: Arc::new(budget),
            quota: Arc::new(quota),
            cache: Arc::new(cache),
            engine: Arc::new(engine),
            metrics,
            sql: self.sql,
        })
    }
}

async fn connect_counters(
    config: &RouterConfig,
    clock: Option<SharedClock>,
) -> RouterResult<Arc<dyn CounterStore>> {
    match config.store.backend {
        CounterBackend::Memory => Ok(Arc::new(match clock {
            Some(clock) => MemoryCounterStore::with_clock(clock),
            None => MemoryCounterStore::new(),
        })),
        #[cfg(feature = "redis")]
        CounterBackend::Redis => {
            let store = router_store::RedisCounterStore::connect(&config.store)
                .await
                .map_err(|e| e.into_router_error("counter"))?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        CounterBackend::Redis => Err(RouterError::Config(
            "redis counter backend requires the `redis` feature".to_string(),
        )),
    }
}

/// Counts alerts before handing them on
#[derive(Debug)]
struct CountingAlertNotifier {
    inner: Arc<dyn AlertNotifier>,
    metrics: RouterMetrics,
}

#[async_trait]
impl AlertNotifier for CountingAlertNotifier {
    async fn notify(&self, alert: BudgetAlert) {
        self.metrics.record_budget_alert();
        self.inner.notify(alert).await;
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

impl std::fmt::Debug for RoutingServiceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingServiceBuilder")
            .field("config", &self.config)
            .field("ledger", &self.ledger.as_ref().map(|l| l.name()))
            .field("counters", &self.counters.as_ref().map(|c| c.name()))
            .finish_non_exhaustive()
    }
}
