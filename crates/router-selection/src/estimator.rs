//! Quality, latency and reliability estimators.
//!
//! The scorer only sees the traits. [`TableEstimator`] answers all three
//! from [`EstimatorTables`], which can be swapped at runtime without
//! blocking readers.

use arc_swap::ArcSwap;
use rand::Rng;
use router_core::EstimatorTables;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Reputation score of a provider/model in [0, 1]
pub trait QualityEstimator: Send + Sync {
    /// Estimate quality
    fn quality(&self, provider: &str, model: &str) -> f64;
}

/// Expected response latency of a provider/model
pub trait LatencyEstimator: Send + Sync {
    /// Estimate latency
    fn latency(&self, provider: &str, model: &str) -> Duration;
}

/// Expected success rate of a provider/model in [0, 1]
pub trait ReliabilityEstimator: Send + Sync {
    /// Estimate reliability
    fn reliability(&self, provider: &str, model: &str) -> f64;
}

/// Estimator backed by hot-swappable lookup tables
#[derive(Debug)]
pub struct TableEstimator {
    tables: ArcSwap<EstimatorTables>,
}

impl TableEstimator {
    /// Create an estimator over the given tables
    #[must_use]
    pub fn new(tables: EstimatorTables) -> Self {
        Self {
            tables: ArcSwap::from_pointee(tables),
        }
    }

    /// Current tables
    #[must_use]
    pub fn tables(&self) -> Arc<EstimatorTables> {
        self.tables.load_full()
    }

    /// Replace the tables
    pub fn update_tables(&self, tables: EstimatorTables) {
        self.tables.store(Arc::new(tables));
        info!("Estimator tables updated");
    }
}

impl Default for TableEstimator {
    fn default() -> Self {
        Self::new(EstimatorTables::default())
    }
}

impl QualityEstimator for TableEstimator {
    fn quality(&self, provider: &str, model: &str) -> f64 {
        self.tables.load().quality.lookup(provider, model)
    }
}

impl LatencyEstimator for TableEstimator {
    fn latency(&self, provider: &str, _model: &str) -> Duration {
        let tables = self.tables.load();
        let baseline = tables.latency.baseline(provider);
        let jitter_ms = tables.latency.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return baseline;
        }
        baseline + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}

impl ReliabilityEstimator for TableEstimator {
    fn reliability(&self, provider: &str, model: &str) -> f64 {
        self.tables.load().reliability.lookup(provider, model)
    }
}
