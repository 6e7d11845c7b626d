//! SQL ledger tests
//!
//! The routing service and the arm store over in-memory SQLite, plus
//! configuration files on disk.

use crate::fixtures::*;
use pretty_assertions::assert_eq;
use router_core::{
    ArmStoreKind, BanditArm, LedgerConfig, PeriodType, ProviderKey, QualityTier, RouterConfig,
    StrategyKind,
};
use router_selection::{ArmStore, LedgerArmStore};
use router_service::{RoutingServiceBuilder, UsageReport};
use router_store::{LedgerPool, LedgerStore, SqlLedgerStore};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

fn sqlite_config() -> RouterConfig {
    let mut config = RouterConfig::default();
    config.ledger = LedgerConfig::default().with_database_url("sqlite::memory:");
    config.selection.arm_store = ArmStoreKind::Ledger;
    config
}

async fn sqlite_store() -> Arc<SqlLedgerStore> {
    let config = LedgerConfig::default().with_database_url("sqlite::memory:");
    let pool = LedgerPool::connect(&config).await.expect("connect sqlite");
    Arc::new(SqlLedgerStore::new(pool, Duration::from_secs(5)))
}

/// Full routing cycle with budgets, providers and arms in SQLite
#[tokio::test]
async fn test_service_over_sqlite() {
    crate::helpers::init_tracing();
    let service = RoutingServiceBuilder::new()
        .config(sqlite_config())
        .connect()
        .await
        .expect("service");
    let org = org();

    service.upsert_provider(&gpt4(org)).await.expect("provider");
    service.upsert_provider(&claude_sonnet(org)).await.expect("provider");
    service
        .create_budget(org, None, PeriodType::Monthly, 10_000)
        .await
        .expect("budget");
    service.health_check().await.expect("healthy");

    let response = service
        .route_request(&small_request(org, QualityTier::Gold))
        .await
        .expect("routed");
    let report = UsageReport::for_response(org, &response).succeeded(
        25,
        response.estimated_latency,
        40,
    );
    let outcome = service.record_usage(&report).await.expect("usage");
    assert_eq!(outcome.budget.spent_cents, 25);

    let status = service.get_budget_status(org).await.expect("status");
    assert_eq!(status.spent_cents, 25);
    assert_eq!(status.limit_cents, 10_000);

    let arms = service.arm_stats(org).await.expect("arms");
    assert_eq!(arms.len(), 1);
    assert_eq!(arms[0].key(), response.key());
    assert_eq!(arms[0].pulls, 1);

    service.shutdown().await;
}

/// Arms written through SQLite are read back by a new store
#[tokio::test]
async fn test_arm_store_over_sqlite() {
    let ledger = sqlite_store().await;
    let key = ProviderKey::new("openai", "gpt-4");

    let writer = LedgerArmStore::new(ledger.clone());
    let mut arm = BanditArm::new(&key);
    arm.pulls = 7;
    arm.total_reward = 8.4;
    writer
        .update("org-a", &key, &move |current: &mut BanditArm| {
            *current = arm.clone();
            current.refresh_average();
        })
        .await
        .expect("write");
    writer
        .update("org-b", &key, &|current: &mut BanditArm| current.pulls = 1)
        .await
        .expect("write");

    let reader = LedgerArmStore::new(ledger.clone());
    let restored = reader.get("org-a", &key).await.expect("get").expect("present");
    assert_eq!(restored.pulls, 7);
    assert!((restored.average_reward - 1.2).abs() < 1e-9);
    assert_eq!(reader.snapshot("org-b").await.expect("snapshot").len(), 1);

    assert!(reader.remove("org-a", &key).await.expect("remove"));
    assert!(ledger.load_arms("org-a").await.expect("load").is_empty());
}

/// Configuration loads from YAML and TOML files by extension
#[tokio::test]
async fn test_config_files() {
    let mut yaml = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("temp file");
    writeln!(
        yaml,
        "budget:\n  default_limit_cents: 5000\nquota:\n  default_rpm: 30\nselection:\n  strategy: epsilon_greedy\n  epsilon: 0.2"
    )
    .expect("write");
    let config = RouterConfig::load(yaml.path()).await.expect("yaml");
    assert_eq!(config.budget.default_limit_cents, 5000);
    assert_eq!(config.quota.default_rpm, 30);
    assert_eq!(config.selection.strategy, StrategyKind::EpsilonGreedy);

    let mut toml = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(toml, "[quota]\ndefault_max_concurrent = 4\n\n[cache]\nenabled = false").expect("write");
    let config = RouterConfig::load(toml.path()).await.expect("toml");
    assert_eq!(config.quota.default_max_concurrent, 4);
    assert!(!config.cache.enabled);

    let mut invalid = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("temp file");
    writeln!(invalid, "budget:\n  warning_pct: 95.0\n  critical_pct: 80.0").expect("write");
    assert!(RouterConfig::load(invalid.path()).await.is_err());
}
