//! End-to-end routing tests
//!
//! Requests go through the routing service over process-local stores,
//! covering admission, selection, reservation and outcome reporting.

use crate::fixtures::*;
use crate::helpers::*;
use pretty_assertions::assert_eq;
use router_core::{
    BanditArm, BudgetState, ConfigMap, PeriodType, ProviderKey, QualityTier, QuotaConfig,
    RouterConfig, RouterError, RoutingRequest,
};
use router_selection::{CandidateArm, SelectionStrategy, UcbStrategy};
use router_service::UsageReport;
use std::time::Duration;

fn single_slot_config() -> RouterConfig {
    let mut config = RouterConfig::default();
    config.quota = QuotaConfig::default().with_defaults(100, 1);
    config
}

/// $10 budget with $9.95 spent: 10 cents is refused, 4 cents is routed
#[tokio::test]
async fn test_budget_admission() {
    let harness = Harness::new().await;
    let org = org();
    harness.add_providers(&[cohere_command(org)]).await;
    let budget = harness
        .service
        .create_budget(org, None, PeriodType::Monthly, 1000)
        .await
        .expect("budget");
    harness.service.budget().record_spending(org, 995).await.expect("spend");

    let err = harness
        .service
        .route_request(&capped_request(org, 10))
        .await
        .expect_err("over budget");
    match err {
        RouterError::BudgetExceeded {
            budget_id,
            spent_cents,
            limit_cents,
            requested_cents,
        } => {
            assert_eq!(budget_id, budget.id);
            assert_eq!(spent_cents, 995);
            assert_eq!(limit_cents, 1000);
            assert_eq!(requested_cents, 10);
        }
        other => panic!("expected budget exceeded, got {other}"),
    }

    let response = harness
        .service
        .route_request(&capped_request(org, 4))
        .await
        .expect("routed");
    assert_eq!(response.provider_name, "cohere");

    let report = UsageReport::for_response(org, &response).succeeded(
        4,
        Duration::from_millis(900),
        20,
    );
    let outcome = harness.service.record_usage(&report).await.expect("usage");
    assert_eq!(outcome.budget.spent_cents, 999);

    let status = harness.service.get_budget_status(org).await.expect("status");
    assert_eq!(status.status, BudgetState::Critical);
    assert_eq!(status.remaining_cents, 1);
}

/// Uncapped requests are admitted while anything remains; the overshoot blocks the next one
#[tokio::test]
async fn test_uncapped_request_admitted_until_exhausted() {
    let harness = Harness::new().await;
    let org = org();
    harness.add_providers(&[gpt4(org)]).await;
    harness
        .service
        .create_budget(org, None, PeriodType::Monthly, 1000)
        .await
        .expect("budget");
    harness.service.budget().record_spending(org, 995).await.expect("spend");

    let request = small_request(org, QualityTier::Bronze);
    assert_eq!(request.requested_cents(), 0);
    let response = harness.service.route_request(&request).await.expect("admitted");
    assert!(response.estimated_cost_cents > 5);

    let report = UsageReport::for_response(org, &response).succeeded(
        response.estimated_cost_cents,
        response.estimated_latency,
        40,
    );
    let outcome = harness.service.record_usage(&report).await.expect("usage");
    assert!(outcome.budget.spent_cents > 1000);

    let err = harness
        .service
        .route_request(&request)
        .await
        .expect_err("exhausted");
    assert!(matches!(
        err,
        RouterError::BudgetExceeded {
            requested_cents: 0,
            ..
        }
    ));
}

/// The pick UCB makes over the org's current arms and ranking
async fn expected_ucb_pick(harness: &Harness, request: &RoutingRequest) -> ProviderKey {
    let org = request.org_id;
    let engine = harness.service.engine();
    let providers = harness
        .service
        .list_providers(org, true)
        .await
        .expect("providers");
    let ranked = engine.rank(providers, request, request.requested_cents());
    let arms = harness.service.arm_stats(org).await.expect("arms");
    let total_pulls = arms.iter().map(|arm| arm.pulls).sum();

    let candidates: Vec<CandidateArm> = ranked
        .iter()
        .map(|scored| CandidateArm {
            key: scored.key(),
            composite: scored.score(),
            arm: arms.iter().find(|arm| arm.key() == scored.key()).cloned(),
        })
        .collect();
    let config = engine.config();
    let choice = UcbStrategy::new(config.exploration, config.prior_weight)
        .choose(&candidates, total_pulls)
        .expect("choice");
    candidates[choice.index].key.clone()
}

/// An untried, pricier provider is explored ahead of a cheap proven one,
/// after which picks follow the UCB values
#[tokio::test]
async fn test_untried_provider_is_explored() {
    let mut config = RouterConfig::default();
    config.selection.estimators = config.selection.estimators.without_jitter();
    let harness = Harness::with_config(config).await;
    let org = org();
    harness.add_providers(&[gpt4(org), cohere_command(org)]).await;

    let pricey = ProviderKey::new("openai", "gpt-4");
    let cheap = ProviderKey::new("cohere", "command");
    let mut proven = BanditArm::new(&cheap);
    proven.pulls = 50;
    proven.total_reward = 60.0;
    harness
        .service
        .engine()
        .seed_arm(&Harness::scope(org), proven)
        .await
        .expect("seed");

    let request = capped_request(org, 50);
    let first = harness.service.route_request(&request).await.expect("routed");
    assert_eq!(first.key(), pricey);
    assert!(first.estimated_cost_cents > 1);
    assert_eq!(first.alternatives.len(), 1);
    assert_eq!(first.alternatives[0].provider_name, "cohere");
    let report = UsageReport::for_response(org, &first).failed(Duration::from_secs(5));
    harness.service.record_usage(&report).await.expect("usage");

    let arms = harness.service.arm_stats(org).await.expect("arms");
    let explored = arms.iter().find(|arm| arm.key() == pricey).expect("explored arm");
    assert_eq!(explored.pulls, 1);
    assert_eq!(explored.average_reward, -1.0);
    assert!(explored.last_selected.is_some());

    for _ in 0..20 {
        let expected = expected_ucb_pick(&harness, &request).await;
        let response = harness.service.route_request(&request).await.expect("routed");
        assert_eq!(response.key(), expected);

        let report = UsageReport::for_response(org, &response);
        let report = if response.key() == pricey {
            report.failed(Duration::from_secs(5))
        } else {
            report.succeeded(
                response.estimated_cost_cents,
                response.estimated_latency,
                20,
            )
        };
        harness.service.record_usage(&report).await.expect("usage");
    }

    let arms = harness.service.arm_stats(org).await.expect("arms");
    let total: u64 = arms.iter().map(|arm| arm.pulls).sum();
    assert_eq!(total, 50 + 21);
}

/// Route, report and the state of every manager afterwards
#[tokio::test]
async fn test_route_and_report_cycle() {
    let harness = Harness::new().await;
    let org = org();
    harness.add_providers(&[claude_sonnet(org)]).await;

    let response = harness
        .service
        .route_request(&small_request(org, QualityTier::Gold))
        .await
        .expect("routed");
    assert_eq!(response.provider_name, "anthropic");
    assert!(response.confidence > 0.0 && response.confidence <= 1.0);
    assert!(!response.reason.is_empty());

    let quota = harness
        .service
        .quota()
        .check_provider(&claude_sonnet(org))
        .await
        .expect("quota");
    assert_eq!(quota.concurrent_calls, 1);

    let report = UsageReport::for_response(org, &response).succeeded(
        response.estimated_cost_cents,
        response.estimated_latency,
        40,
    );
    let outcome = harness.service.record_usage(&report).await.expect("usage");
    assert!((outcome.reward - 1.6).abs() < 1e-9);
    assert_eq!(outcome.arm.pulls, 1);
    assert!((outcome.arm.average_reward - 1.6).abs() < 1e-9);
    assert_eq!(outcome.budget.spent_cents, response.estimated_cost_cents);

    let usage = harness
        .service
        .quota()
        .usage_stats(org, "anthropic", "claude-3-sonnet")
        .await
        .expect("usage");
    assert_eq!(usage.concurrent_calls, 0);
    assert_eq!(usage.tokens_used, 40);
}

/// A failed call is punished and still frees its slot
#[tokio::test]
async fn test_failed_call_feedback() {
    let harness = Harness::with_config(single_slot_config()).await;
    let org = org();
    harness.add_providers(&[gpt4(org)]).await;

    let response = harness
        .service
        .route_request(&small_request(org, QualityTier::Silver))
        .await
        .expect("routed");
    let report = UsageReport::for_response(org, &response).failed(Duration::from_secs(30));
    let outcome = harness.service.record_usage(&report).await.expect("usage");
    assert_eq!(outcome.reward, -1.0);
    assert_eq!(outcome.budget.spent_cents, 0);

    harness
        .service
        .route_request(&small_request(org, QualityTier::Silver))
        .await
        .expect("slot was released");
}

/// Only providers meeting the tier are considered
#[tokio::test]
async fn test_tier_filtering() {
    let harness = Harness::new().await;
    let org = org();
    harness.add_providers(&provider_fleet(org)).await;

    for _ in 0..4 {
        let response = harness
            .service
            .route_request(&small_request(org, QualityTier::Gold))
            .await
            .expect("routed");
        assert!(["openai", "anthropic"].contains(&response.provider_name.as_str()));
        for alternative in &response.alternatives {
            assert!(alternative.quality_score >= QualityTier::Gold.threshold());
        }
    }
}

/// Disabled providers are never routed to
#[tokio::test]
async fn test_disabled_providers_skipped() {
    let harness = Harness::new().await;
    let org = org();
    harness
        .add_providers(&[gpt4(org).disabled(), claude_sonnet(org).disabled()])
        .await;

    let err = harness
        .service
        .route_request(&small_request(org, QualityTier::Bronze))
        .await
        .expect_err("nothing enabled");
    assert!(matches!(err, RouterError::NoEligibleProvider { .. }));
    assert_eq!(err.code(), "no_eligible_provider");
}

/// Concurrent requests never reserve more slots than exist
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_routing_respects_quota() {
    let harness = Harness::with_config(single_slot_config()).await;
    let org = org();
    harness.add_providers(&[gpt4(org), claude_sonnet(org)]).await;

    let requests = (0..12).map(|_| {
        let service = harness.service.clone();
        tokio::spawn(async move {
            service
                .route_request(&small_request(org, QualityTier::Gold))
                .await
        })
    });
    let results = futures::future::join_all(requests).await;

    let mut routed = Vec::new();
    for result in results {
        match result.expect("join") {
            Ok(response) => routed.push(response.key()),
            Err(RouterError::NoCapacity { candidates }) => assert_eq!(candidates, 2),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    routed.sort();
    assert_eq!(
        routed,
        vec![
            ProviderKey::new("anthropic", "claude-3-sonnet"),
            ProviderKey::new("openai", "gpt-4"),
        ]
    );
}

/// Provider configuration reaches the routing decision
#[tokio::test]
async fn test_provider_config_in_response() {
    let harness = Harness::new().await;
    let org = org();
    harness.add_providers(&[cohere_command(org)]).await;

    let mut config = ConfigMap::new();
    config.insert("region".to_string(), serde_json::json!("eu-west-1"));
    config.insert("timeout_ms".to_string(), serde_json::json!(30000));
    harness
        .service
        .update_provider_config(org, "cohere", "command", &config)
        .await
        .expect("update");

    let response = harness
        .service
        .route_request(&small_request(org, QualityTier::Bronze))
        .await
        .expect("routed");
    assert_eq!(response.config, config);

    let mut nested = ConfigMap::new();
    nested.insert("headers".to_string(), serde_json::json!({"x-team": "ml"}));
    assert!(matches!(
        harness
            .service
            .update_provider_config(org, "cohere", "command", &nested)
            .await,
        Err(RouterError::Validation { .. })
    ));
}

/// Outcomes are counted and both stores report healthy
#[tokio::test]
async fn test_metrics_and_health() {
    let harness = Harness::new().await;
    let org = org();
    harness.add_providers(&[gpt4(org)]).await;

    harness
        .service
        .route_request(&small_request(org, QualityTier::Bronze))
        .await
        .expect("routed");
    let _ = harness
        .service
        .route_request(&small_request(crate::fixtures::org(), QualityTier::Bronze))
        .await;

    let text = harness.service.metrics().gather_text().expect("metrics");
    assert!(text.contains("llm_router_route_requests_total{outcome=\"routed\"} 1"));
    assert!(text.contains("llm_router_route_requests_total{outcome=\"no_eligible_provider\"} 1"));

    harness.service.health_check().await.expect("healthy");
    assert!(harness.stores_healthy().await);
}
