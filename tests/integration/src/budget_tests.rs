//! Budget integration tests
//!
//! Period budgets, threshold classification, spend recording and alerts.

use crate::fixtures::*;
use crate::helpers::*;
use pretty_assertions::assert_eq;
use router_core::{BudgetState, PeriodType, RouterError};
use std::time::Duration;

/// The first check of a period creates one default budget
#[tokio::test]
async fn test_default_budget_created_once() {
    let harness = Harness::new().await;
    let org = org();

    let first = harness.service.get_budget_status(org).await.expect("status");
    let second = harness.service.get_budget_status(org).await.expect("status");

    assert_eq!(first.budget_id, second.budget_id);
    assert_eq!(first.limit_cents, 1_000_000);
    assert_eq!(first.status, BudgetState::Healthy);
    assert_eq!(
        harness.service.budget().list_budgets(org).await.expect("list").len(),
        1
    );
}

/// Concurrent first checks still share one budget
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_default_budget_dedupes() {
    let harness = Harness::new().await;
    let org = org();

    let checks = (0..16).map(|_| {
        let service = harness.service.clone();
        tokio::spawn(async move { service.get_budget_status(org).await })
    });
    let statuses = futures::future::join_all(checks).await;

    let first = statuses[0].as_ref().expect("join").as_ref().expect("status").budget_id;
    for status in &statuses {
        let status = status.as_ref().expect("join").as_ref().expect("status");
        assert_eq!(status.budget_id, first);
    }
    assert_eq!(
        harness.service.budget().list_budgets(org).await.expect("list").len(),
        1
    );
}

/// Status moves through warning and critical to exceeded
#[tokio::test]
async fn test_thresholds_and_alert() {
    let mut harness = Harness::new().await;
    let org = org();
    let budget = harness
        .service
        .create_budget(org, None, PeriodType::Monthly, 1000)
        .await
        .expect("budget");

    let budgets = harness.service.budget();
    budgets.record_spending(org, 760).await.expect("spend");
    assert_eq!(
        harness.service.get_budget_status(org).await.expect("status").status,
        BudgetState::Warning
    );

    budgets.record_spending(org, 160).await.expect("spend");
    let status = harness.service.get_budget_status(org).await.expect("status");
    assert_eq!(status.status, BudgetState::Critical);
    assert_eq!(status.remaining_cents, 80);

    let updated = budgets.record_spending(org, 100).await.expect("spend");
    assert_eq!(updated.id, budget.id);
    assert_eq!(updated.spent_cents, 1020);

    let alert = harness.alerts.recv().await.expect("alert");
    assert_eq!(alert.budget_id, budget.id);
    assert_eq!(alert.spent_cents, 1020);
    assert_eq!(alert.limit_cents, 1000);
    assert!(harness.service.get_budget_status(org).await.expect("status").is_exceeded());
}

/// A request larger than what remains is classified as exceeded
#[tokio::test]
async fn test_check_against_requested_amount() {
    let harness = Harness::new().await;
    let org = org();
    harness
        .service
        .create_budget(org, None, PeriodType::Daily, 100)
        .await
        .expect("budget");
    harness.service.budget().record_spending(org, 40).await.expect("spend");

    let budgets = harness.service.budget();
    assert!(!budgets.check_budget(org, 60).await.expect("check").is_exceeded());
    assert!(budgets.check_budget(org, 61).await.expect("check").is_exceeded());
}

/// A new period gets a fresh budget and the old one is kept
#[tokio::test]
async fn test_period_rollover() {
    let harness = Harness::new().await;
    let org = org();
    let march = harness
        .service
        .create_budget(org, None, PeriodType::Monthly, 500)
        .await
        .expect("budget");
    harness.service.budget().record_spending(org, 200).await.expect("spend");

    harness.clock.advance(Duration::from_secs(25 * 24 * 3600));
    let april = harness.service.get_budget_status(org).await.expect("status");

    assert!(april.budget_id != march.id);
    assert_eq!(april.spent_cents, 0);
    assert!(april.period_start >= march.period_end);
    let kept = harness.service.budget().get_budget(march.id).await.expect("march");
    assert_eq!(kept.spent_cents, 200);
}

/// Negative amounts are rejected before touching the ledger
#[tokio::test]
async fn test_negative_amounts_rejected() {
    let harness = Harness::new().await;
    let org = org();
    let budgets = harness.service.budget();

    assert!(matches!(
        budgets.record_spending(org, -5).await,
        Err(RouterError::Validation { .. })
    ));
    assert!(matches!(
        harness.service.create_budget(org, None, PeriodType::Weekly, -1).await,
        Err(RouterError::Validation { .. })
    ));
}

/// Limits can be changed and budgets removed
#[tokio::test]
async fn test_update_and_delete() {
    let harness = Harness::new().await;
    let org = org();
    let budgets = harness.service.budget();
    let budget = harness
        .service
        .create_budget(org, None, PeriodType::Monthly, 500)
        .await
        .expect("budget");

    let raised = budgets.update_budget(budget.id, 2500).await.expect("update");
    assert_eq!(raised.limit_cents, 2500);
    assert_eq!(
        harness.service.get_budget_status(org).await.expect("status").limit_cents,
        2500
    );

    budgets.delete_budget(budget.id).await.expect("delete");
    assert!(matches!(
        budgets.get_budget(budget.id).await,
        Err(RouterError::NotFound { .. })
    ));
}
