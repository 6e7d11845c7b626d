//! Quota integration tests
//!
//! Reservation atomicity under concurrency, minute windows, release and
//! usage accounting.

use crate::fixtures::*;
use crate::helpers::*;
use pretty_assertions::assert_eq;
use router_core::RouterError;
use std::time::Duration;

/// N concurrent reservations against a ceiling of K admit exactly K
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_reservations_respect_ceiling() {
    let harness = Harness::new().await;
    let org = org();
    let quota = harness.service.quota().clone();
    quota
        .set_quota_limits(org, "openai", "gpt-4", 1000, 5)
        .await
        .expect("limits");

    let attempts = (0..40).map(|_| {
        let quota = quota.clone();
        tokio::spawn(async move { quota.reserve_quota(org, "openai", "gpt-4").await })
    });
    let results = futures::future::join_all(attempts).await;

    let mut reserved = 0;
    let mut lost = 0;
    for result in results {
        match result.expect("join") {
            Ok(()) => reserved += 1,
            Err(RouterError::ReservationRaceLost { reason, .. }) => {
                assert_eq!(reason, "concurrency limit");
                lost += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(reserved, 5);
    assert_eq!(lost, 35);

    let status = quota.check_quota(org, "openai", "gpt-4").await.expect("status");
    assert_eq!(status.concurrent_calls, 5);
    assert_eq!(status.current_qps, 5);
    assert!(!status.has_headroom());
}

/// The rate counter starts over in the next minute
#[tokio::test]
async fn test_rate_window_resets() {
    let harness = Harness::new().await;
    let org = org();
    let quota = harness.service.quota();
    quota
        .set_quota_limits(org, "cohere", "command", 3, 100)
        .await
        .expect("limits");

    for _ in 0..3 {
        quota.reserve_quota(org, "cohere", "command").await.expect("reserve");
    }
    let refused = quota.reserve_quota(org, "cohere", "command").await;
    assert!(matches!(
        refused,
        Err(RouterError::ReservationRaceLost { ref reason, .. }) if reason == "rate limit"
    ));

    harness.clock.advance(Duration::from_secs(60));
    let status = quota.check_quota(org, "cohere", "command").await.expect("status");
    assert_eq!(status.current_qps, 0);
    quota.reserve_quota(org, "cohere", "command").await.expect("new window");
    let status = quota.check_quota(org, "cohere", "command").await.expect("status");
    assert_eq!(status.current_qps, 1);
    assert_eq!(status.concurrent_calls, 4);
}

/// Releasing with nothing in flight leaves the counter at zero
#[tokio::test]
async fn test_release_clamps_at_zero() {
    let harness = Harness::new().await;
    let org = org();
    let quota = harness.service.quota();

    quota.release_quota(org, "google", "gemini-pro").await.expect("release");
    quota.release_quota(org, "google", "gemini-pro").await.expect("release");

    let status = quota.check_quota(org, "google", "gemini-pro").await.expect("status");
    assert_eq!(status.concurrent_calls, 0);
}

/// Usage adds tokens and frees the in-flight slot
#[tokio::test]
async fn test_record_usage_releases() {
    let harness = Harness::new().await;
    let org = org();
    let quota = harness.service.quota();

    quota.reserve_quota(org, "anthropic", "claude-3-sonnet").await.expect("reserve");
    quota
        .record_usage(org, "anthropic", "claude-3-sonnet", 1500)
        .await
        .expect("usage");
    quota
        .record_usage(org, "anthropic", "claude-3-sonnet", 500)
        .await
        .expect("usage");

    let usage = quota
        .usage_stats(org, "anthropic", "claude-3-sonnet")
        .await
        .expect("stats");
    assert_eq!(usage.tokens_used, 2000);
    assert_eq!(usage.requests_this_minute, 1);
    assert_eq!(usage.concurrent_calls, 0);
}

/// Reset clears counters and every touched pair is listed
#[tokio::test]
async fn test_reset_and_listing() {
    let harness = Harness::new().await;
    let org = org();
    let quota = harness.service.quota();

    quota.reserve_quota(org, "openai", "gpt-4").await.expect("reserve");
    quota.reserve_quota(org, "openai", "gpt-4").await.expect("reserve");
    quota
        .set_quota_limits(org, "cohere", "command", 10, 2)
        .await
        .expect("limits");

    let listed = quota.all_quota_status(org).await.expect("all");
    let mut names: Vec<String> = listed
        .iter()
        .map(|s| format!("{}/{}", s.provider_name, s.model_name))
        .collect();
    names.sort();
    assert_eq!(names, vec!["cohere/command".to_string(), "openai/gpt-4".to_string()]);

    quota.reset_quota(org, "openai", "gpt-4").await.expect("reset");
    let status = quota.check_quota(org, "openai", "gpt-4").await.expect("status");
    assert_eq!(status.current_qps, 0);
    assert_eq!(status.concurrent_calls, 0);
}

/// Non-positive limits are refused
#[tokio::test]
async fn test_invalid_limits() {
    let harness = Harness::new().await;
    let result = harness
        .service
        .quota()
        .set_quota_limits(org(), "openai", "gpt-4", 0, 5)
        .await;
    assert!(matches!(result, Err(RouterError::Validation { .. })));
}

/// Provider status defaults the rate ceiling to the provider's limit
#[tokio::test]
async fn test_provider_limit_is_default_rate() {
    let harness = Harness::new().await;
    let org = org();
    let provider = gpt4(org).with_qps_limit(2);
    harness.add_providers(&[provider.clone()]).await;

    let quota = harness.service.quota();
    quota.reserve_provider(&provider).await.expect("first");
    quota.reserve_provider(&provider).await.expect("second");
    assert!(matches!(
        quota.reserve_provider(&provider).await,
        Err(RouterError::ReservationRaceLost { .. })
    ));

    let statuses = harness.service.get_quota_status(org).await.expect("status");
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].limit_qps, 2);
    assert_eq!(statuses[0].current_qps, 2);
}
