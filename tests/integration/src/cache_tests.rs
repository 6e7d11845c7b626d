//! Cache integration tests
//!
//! Hits, misses, expiry, privacy, per-organization isolation and warming.

use crate::fixtures::*;
use crate::helpers::*;
use pretty_assertions::assert_eq;
use router_cache::{generate_hash, CacheWarmer, ContentTag, WarmupPrompt};
use router_core::{CachePolicy, CacheRequest, PrivacyLevel, QualityTier, RouterConfig};
use serde_json::json;
use std::time::Duration;

fn request(prompt: &str, input: &str) -> CacheRequest {
    CacheRequest::new(
        generate_hash(prompt).expect("hash"),
        generate_hash(input).expect("hash"),
        json!({"text": format!("answer to {input}")}),
    )
}

/// A stored response is served until it is deleted
#[tokio::test]
async fn test_hit_after_put() {
    let harness = Harness::new().await;
    let org = org();
    let entry = request("You are terse.", "What is 2+2?");

    let miss = harness
        .service
        .cache_get(org, &entry.prompt_hash, &entry.input_hash)
        .await
        .expect("get");
    assert!(!miss.hit);

    assert!(harness.service.cache_put(org, &entry).await.expect("put"));
    let hit = harness
        .service
        .cache_get(org, &entry.prompt_hash, &entry.input_hash)
        .await
        .expect("get");
    assert!(hit.hit);
    assert_eq!(hit.response, Some(json!({"text": "answer to What is 2+2?"})));
    assert!(hit.expires_at > hit.created_at);

    let stats = harness.service.cache().stats(org).await.expect("stats");
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.puts, 1);
    assert_eq!(stats.size, 1);
    assert!((stats.hit_rate - 50.0).abs() < 1e-9);

    let metrics = harness.service.metrics().gather_text().expect("metrics");
    assert!(metrics.contains("llm_router_cache_lookups_total{result=\"hit\"} 1"));

    assert!(harness
        .service
        .cache()
        .delete(org, &entry.prompt_hash, &entry.input_hash)
        .await
        .expect("delete"));
    assert!(!harness
        .service
        .cache_get(org, &entry.prompt_hash, &entry.input_hash)
        .await
        .expect("get")
        .hit);
}

/// Entries stop being served at their expiry
#[tokio::test]
async fn test_expiry_follows_clock() {
    let harness = Harness::new().await;
    let org = org();
    let entry = request("system", "short lived").with_ttl(Duration::from_secs(60));
    harness.service.cache_put(org, &entry).await.expect("put");

    harness.clock.advance(Duration::from_secs(59));
    assert!(harness
        .service
        .cache_get(org, &entry.prompt_hash, &entry.input_hash)
        .await
        .expect("get")
        .hit);

    harness.clock.advance(Duration::from_secs(2));
    assert!(!harness
        .service
        .cache_get(org, &entry.prompt_hash, &entry.input_hash)
        .await
        .expect("get")
        .hit);
}

/// Public or disabled policies are never written
#[tokio::test]
async fn test_uncacheable_policies() {
    let harness = Harness::new().await;
    let org = org();

    let public = request("p", "public").with_policy(CachePolicy {
        privacy_level: PrivacyLevel::Public,
        ..CachePolicy::default()
    });
    assert!(!harness.service.cache_put(org, &public).await.expect("put"));

    let disabled = request("p", "disabled").with_policy(CachePolicy {
        enabled: false,
        ..CachePolicy::default()
    });
    assert!(!harness.service.cache_put(org, &disabled).await.expect("put"));

    assert_eq!(harness.service.cache().stats(org).await.expect("stats").size, 0);
}

/// A disabled cache misses and refuses writes
#[tokio::test]
async fn test_disabled_cache() {
    let mut config = RouterConfig::default();
    config.cache = config.cache.disabled();
    let harness = Harness::with_config(config).await;
    let org = org();
    let entry = request("p", "i");

    assert!(!harness.service.cache_put(org, &entry).await.expect("put"));
    assert!(!harness
        .service
        .cache_get(org, &entry.prompt_hash, &entry.input_hash)
        .await
        .expect("get")
        .hit);
}

/// Organizations never see each other's entries
#[tokio::test]
async fn test_org_isolation_and_clear() {
    let harness = Harness::new().await;
    let (alpha, beta) = (org(), org());
    let shared = request("shared prompt", "shared input");

    harness.service.cache_put(alpha, &shared).await.expect("put");
    harness
        .service
        .cache_put(alpha, &request("other", "entry"))
        .await
        .expect("put");
    harness.service.cache_put(beta, &shared).await.expect("put");

    assert_eq!(harness.service.cache().clear(alpha).await.expect("clear"), 2);
    assert!(!harness
        .service
        .cache_get(alpha, &shared.prompt_hash, &shared.input_hash)
        .await
        .expect("get")
        .hit);
    assert!(harness
        .service
        .cache_get(beta, &shared.prompt_hash, &shared.input_hash)
        .await
        .expect("get")
        .hit);
}

/// Tier and content tags pick the entry lifetime
#[tokio::test]
async fn test_policy_derivation() {
    let harness = Harness::new().await;
    let cache = harness.service.cache();
    let config = cache.config().clone();

    assert_eq!(cache.policy_for(Some(QualityTier::Gold), None).ttl, config.gold_ttl);
    assert_eq!(
        cache.policy_for(Some(QualityTier::Bronze), None).ttl,
        config.bronze_ttl
    );
    assert_eq!(
        cache.policy_for(None, Some(ContentTag::System)).ttl,
        config.system_prompt_ttl
    );
    assert_eq!(cache.policy_for(None, None).ttl, config.default_ttl);
}

/// The warmer stores what the policy allows and counts the rest
#[tokio::test]
async fn test_warmer() {
    let harness = Harness::new().await;
    let org = org();
    let warmer = CacheWarmer::new(harness.service.cache().clone()).with_concurrency(2);

    let mut refused = WarmupPrompt::from_content("faq", "public question", json!("no")).expect("prompt");
    refused.policy = Some(CachePolicy {
        privacy_level: PrivacyLevel::Public,
        ..CachePolicy::default()
    });
    let prompts = vec![
        WarmupPrompt::from_content("faq", "opening hours", json!("9 to 5")).expect("prompt"),
        WarmupPrompt::from_content("faq", "refund policy", json!("30 days")).expect("prompt"),
        refused,
    ];
    let opening = prompts[0].clone();

    let report = warmer.warm(org, prompts).await;
    assert_eq!(report.stored, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.total(), 3);

    let hit = harness
        .service
        .cache_get(org, &opening.prompt_hash, &opening.input_hash)
        .await
        .expect("get");
    assert_eq!(hit.response, Some(json!("9 to 5")));
}
