//! Test fixtures for providers and requests

use router_core::{OrgId, ProviderConfig, QualityTier, RoutingRequest};
use std::time::Duration;
use uuid::Uuid;

/// A fresh organization id
pub fn org() -> OrgId {
    Uuid::new_v4()
}

/// GPT-4, the most expensive fixture
pub fn gpt4(org_id: OrgId) -> ProviderConfig {
    ProviderConfig::new(org_id, "openai", "gpt-4").with_pricing(0.003, 0.006)
}

/// Claude Sonnet at half the price of GPT-4
pub fn claude_sonnet(org_id: OrgId) -> ProviderConfig {
    ProviderConfig::new(org_id, "anthropic", "claude-3-sonnet").with_pricing(0.0015, 0.003)
}

/// Cohere Command, the cheapest priced fixture
pub fn cohere_command(org_id: OrgId) -> ProviderConfig {
    ProviderConfig::new(org_id, "cohere", "command").with_pricing(0.0005, 0.0005)
}

/// A self-hosted model with no pricing and the default quality score
pub fn local_llama(org_id: OrgId) -> ProviderConfig {
    ProviderConfig::new(org_id, "local", "llama-3")
}

/// Every fixture provider
pub fn provider_fleet(org_id: OrgId) -> Vec<ProviderConfig> {
    vec![
        gpt4(org_id),
        claude_sonnet(org_id),
        cohere_command(org_id),
        local_llama(org_id),
    ]
}

/// A small request at a tier
pub fn small_request(org_id: OrgId, tier: QualityTier) -> RoutingRequest {
    RoutingRequest::builder(org_id)
        .quality_tier(tier)
        .prompt_tokens(20)
        .max_tokens(20)
        .latency_sla(Duration::from_secs(2))
        .build()
        .expect("valid request")
}

/// A request capped at `budget_cents`
pub fn capped_request(org_id: OrgId, budget_cents: i64) -> RoutingRequest {
    RoutingRequest::builder(org_id)
        .prompt_tokens(10)
        .max_tokens(10)
        .budget_cents(budget_cents)
        .build()
        .expect("valid request")
}
