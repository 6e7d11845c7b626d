//! Outcome reports for routed calls.

use router_core::{BanditArm, Budget, OrgId, ProviderKey, RouterError, RouterResult, RoutingResponse};
use router_selection::RewardInput;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happened when the caller used a routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    /// Organization that made the call
    pub org_id: OrgId,
    /// Provider that served it
    pub provider_name: String,
    /// Model that served it
    pub model_name: String,
    /// Whether the call succeeded
    pub success: bool,
    /// Tokens consumed
    pub tokens_used: u64,
    /// Actual cost in cents
    pub actual_cost_cents: i64,
    /// Cost estimate from the decision
    pub estimated_cost_cents: i64,
    /// Observed latency
    #[serde(with = "humantime_serde")]
    pub actual_latency: Duration,
    /// Latency estimate from the decision
    #[serde(with = "humantime_serde")]
    pub estimated_latency: Duration,
}

impl UsageReport {
    /// Start a report for a decision, carrying its estimates
    ///
    /// The report starts as a failure with no usage; call
    /// [`UsageReport::succeeded`] once the provider answers.
    #[must_use]
    pub fn for_response(org_id: OrgId, response: &RoutingResponse) -> Self {
        Self {
            org_id,
            provider_name: response.provider_name.clone(),
            model_name: response.model_name.clone(),
            success: false,
            tokens_used: 0,
            actual_cost_cents: 0,
            estimated_cost_cents: response.estimated_cost_cents,
            actual_latency: Duration::ZERO,
            estimated_latency: response.estimated_latency,
        }
    }

    /// Mark the call successful with its actual usage
    #[must_use]
    pub fn succeeded(mut self, cost_cents: i64, latency: Duration, tokens: u64) -> Self {
        self.success = true;
        self.actual_cost_cents = cost_cents;
        self.actual_latency = latency;
        self.tokens_used = tokens;
        self
    }

    /// Mark the call failed after `latency`
    #[must_use]
    pub fn failed(mut self, latency: Duration) -> Self {
        self.success = false;
        self.actual_latency = latency;
        self
    }

    /// Provider/model key
    #[must_use]
    pub fn key(&self) -> ProviderKey {
        ProviderKey::new(&self.provider_name, &self.model_name)
    }

    /// Inputs for the reward calculation
    #[must_use]
    pub fn reward_input(&self) -> RewardInput {
        RewardInput {
            success: self.success,
            actual_cost_cents: self.actual_cost_cents,
            estimated_cost_cents: self.estimated_cost_cents,
            actual_latency: self.actual_latency,
            estimated_latency: self.estimated_latency,
        }
    }

    /// Validate the report
    ///
    /// # Errors
    /// Returns error if names are empty or costs are negative
    pub fn validate(&self) -> RouterResult<()> {
        if self.provider_name.is_empty() || self.model_name.is_empty() {
            return Err(RouterError::validation(
                "provider and model names are required",
                Some("provider_name".to_string()),
                "missing_provider",
            ));
        }
        if self.actual_cost_cents < 0 || self.estimated_cost_cents < 0 {
            return Err(RouterError::validation(
                "costs must not be negative",
                Some("actual_cost_cents".to_string()),
                "negative_cost",
            ));
        }
        Ok(())
    }
}

/// State after a usage report was applied
#[derive(Debug, Clone, PartialEq)]
pub struct UsageOutcome {
    /// Budget after the spend was recorded
    pub budget: Budget,
    /// Reward fed to the bandit
    pub reward: f64,
    /// Arm after the reward was applied
    pub arm: BanditArm,
}
