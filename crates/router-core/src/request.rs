//! Routing request type.
//!
//! A [`RoutingRequest`] describes the work a caller wants routed: who pays
//! for it, how good the answer must be and how large it is expected to be.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::RouterError;
use crate::types::{ConfigMap, OrgId, QualityTier};

/// Request for a routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRequest {
    /// Organization paying for the request
    pub org_id: OrgId,

    /// Minimum quality tier
    #[serde(default)]
    pub quality_tier: QualityTier,

    /// Estimated prompt tokens
    #[serde(default)]
    pub prompt_tokens: u32,

    /// Maximum response tokens
    #[serde(default)]
    pub max_tokens: u32,

    /// Latency ceiling
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub latency_sla: Option<Duration>,

    /// Budget ceiling in cents for this request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_cents: Option<i64>,

    /// Free-form routing constraints
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub constraints: ConfigMap,

    /// Free-form caller context
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub context: ConfigMap,
}

impl RoutingRequest {
    /// Create a new request builder
    #[must_use]
    pub fn builder(org_id: OrgId) -> RoutingRequestBuilder {
        RoutingRequestBuilder::new(org_id)
    }

    /// Cents the caller asks the budget to cover, zero when unbounded
    #[must_use]
    pub fn requested_cents(&self) -> i64 {
        self.budget_cents.unwrap_or(0)
    }

    /// Validate the request
    ///
    /// # Errors
    /// Returns error if any field is invalid
    pub fn validate(&self) -> Result<(), RouterError> {
        if let Some(budget) = self.budget_cents {
            if budget < 0 {
                return Err(RouterError::validation(
                    format!("budget_cents must not be negative, got {budget}"),
                    Some("budget_cents".to_string()),
                    "invalid_budget_cents",
                ));
            }
        }

        if let Some(sla) = self.latency_sla {
            if sla.is_zero() {
                return Err(RouterError::validation(
                    "latency_sla must be greater than zero",
                    Some("latency_sla".to_string()),
                    "invalid_latency_sla",
                ));
            }
        }

        if self.prompt_tokens == 0 && self.max_tokens == 0 {
            return Err(RouterError::validation(
                "prompt_tokens and max_tokens cannot both be zero",
                Some("max_tokens".to_string()),
                "empty_request",
            ));
        }

        Ok(())
    }
}

/// Builder for [`RoutingRequest`]
#[derive(Debug)]
pub struct RoutingRequestBuilder {
    request: RoutingRequest,
}

impl RoutingRequestBuilder {
    /// Create a builder for the organization
    #[must_use]
    pub fn new(org_id: OrgId) -> Self {
        Self {
            request: RoutingRequest {
                org_id,
                quality_tier: QualityTier::default(),
                prompt_tokens: 0,
                max_tokens: 0,
                latency_sla: None,
                budget_cents: None,
                constraints: ConfigMap::new(),
                context: ConfigMap::new(),
            },
        }
    }

    /// Set the quality tier
    #[must_use]
    pub fn quality_tier(mut self, tier: QualityTier) -> Self {
        self.request.quality_tier = tier;
        self
    }

    /// Set the estimated prompt tokens
    #[must_use]
    pub fn prompt_tokens(mut self, tokens: u32) -> Self {
        self.request.prompt_tokens = tokens;
        self
    }

    /// Set the maximum response tokens
    #[must_use]
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.request.max_tokens = tokens;
        self
    }

    /// Set the latency ceiling
    #[must_use]
    pub fn latency_sla(mut self, sla: Duration) -> Self {
        self.request.latency_sla = Some(sla);
        self
    }

    /// Set the budget ceiling in cents
    #[must_use]
    pub fn budget_cents(mut self, cents: i64) -> Self {
        self.request.budget_cents = Some(cents);
        self
    }

    /// Add a constraint
    #[must_use]
    pub fn constraint(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.request.constraints.insert(key.into(), value.into());
        self
    }

    /// Add a context entry
    #[must_use]
    pub fn context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.request.context.insert(key.into(), value.into());
        self
    }

    /// Build the request
    ///
    /// # Errors
    /// Returns error if the request fails validation
    pub fn build(self) -> Result<RoutingRequest, RouterError> {
        self.request.validate()?;
        Ok(self.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_builder() {
        let org = Uuid::new_v4();
        let request = RoutingRequest::builder(org)
            .quality_tier(QualityTier::Gold)
            .prompt_tokens(1000)
            .max_tokens(500)
            .latency_sla(Duration::from_secs(2))
            .budget_cents(10)
            .constraint("region", "eu")
            .build()
            .expect("valid request");

        assert_eq!(request.org_id, org);
        assert_eq!(request.quality_tier, QualityTier::Gold);
        assert_eq!(request.requested_cents(), 10);
        assert_eq!(request.constraints.get("region"), Some(&serde_json::json!("eu")));
    }

    #[test]
    fn test_negative_budget_rejected() {
        let err = RoutingRequest::builder(Uuid::new_v4())
            .max_tokens(10)
            .budget_cents(-1)
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn test_zero_sla_rejected() {
        let result = RoutingRequest::builder(Uuid::new_v4())
            .max_tokens(10)
            .latency_sla(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_request_rejected() {
        assert!(RoutingRequest::builder(Uuid::new_v4()).build().is_err());
    }

    #[test]
    fn test_deserialize_humantime_sla() {
        let json = serde_json::json!({
            "org_id": Uuid::nil(),
            "quality_tier": "Silver",
            "prompt_tokens": 10,
            "max_tokens": 20,
            "latency_sla": "1500ms"
        });
        let request: RoutingRequest = serde_json::from_value(json).expect("deserialize");
        assert_eq!(request.latency_sla, Some(Duration::from_millis(1500)));
        assert_eq!(request.requested_cents(), 0);
    }
}
