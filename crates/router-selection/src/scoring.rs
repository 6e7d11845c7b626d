//! Multi-criteria provider scoring.
//!
//! The composite score is a weighted sum of four scores in [0, 1]:
//!
//! - cost: `1 - estimate / available budget`, 0 when the estimate does not fit
//! - quality: reputation score
//! - latency: `1 - estimate / sla`, a configured default without an SLA
//! - reliability: expected success rate

use router_core::{
    Alternative, ProviderConfig, ProviderKey, QualityTier, RoutingRequest, ScoringWeights,
    SelectionConfig,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::estimator::{LatencyEstimator, QualityEstimator, ReliabilityEstimator, TableEstimator};

/// Cost score of an estimate against the available budget
#[must_use]
pub fn cost_score(estimated_cents: i64, available_cents: i64) -> f64 {
    if available_cents <= 0 || estimated_cents > available_cents {
        return 0.0;
    }
    1.0 - estimated_cents as f64 / available_cents as f64
}

/// Latency score of an estimate against an optional SLA
#[must_use]
pub fn latency_score(estimated: Duration, sla: Option<Duration>, default_score: f64) -> f64 {
    match sla {
        Some(sla) if !sla.is_zero() => {
            if estimated > sla {
                0.0
            } else {
                1.0 - estimated.as_secs_f64() / sla.as_secs_f64()
            }
        }
        _ => default_score,
    }
}

/// Individual and composite scores of one provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// Cost score
    pub cost: f64,
    /// Quality (reputation) score
    pub quality: f64,
    /// Latency score
    pub latency: f64,
    /// Reliability score
    pub reliability: f64,
    /// Weighted sum
    pub composite: f64,
}

impl ScoreBreakdown {
    fn reasons(&self) -> Vec<&'static str> {
        let mut reasons = Vec::new();
        if self.cost > 0.8 {
            reasons.push("cost-effective");
        }
        if self.quality > 0.8 {
            reasons.push("high-quality");
        }
        if self.latency > 0.8 {
            reasons.push("low-latency");
        }
        if self.reliability > 0.9 {
            reasons.push("reliable");
        }
        reasons
    }
}

/// A provider with its estimates and scores
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredProvider {
    /// Provider configuration
    pub provider: ProviderConfig,
    /// Cost estimate in cents
    pub estimated_cost_cents: i64,
    /// Latency estimate
    pub estimated_latency: Duration,
    /// Scores
    pub breakdown: ScoreBreakdown,
    /// Justification
    pub reason: String,
}

impl ScoredProvider {
    /// Provider/model key
    #[must_use]
    pub fn key(&self) -> ProviderKey {
        self.provider.key()
    }

    /// Composite score
    #[must_use]
    pub fn score(&self) -> f64 {
        self.breakdown.composite
    }

    /// Describe this provider as an alternative
    #[must_use]
    pub fn to_alternative(&self) -> Alternative {
        Alternative {
            provider_name: self.provider.provider_name.clone(),
            model_name: self.provider.model_name.clone(),
            estimated_cost_cents: self.estimated_cost_cents,
            estimated_latency: self.estimated_latency,
            quality_score: self.breakdown.quality,
            reason: self.reason.clone(),
        }
    }
}

/// Scores and ranks providers for a request
#[derive(Clone)]
pub struct ProviderScorer {
    quality: Arc<dyn QualityEstimator>,
    latency: Arc<dyn LatencyEstimator>,
    reliability: Arc<dyn ReliabilityEstimator>,
    weights: ScoringWeights,
    default_latency_score: f64,
}

impl ProviderScorer {
    /// Create a scorer from individual estimators
    #[must_use]
    pub fn new(
        quality: Arc<dyn QualityEstimator>,
        latency: Arc<dyn LatencyEstimator>,
        reliability: Arc<dyn ReliabilityEstimator>,
        config: &SelectionConfig,
    ) -> Self {
        Self {
            quality,
            latency,
            reliability,
            weights: config.weights,
            default_latency_score: config.default_latency_score,
        }
    }

    /// Create a scorer answering every estimate from one table estimator
    #[must_use]
    pub fn from_tables(estimator: &Arc<TableEstimator>, config: &SelectionConfig) -> Self {
        Self::new(
            estimator.clone(),
            estimator.clone(),
            estimator.clone(),
            config,
        )
    }

    /// Reputation score of a provider
    #[must_use]
    pub fn quality_of(&self, provider: &ProviderConfig) -> f64 {
        self.quality
            .quality(&provider.provider_name, &provider.model_name)
    }

    /// Providers whose reputation admits the tier, in input order
    #[must_use]
    pub fn eligible(&self, providers: Vec<ProviderConfig>, tier: QualityTier) -> Vec<ProviderConfig> {
        providers
            .into_iter()
            .filter(|p| p.enabled && tier.admits(self.quality_of(p)))
            .collect()
    }

    /// Score one provider
    #[must_use]
    pub fn score(
        &self,
        provider: ProviderConfig,
        request: &RoutingRequest,
        available_cents: i64,
    ) -> ScoredProvider {
        let estimated_cost_cents =
            provider.estimate_cost_cents(request.prompt_tokens, request.max_tokens);
        let estimated_latency = self
            .latency
            .latency(&provider.provider_name, &provider.model_name);

        let cost = cost_score(estimated_cost_cents, available_cents);
        let quality = self.quality_of(&provider);
        let latency = latency_score(
            estimated_latency,
            request.latency_sla,
            self.default_latency_score,
        );
        let reliability = self
            .reliability
            .reliability(&provider.provider_name, &provider.model_name);

        let composite = cost * self.weights.cost
            + quality * self.weights.quality
            + latency * self.weights.latency
            + reliability * self.weights.reliability;

        let breakdown = ScoreBreakdown {
            cost,
            quality,
            latency,
            reliability,
            composite,
        };
        let reasons = breakdown.reasons();
        let reason = if reasons.is_empty() {
            "optimal choice".to_string()
        } else {
            format!("selected for: [{}]", reasons.join(" "))
        };

        ScoredProvider {
            provider,
            estimated_cost_cents,
            estimated_latency,
            breakdown,
            reason,
        }
    }

    /// Score every provider and sort by composite score, highest first
    ///
    /// Equal scores keep their input order.
    #[must_use]
    pub fn rank(
        &self,
        providers: Vec<ProviderConfig>,
        request: &RoutingRequest,
        available_cents: i64,
    ) -> Vec<ScoredProvider> {
        let mut scored: Vec<ScoredProvider> = providers
            .into_iter()
            .map(|p| self.score(p, request, available_cents))
            .collect();
        scored.sort_by(|a, b| b.score().total_cmp(&a.score()));
        scored
    }
}

impl std::fmt::Debug for ProviderScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderScorer")
            .field("weights", &self.weights)
            .field("default_latency_score", &self.default_latency_score)
            .finish_non_exhaustive()
    }
}
