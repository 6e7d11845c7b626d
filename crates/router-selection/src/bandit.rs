//! Explore/exploit strategies over ranked candidates.
//!
//! Strategies are pure functions of the candidate list and arm history. They
//! never touch the arm store; the engine records the pull once the chosen
//! provider is actually reserved.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use router_core::{BanditArm, ProviderKey, SelectionConfig, StrategyKind};
use std::sync::Arc;
use std::time::Duration;

/// A ranked candidate together with its arm history, if any
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateArm {
    /// Provider/model key
    pub key: ProviderKey,
    /// Composite score from the scorer
    pub composite: f64,
    /// Arm history; `None` when the arm was never seen
    pub arm: Option<BanditArm>,
}

impl CandidateArm {
    fn pulls(&self) -> u64 {
        self.arm.as_ref().map_or(0, |arm| arm.pulls)
    }
}

/// Outcome of a strategy decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Choice {
    /// Index into the candidate list
    pub index: usize,
    /// Value the candidate won with
    pub value: f64,
    /// Whether the choice was exploration rather than exploitation
    pub forced: bool,
}

/// Picks one candidate from a ranked list
pub trait SelectionStrategy: Send + Sync + std::fmt::Debug {
    /// Strategy name for logs
    fn name(&self) -> &'static str;

    /// Choose a candidate
    ///
    /// `total_pulls` covers every arm in the scope, not only the candidates.
    /// Returns `None` only for an empty candidate list.
    fn choose(&self, candidates: &[CandidateArm], total_pulls: u64) -> Option<Choice>;
}

/// Upper confidence bound strategy
#[derive(Debug, Clone, Copy)]
pub struct UcbStrategy {
    exploration: f64,
    prior_weight: f64,
}

impl UcbStrategy {
    /// Create a strategy with an exploration constant and composite-score weight
    #[must_use]
    pub fn new(exploration: f64, prior_weight: f64) -> Self {
        Self {
            exploration,
            prior_weight,
        }
    }

    fn value(&self, candidate: &CandidateArm, total_pulls: u64) -> f64 {
        let (pulls, average) = candidate
            .arm
            .as_ref()
            .map_or((0, 0.0), |arm| (arm.pulls, arm.average_reward));
        let bonus = if pulls == 0 || total_pulls == 0 {
            0.0
        } else {
            self.exploration * ((total_pulls as f64).ln() / pulls as f64).sqrt()
        };
        average + bonus + self.prior_weight * candidate.composite
    }
}

impl Default for UcbStrategy {
    fn default() -> Self {
        Self::new(std::f64::consts::SQRT_2, 0.3)
    }
}

impl SelectionStrategy for UcbStrategy {
    fn name(&self) -> &'static str {
        "ucb"
    }

    fn choose(&self, candidates: &[CandidateArm], total_pulls: u64) -> Option<Choice> {
        if let Some(index) = candidates.iter().position(|c| c.pulls() == 0) {
            return Some(Choice {
                index,
                value: f64::INFINITY,
                forced: true,
            });
        }

        let mut best: Option<Choice> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            let value = self.value(candidate, total_pulls);
            if best.map_or(true, |b| value > b.value) {
                best = Some(Choice {
                    index,
                    value,
                    forced: false,
                });
            }
        }
        best
    }
}

/// Epsilon-greedy strategy
#[derive(Debug)]
pub struct EpsilonGreedyStrategy {
    epsilon: f64,
    rng: Mutex<StdRng>,
}

impl EpsilonGreedyStrategy {
    /// Create a strategy exploring with probability `epsilon`
    #[must_use]
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon: epsilon.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create a strategy with a fixed seed, for reproducible tests
    #[must_use]
    pub fn with_seed(epsilon: f64, seed: u64) -> Self {
        Self {
            epsilon: epsilon.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Exploration probability
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl SelectionStrategy for EpsilonGreedyStrategy {
    fn name(&self) -> &'static str {
        "epsilon_greedy"
    }

    fn choose(&self, candidates: &[CandidateArm], _total_pulls: u64) -> Option<Choice> {
        if candidates.is_empty() {
            return None;
        }

        {
            let mut rng = self.rng.lock();
            if rng.gen::<f64>() < self.epsilon {
                let index = rng.gen_range(0..candidates.len());
                return Some(Choice {
                    index,
                    value: candidates[index].composite,
                    forced: true,
                });
            }
        }

        let mut best: Option<Choice> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            let value = match &candidate.arm {
                Some(arm) if arm.pulls > 0 => arm.average_reward,
                _ => candidate.composite,
            };
            if best.map_or(true, |b| value > b.value) {
                best = Some(Choice {
                    index,
                    value,
                    forced: false,
                });
            }
        }
        best
    }
}

/// Build the strategy named by the configuration
#[must_use]
pub fn strategy_for(config: &SelectionConfig) -> Arc<dyn SelectionStrategy> {
    match config.strategy {
        StrategyKind::Ucb => Arc::new(UcbStrategy::new(config.exploration, config.prior_weight)),
        StrategyKind::EpsilonGreedy => Arc::new(EpsilonGreedyStrategy::new(config.epsilon)),
    }
}

/// Observed outcome of a routed call, compared against its estimates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardInput {
    /// Whether the provider call succeeded
    pub success: bool,
    /// Actual cost in cents
    pub actual_cost_cents: i64,
    /// Estimated cost in cents
    pub estimated_cost_cents: i64,
    /// Actual latency
    pub actual_latency: Duration,
    /// Estimated latency
    pub estimated_latency: Duration,
}

/// Reward for an outcome, in [-1, 2]
///
/// Failure scores -1. Success scores 1 plus an accuracy term for cost and
/// for latency, plus a bonus for each that came in under its estimate.
#[must_use]
pub fn calculate_reward(input: &RewardInput) -> f64 {
    if !input.success {
        return -1.0;
    }

    let mut reward = 1.0;
    let actual_cost = input.actual_cost_cents as f64;
    let estimated_cost = input.estimated_cost_cents as f64;
    let actual_latency = input.actual_latency.as_secs_f64();
    let estimated_latency = input.estimated_latency.as_secs_f64();

    if input.estimated_cost_cents > 0 {
        let accuracy = 1.0 - (actual_cost - estimated_cost).abs() / estimated_cost;
        reward += (accuracy - 0.5) * 0.6;
    }
    if !input.estimated_latency.is_zero() {
        let accuracy = 1.0 - (actual_latency - estimated_latency).abs() / estimated_latency;
        reward += (accuracy - 0.5) * 0.6;
    }

    if input.actual_cost_cents < input.estimated_cost_cents {
        reward += (estimated_cost - actual_cost) / estimated_cost * 0.2;
    }
    if input.actual_latency < input.estimated_latency {
        reward += (estimated_latency - actual_latency) / estimated_latency * 0.2;
    }

    reward.clamp(-1.0, 2.0)
}
