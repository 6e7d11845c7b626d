//! # Router Selection
//!
//! Chooses a provider for a routing request.
//!
//! Selection happens in two stages:
//! 1. [`ProviderScorer`] scores every eligible provider on cost, quality,
//!    latency and reliability and ranks them
//! 2. A [`SelectionStrategy`] (UCB or epsilon-greedy) picks one ranked
//!    candidate, using per-arm reward history kept in an [`ArmStore`]
//!
//! [`SelectionEngine`] ties the two together and learns from reported
//! outcomes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod arm_store;
pub mod bandit;
pub mod engine;
pub mod estimator;
pub mod scoring;

pub use arm_store::{ArmStore, ArmUpdate, LedgerArmStore, MemoryArmStore};
pub use bandit::{
    calculate_reward, strategy_for, CandidateArm, Choice, EpsilonGreedyStrategy, RewardInput,
    SelectionStrategy, UcbStrategy,
};
pub use engine::{Selection, SelectionEngine};
pub use estimator::{LatencyEstimator, QualityEstimator, ReliabilityEstimator, TableEstimator};
pub use scoring::{cost_score, latency_score, ProviderScorer, ScoreBreakdown, ScoredProvider};
