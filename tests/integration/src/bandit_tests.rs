//! Bandit integration tests
//!
//! Exploration order, learning from rewards, decay and arm persistence.

use crate::fixtures::*;
use pretty_assertions::assert_eq;
use router_core::{BanditArm, ProviderKey, QualityTier, RouterError, SelectionConfig};
use router_selection::{
    calculate_reward, ArmStore, EpsilonGreedyStrategy, LedgerArmStore, MemoryArmStore,
    RewardInput, SelectionEngine,
};
use router_store::MemoryLedgerStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const SCOPE: &str = "bandit-tests";

fn engine() -> SelectionEngine {
    SelectionEngine::new(SelectionConfig::default(), Arc::new(MemoryArmStore::new()))
}

/// Select, commit and reward one round, returning the chosen key
async fn play(engine: &SelectionEngine, rewards: &HashMap<ProviderKey, f64>) -> ProviderKey {
    let org = org();
    let providers = vec![gpt4(org), cohere_command(org)];
    let request = small_request(org, QualityTier::Bronze);
    let ranked = engine.rank(providers, &request, 10_000);

    let selection = engine.select(SCOPE, ranked).await.expect("select");
    let key = selection.chosen().key();
    engine.commit(SCOPE, &key).await.expect("commit");
    engine
        .update_reward(SCOPE, &key, rewards[&key])
        .await
        .expect("reward");
    key
}

/// Every arm is tried once before any is exploited
#[tokio::test]
async fn test_untried_arms_first() {
    let engine = engine();
    let rewards: HashMap<ProviderKey, f64> = [
        (ProviderKey::new("openai", "gpt-4"), 1.0),
        (ProviderKey::new("cohere", "command"), 1.0),
    ]
    .into_iter()
    .collect();

    let first = play(&engine, &rewards).await;
    let second = play(&engine, &rewards).await;
    assert!(first != second);

    let arms = engine.arm_stats(SCOPE).await.expect("stats");
    assert_eq!(arms.len(), 2);
    assert!(arms.iter().all(|arm| arm.pulls == 1));
}

/// The better-rewarded arm ends up with most of the pulls
#[tokio::test]
async fn test_learns_better_arm() {
    let engine = engine();
    let good = ProviderKey::new("cohere", "command");
    let poor = ProviderKey::new("openai", "gpt-4");
    let rewards: HashMap<ProviderKey, f64> =
        [(good.clone(), 1.5), (poor.clone(), 0.2)].into_iter().collect();

    let mut picks: HashMap<ProviderKey, u32> = HashMap::new();
    for _ in 0..200 {
        *picks.entry(play(&engine, &rewards).await).or_default() += 1;
    }

    assert!(picks[&good] > 150, "good arm picked {} times", picks[&good]);
    assert!(picks.get(&poor).copied().unwrap_or(0) >= 1);

    let arms = engine.arm_stats(SCOPE).await.expect("stats");
    let total: u64 = arms.iter().map(|arm| arm.pulls).sum();
    assert_eq!(total, 200);
    for arm in &arms {
        assert!((arm.average_reward - arm.total_reward / arm.pulls as f64).abs() < 1e-9);
    }
}

/// With no exploration, epsilon-greedy always exploits the best average
#[tokio::test]
async fn test_epsilon_greedy_exploits() {
    let engine = SelectionEngine::new(SelectionConfig::default(), Arc::new(MemoryArmStore::new()))
        .with_strategy(Arc::new(EpsilonGreedyStrategy::with_seed(0.0, 42)));
    let mut seeded = BanditArm::new(&ProviderKey::new("openai", "gpt-4"));
    seeded.pulls = 10;
    seeded.total_reward = 15.0;
    engine.seed_arm(SCOPE, seeded).await.expect("seed");
    let mut weak = BanditArm::new(&ProviderKey::new("cohere", "command"));
    weak.pulls = 10;
    weak.total_reward = 2.0;
    engine.seed_arm(SCOPE, weak).await.expect("seed");

    let org = org();
    let request = small_request(org, QualityTier::Bronze);
    for _ in 0..20 {
        let ranked = engine.rank(vec![cohere_command(org), gpt4(org)], &request, 10_000);
        let selection = engine.select(SCOPE, ranked).await.expect("select");
        assert_eq!(selection.chosen().key(), ProviderKey::new("openai", "gpt-4"));
        assert!(!selection.forced);
    }
}

/// Decay scales rewards but keeps pull counts
#[tokio::test]
async fn test_decay() {
    let engine = engine();
    let mut arm = BanditArm::new(&ProviderKey::new("openai", "gpt-4"));
    arm.pulls = 4;
    arm.total_reward = 6.0;
    engine.seed_arm(SCOPE, arm).await.expect("seed");

    let decayed = engine.decay(SCOPE, Some(0.5)).await.expect("decay");
    assert_eq!(decayed.len(), 1);
    assert_eq!(decayed[0].pulls, 4);
    assert!((decayed[0].total_reward - 3.0).abs() < 1e-9);
    assert!((decayed[0].average_reward - 0.75).abs() < 1e-9);

    let defaulted = engine.decay(SCOPE, None).await.expect("decay");
    assert!((defaulted[0].total_reward - 2.85).abs() < 1e-9);

    for factor in [0.0, 1.0, 1.5, -0.2] {
        assert!(matches!(
            engine.decay(SCOPE, Some(factor)).await,
            Err(RouterError::Validation { .. })
        ));
    }
}

/// Reset zeroes an arm so it is explored again
#[tokio::test]
async fn test_reset_arm() {
    let engine = engine();
    let key = ProviderKey::new("cohere", "command");
    let mut arm = BanditArm::new(&key);
    arm.pulls = 30;
    arm.total_reward = 12.0;
    engine.seed_arm(SCOPE, arm).await.expect("seed");

    let reset = engine.reset_arm(SCOPE, &key).await.expect("reset");
    assert_eq!(reset.pulls, 0);
    assert_eq!(reset.total_reward, 0.0);
    assert_eq!(reset.last_selected, None);
}

/// Arms written through the ledger survive a new engine
#[tokio::test]
async fn test_ledger_arms_survive_restart() {
    let ledger = Arc::new(MemoryLedgerStore::new());
    let key = ProviderKey::new("anthropic", "claude-3-sonnet");
    {
        let engine = SelectionEngine::new(
            SelectionConfig::default(),
            Arc::new(LedgerArmStore::new(ledger.clone())),
        );
        engine.commit(SCOPE, &key).await.expect("commit");
        engine.update_reward(SCOPE, &key, 1.25).await.expect("reward");
    }

    let restored = LedgerArmStore::new(ledger);
    let arm = restored.get(SCOPE, &key).await.expect("get").expect("persisted");
    assert_eq!(arm.pulls, 1);
    assert!((arm.total_reward - 1.25).abs() < 1e-9);
    assert!(arm.last_selected.is_some());
}

/// Exact estimates score highest; coming in under beats going over by the same amount
#[test]
fn test_reward_shape() {
    let exact = RewardInput {
        success: true,
        actual_cost_cents: 10,
        estimated_cost_cents: 10,
        actual_latency: Duration::from_millis(800),
        estimated_latency: Duration::from_millis(800),
    };
    let failed = RewardInput {
        success: false,
        ..exact
    };
    let under = RewardInput {
        actual_cost_cents: 9,
        ..exact
    };
    let over = RewardInput {
        actual_cost_cents: 11,
        ..exact
    };

    assert_eq!(calculate_reward(&failed), -1.0);
    assert!((calculate_reward(&exact) - 1.6).abs() < 1e-9);
    assert!(calculate_reward(&under) > calculate_reward(&over));
    assert!(calculate_reward(&under) < calculate_reward(&exact));
}
