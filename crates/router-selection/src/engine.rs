//! Selection engine: scoring, strategy choice and arm bookkeeping.

use router_core::{
    BanditArm, EstimatorTables, ProviderConfig, ProviderKey, QualityTier, RouterError,
    RouterResult, RoutingRequest, RoutingResponse, SelectionConfig, SharedClock, SystemClock,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::arm_store::ArmStore;
use crate::bandit::{strategy_for, CandidateArm, SelectionStrategy};
use crate::estimator::TableEstimator;
use crate::scoring::{ProviderScorer, ScoredProvider};

/// Ranked candidates and the one the strategy picked
#[derive(Debug, Clone)]
pub struct Selection {
    /// Candidates, highest composite score first
    pub ranked: Vec<ScoredProvider>,
    /// Index of the picked candidate in `ranked`
    pub chosen: usize,
    /// Whether the pick was exploration
    pub forced: bool,
}

impl Selection {
    /// The picked candidate
    #[must_use]
    pub fn chosen(&self) -> &ScoredProvider {
        &self.ranked[self.chosen]
    }

    /// Order in which to attempt reservations: the pick, then the rest by rank
    #[must_use]
    pub fn fallback_order(&self) -> Vec<usize> {
        std::iter::once(self.chosen)
            .chain((0..self.ranked.len()).filter(|&i| i != self.chosen))
            .collect()
    }
}

/// Scores providers, picks one and learns from outcomes
pub struct SelectionEngine {
    scorer: ProviderScorer,
    estimator: Option<Arc<TableEstimator>>,
    strategy: Arc<dyn SelectionStrategy>,
    arms: Arc<dyn ArmStore>,
    config: SelectionConfig,
    clock: SharedClock,
}

impl SelectionEngine {
    /// Create an engine with the configured strategy and estimator tables
    #[must_use]
    pub fn new(config: SelectionConfig, arms: Arc<dyn ArmStore>) -> Self {
        let estimator = Arc::new(TableEstimator::new(config.estimators.clone()));
        Self {
            scorer: ProviderScorer::from_tables(&estimator, &config),
            estimator: Some(estimator),
            strategy: strategy_for(&config),
            arms,
            config,
            clock: SystemClock::shared(),
        }
    }

    /// Replace the strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn SelectionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the scorer
    ///
    /// The injected scorer owns its estimators, so
    /// [`SelectionEngine::update_tables`] is refused afterwards.
    #[must_use]
    pub fn with_scorer(mut self, scorer: ProviderScorer) -> Self {
        self.scorer = scorer;
        self.estimator = None;
        self
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Selection settings
    #[must_use]
    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Active strategy name
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Arm store in use
    #[must_use]
    pub fn arm_store(&self) -> &Arc<dyn ArmStore> {
        &self.arms
    }

    /// Swap the estimator tables at runtime
    ///
    /// # Errors
    /// Returns a config error when a custom scorer replaced the table estimator
    pub fn update_tables(&self, tables: EstimatorTables) -> RouterResult<()> {
        let estimator = self.estimator.as_ref().ok_or_else(|| {
            RouterError::Config("estimator tables are not used by the injected scorer".to_string())
        })?;
        estimator.update_tables(tables);
        info!("Estimator tables updated");
        Ok(())
    }

    /// Providers eligible for a tier
    #[must_use]
    pub fn eligible(&self, providers: Vec<ProviderConfig>, tier: QualityTier) -> Vec<ProviderConfig> {
        self.scorer.eligible(providers, tier)
    }

    /// Score and rank providers
    #[must_use]
    pub fn rank(
        &self,
        providers: Vec<ProviderConfig>,
        request: &RoutingRequest,
        available_cents: i64,
    ) -> Vec<ScoredProvider> {
        self.scorer.rank(providers, request, available_cents)
    }

    /// Pick one ranked candidate
    ///
    /// A forced pick initializes the arm. The pull itself is only recorded
    /// by [`SelectionEngine::commit`] once the provider is reserved.
    ///
    /// # Errors
    /// Returns error if `ranked` is empty or the arm store fails
    #[instrument(skip(self, ranked), fields(candidates = ranked.len(), strategy = self.strategy.name()))]
    pub async fn select(&self, scope: &str, ranked: Vec<ScoredProvider>) -> RouterResult<Selection> {
        if ranked.is_empty() {
            return Err(RouterError::internal("no candidates to select from"));
        }

        let arms = self.arms.snapshot(scope).await?;
        let total_pulls: u64 = arms.iter().map(|arm| arm.pulls).sum();
        let mut by_key: HashMap<ProviderKey, BanditArm> =
            arms.into_iter().map(|arm| (arm.key(), arm)).collect();

        let candidates: Vec<CandidateArm> = ranked
            .iter()
            .map(|scored| {
                let key = scored.key();
                CandidateArm {
                    arm: by_key.remove(&key),
                    key,
                    composite: scored.score(),
                }
            })
            .collect();

        let choice = self
            .strategy
            .choose(&candidates, total_pulls)
            .ok_or_else(|| RouterError::internal("strategy returned no choice"))?;

        let key = &candidates[choice.index].key;
        if candidates[choice.index].arm.is_none() {
            self.arms.update(scope, key, &|_: &mut BanditArm| {}).await?;
        }

        debug!(
            provider = %key,
            value = choice.value,
            forced = choice.forced,
            total_pulls,
            "Candidate selected"
        );

        Ok(Selection {
            ranked,
            chosen: choice.index,
            forced: choice.forced,
        })
    }

    /// Record a pull for the provider that was actually reserved
    ///
    /// # Errors
    /// Returns error if the arm store fails
    pub async fn commit(&self, scope: &str, key: &ProviderKey) -> RouterResult<BanditArm> {
        let now = self.clock.now();
        self.arms
            .update(scope, key, &move |arm: &mut BanditArm| {
                arm.pulls += 1;
                arm.last_selected = Some(now);
                arm.refresh_average();
            })
            .await
    }

    /// Build the routing decision for the candidate at `reserved`
    ///
    /// Alternatives are the best-ranked other candidates.
    #[must_use]
    pub fn into_response(&self, selection: &Selection, reserved: usize) -> RoutingResponse {
        let chosen = &selection.ranked[reserved];
        let alternatives = selection
            .ranked
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != reserved)
            .take(self.config.max_alternatives)
            .map(|(_, scored)| scored.to_alternative())
            .collect();

        RoutingResponse {
            provider_name: chosen.provider.provider_name.clone(),
            model_name: chosen.provider.model_name.clone(),
            config: chosen.provider.config.clone(),
            estimated_cost_cents: chosen.estimated_cost_cents,
            estimated_latency: chosen.estimated_latency,
            confidence: chosen.score().clamp(0.0, 1.0),
            reason: chosen.reason.clone(),
            alternatives,
        }
    }

    /// Add a reward to an arm
    ///
    /// An arm seen for the first time counts as one pull so its average
    /// stays equal to total reward over pulls.
    ///
    /// # Errors
    /// Returns error if the arm store fails
    #[instrument(skip(self), fields(provider = %key))]
    pub async fn update_reward(
        &self,
        scope: &str,
        key: &ProviderKey,
        reward: f64,
    ) -> RouterResult<BanditArm> {
        let arm = self
            .arms
            .update(scope, key, &move |arm: &mut BanditArm| {
                if arm.pulls == 0 {
                    arm.pulls = 1;
                }
                arm.total_reward += reward;
                arm.refresh_average();
            })
            .await?;
        debug!(
            pulls = arm.pulls,
            average_reward = arm.average_reward,
            "Reward recorded"
        );
        Ok(arm)
    }

    /// Multiply every arm's total reward by a factor in (0, 1)
    ///
    /// Uses the configured factor when none is given.
    ///
    /// # Errors
    /// Returns error if the factor is out of range or the arm store fails
    pub async fn decay(&self, scope: &str, factor: Option<f64>) -> RouterResult<Vec<BanditArm>> {
        let factor = factor.unwrap_or(self.config.decay_factor);
        if !(factor > 0.0 && factor < 1.0) {
            return Err(RouterError::validation(
                format!("decay factor must be in (0, 1), got {factor}"),
                Some("decay_factor".to_string()),
                "invalid_decay_factor",
            ));
        }

        let arms = self
            .arms
            .update_all(scope, &move |arm: &mut BanditArm| {
                arm.total_reward *= factor;
                arm.refresh_average();
            })
            .await?;
        info!(scope, factor, arms = arms.len(), "Rewards decayed");
        Ok(arms)
    }

    /// Every arm in a scope
    ///
    /// # Errors
    /// Returns error if the arm store fails
    pub async fn arm_stats(&self, scope: &str) -> RouterResult<Vec<BanditArm>> {
        self.arms.snapshot(scope).await
    }

    /// Zero an arm's history
    ///
    /// # Errors
    /// Returns error if the arm store fails
    pub async fn reset_arm(&self, scope: &str, key: &ProviderKey) -> RouterResult<BanditArm> {
        let arm = self
            .arms
            .update(scope, key, &|arm: &mut BanditArm| {
                arm.pulls = 0;
                arm.total_reward = 0.0;
                arm.average_reward = 0.0;
                arm.last_selected = None;
            })
            .await?;
        info!(scope, provider = %key, "Arm reset");
        Ok(arm)
    }

    /// Overwrite an arm, for restoring exported statistics
    ///
    /// # Errors
    /// Returns error if the arm store fails
    pub async fn seed_arm(&self, scope: &str, arm: BanditArm) -> RouterResult<BanditArm> {
        let key = arm.key();
        self.arms
            .update(scope, &key, &move |current: &mut BanditArm| {
                *current = arm.clone();
                current.refresh_average();
            })
            .await
    }
}

impl std::fmt::Debug for SelectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionEngine")
            .field("strategy", &self.strategy.name())
            .field("arms", &self.arms.name())
            .field("scorer", &self.scorer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm_store::MemoryArmStore;
    use crate::bandit::EpsilonGreedyStrategy;
    use chrono::{TimeZone, Utc};
    use router_core::ManualClock;
    use uuid::Uuid;

    const SCOPE: &str = "org";

    fn engine() -> SelectionEngine {
        let config = SelectionConfig::default()
            .with_estimators(EstimatorTables::default().without_jitter());
        SelectionEngine::new(config, Arc::new(MemoryArmStore::new()))
    }

    fn ranked(engine: &SelectionEngine) -> Vec<ScoredProvider> {
        let org = Uuid::new_v4();
        let request = RoutingRequest::builder(org)
            .prompt_tokens(100)
            .max_tokens(100)
            .build()
            .expect("valid request");
        let providers = vec![
            ProviderConfig::new(org, "openai", "gpt-4"),
            ProviderConfig::new(org, "anthropic", "claude-3-sonnet"),
            ProviderConfig::new(org, "google", "gemini-pro"),
            ProviderConfig::new(org, "cohere", "command"),
            ProviderConfig::new(org, "local", "llama"),
        ];
        engine.rank(providers, &request, 1000)
    }

    #[test]
    fn test_fallback_order() {
        let engine = engine();
        let selection = Selection {
            ranked: ranked(&engine),
            chosen: 2,
            forced: false,
        };
        assert_eq!(selection.fallback_order(), vec![2, 0, 1, 3, 4]);
    }

    #[tokio::test]
    async fn test_forced_exploration_visits_every_arm() {
        let engine = engine();
        let ranked = ranked(&engine);
        let mut seen = Vec::new();
        for _ in 0..ranked.len() {
            let selection = engine.select(SCOPE, ranked.clone()).await.expect("select");
            assert!(selection.forced);
            let key = selection.chosen().key();
            engine.commit(SCOPE, &key).await.expect("commit");
            seen.push(key);
        }
        let expected: Vec<_> = ranked.iter().map(ScoredProvider::key).collect();
        assert_eq!(seen, expected);

        let selection = engine.select(SCOPE, ranked).await.expect("select");
        assert!(!selection.forced);
    }

    #[tokio::test]
    async fn test_select_initializes_arm_without_pull() {
        let engine = engine();
        let selection = engine.select(SCOPE, ranked(&engine)).await.expect("select");
        let arms = engine.arm_stats(SCOPE).await.expect("stats");
        assert_eq!(arms.len(), 1);
        assert_eq!(arms[0].key(), selection.chosen().key());
        assert_eq!(arms[0].pulls, 0);
    }

    #[tokio::test]
    async fn test_select_empty_is_error() {
        let engine = engine();
        assert!(engine.select(SCOPE, Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_commit_sets_last_selected() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).single().expect("valid date");
        let engine = engine().with_clock(Arc::new(ManualClock::new(at)));
        let key = ProviderKey::new("openai", "gpt-4");
        let arm = engine.commit(SCOPE, &key).await.expect("commit");
        assert_eq!(arm.pulls, 1);
        assert_eq!(arm.last_selected, Some(at));
    }

    #[tokio::test]
    async fn test_update_reward_keeps_average_consistent() {
        let engine = engine();
        let key = ProviderKey::new("openai", "gpt-4");

        let arm = engine.update_reward(SCOPE, &key, 1.5).await.expect("reward");
        assert_eq!(arm.pulls, 1);
        assert!((arm.average_reward - 1.5).abs() < 1e-9);

        engine.commit(SCOPE, &key).await.expect("commit");
        let arm = engine.update_reward(SCOPE, &key, 0.5).await.expect("reward");
        assert_eq!(arm.pulls, 2);
        assert!((arm.total_reward - 2.0).abs() < 1e-9);
        assert!((arm.average_reward - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_decay_and_reset() {
        let engine = engine();
        let key = ProviderKey::new("openai", "gpt-4");
        engine.commit(SCOPE, &key).await.expect("commit");
        engine.commit(SCOPE, &key).await.expect("commit");
        engine.update_reward(SCOPE, &key, 2.0).await.expect("reward");

        let arms = engine.decay(SCOPE, Some(0.5)).await.expect("decay");
        assert_eq!(arms.len(), 1);
        assert!((arms[0].total_reward - 1.0).abs() < 1e-9);
        assert!((arms[0].average_reward - 0.5).abs() < 1e-9);

        assert!(engine.decay(SCOPE, Some(1.0)).await.is_err());
        assert!(engine.decay(SCOPE, Some(0.0)).await.is_err());

        let arm = engine.reset_arm(SCOPE, &key).await.expect("reset");
        assert_eq!(arm.pulls, 0);
        assert!(arm.total_reward.abs() < f64::EPSILON);
        assert!(arm.last_selected.is_none());
    }

    #[tokio::test]
    async fn test_response_excludes_reserved_provider() {
        let engine = engine();
        let selection = Selection {
            ranked: ranked(&engine),
            chosen: 0,
            forced: false,
        };
        let response = engine.into_response(&selection, 1);
        assert_eq!(response.key(), selection.ranked[1].key());
        assert_eq!(response.alternatives.len(), 3);
        assert!(response
            .alternatives
            .iter()
            .all(|alt| alt.provider_name != response.provider_name));
        assert_eq!(response.alternatives[0].provider_name, selection.ranked[0].provider.provider_name);
        assert!(response.confidence > 0.0 && response.confidence <= 1.0);
    }

    #[tokio::test]
    async fn test_ucb_prefers_high_reward_arm() {
        let engine = engine();
        let ranked = ranked(&engine);
        for (i, scored) in ranked.iter().enumerate() {
            let mut arm = BanditArm::new(&scored.key());
            arm.pulls = 50;
            arm.total_reward = if i == 3 { 100.0 } else { 10.0 };
            engine.seed_arm(SCOPE, arm).await.expect("seed");
        }
        let selection = engine.select(SCOPE, ranked).await.expect("select");
        assert_eq!(selection.chosen, 3);
    }

    #[tokio::test]
    async fn test_custom_strategy() {
        let engine = engine().with_strategy(Arc::new(EpsilonGreedyStrategy::with_seed(0.0, 1)));
        assert_eq!(engine.strategy_name(), "epsilon_greedy");
        let ranked = ranked(&engine);
        let selection = engine.select(SCOPE, ranked).await.expect("select");
        assert_eq!(selection.chosen, 0);
        assert!(!selection.forced);
    }

    #[test]
    fn test_update_tables_changes_eligibility() {
        let engine = engine();
        let org = Uuid::new_v4();
        let providers = || vec![ProviderConfig::new(org, "openai", "gpt-4")];
        assert_eq!(engine.eligible(providers(), QualityTier::Gold).len(), 1);

        let mut tables = EstimatorTables::default().without_jitter();
        tables.quality.providers.insert("openai".to_string(), 0.1);
        engine.update_tables(tables).expect("update");
        assert!(engine.eligible(providers(), QualityTier::Gold).is_empty());
    }

    #[test]
    fn test_update_tables_refused_with_custom_scorer() {
        let config = SelectionConfig::default();
        let estimator = Arc::new(TableEstimator::new(config.estimators.clone()));
        let engine = SelectionEngine::new(config.clone(), Arc::new(MemoryArmStore::new()))
            .with_scorer(ProviderScorer::from_tables(&estimator, &config));

        let err = engine
            .update_tables(EstimatorTables::default())
            .expect_err("refused");
        assert_eq!(err.code(), "config_error");
    }
}
