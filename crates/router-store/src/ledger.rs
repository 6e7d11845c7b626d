//! Ledger store abstraction.
//!
//! The ledger is the durable side of the router: provider configuration,
//! budgets and (optionally) bandit arms. Spend is only ever changed through
//! [`LedgerStore::add_spend`], which must apply the delta atomically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use router_core::{BanditArm, Budget, ConfigMap, OrgId, ProviderConfig};
use uuid::Uuid;

use crate::error::StoreResult;

/// Durable store for providers, budgets and bandit arms
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Providers of an organization in creation order
    async fn list_providers(&self, org_id: OrgId, enabled_only: bool)
        -> StoreResult<Vec<ProviderConfig>>;

    /// Insert a provider or replace the one with the same org/provider/model
    async fn upsert_provider(&self, provider: &ProviderConfig) -> StoreResult<()>;

    /// Replace the configuration map of one provider
    async fn update_provider_config(
        &self,
        org_id: OrgId,
        provider_name: &str,
        model_name: &str,
        config: &ConfigMap,
    ) -> StoreResult<()>;

    /// Insert a new budget row
    async fn insert_budget(&self, budget: &Budget) -> StoreResult<()>;

    /// Insert the default budget for a period unless one already exists,
    /// returning whichever row holds the period
    async fn ensure_period_budget(&self, budget: &Budget) -> StoreResult<Budget>;

    /// Budget by id
    async fn get_budget(&self, id: Uuid) -> StoreResult<Option<Budget>>;

    /// Newest budget whose period covers `at`
    async fn current_budget(
        &self,
        org_id: OrgId,
        project_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Budget>>;

    /// All budgets of an organization, newest first
    async fn list_budgets(&self, org_id: OrgId) -> StoreResult<Vec<Budget>>;

    /// Atomically add to a budget's spend and return the updated row
    async fn add_spend(&self, id: Uuid, amount_cents: i64) -> StoreResult<Budget>;

    /// Change a budget's limit
    async fn update_budget_limit(&self, id: Uuid, limit_cents: i64) -> StoreResult<()>;

    /// Delete a budget, returning whether it existed
    async fn delete_budget(&self, id: Uuid) -> StoreResult<bool>;

    /// Arms persisted under a scope
    async fn load_arms(&self, scope: &str) -> StoreResult<Vec<BanditArm>>;

    /// Insert or replace one arm under a scope
    async fn save_arm(&self, scope: &str, arm: &BanditArm) -> StoreResult<()>;

    /// Remove one arm under a scope
    async fn delete_arm(&self, scope: &str, provider_name: &str, model_name: &str)
        -> StoreResult<()>;

    /// Check if the backend is healthy
    async fn health_check(&self) -> StoreResult<()>;

    /// Get backend name for metrics
    fn name(&self) -> &'static str;
}

/// Deduplication key for lazily created budgets
#[must_use]
pub fn period_key(budget: &Budget) -> String {
    format!(
        "{}:{}:{}:{}",
        budget.org_id,
        budget
            .project_id
            .map_or_else(|| "-".to_string(), |p| p.to_string()),
        budget.period_type,
        budget.period_start.timestamp()
    )
}
