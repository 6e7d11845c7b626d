//! In-memory ledger for single-instance deployments and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use router_core::{BanditArm, Budget, ConfigMap, OrgId, ProviderConfig};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::ledger::{period_key, LedgerStore};

#[derive(Debug, Clone)]
struct BudgetRow {
    budget: Budget,
    period_key: Option<String>,
}

/// In-memory ledger store
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    providers: RwLock<Vec<ProviderConfig>>,
    budgets: RwLock<Vec<BudgetRow>>,
    arms: RwLock<HashMap<(String, String, String), BanditArm>>,
}

impl MemoryLedgerStore {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn list_providers(
        &self,
        org_id: OrgId,
        enabled_only: bool,
    ) -> StoreResult<Vec<ProviderConfig>> {
        Ok(self
            .providers
            .read()
            .iter()
            .filter(|p| p.org_id == org_id && (!enabled_only || p.enabled))
            .cloned()
            .collect())
    }

    async fn upsert_provider(&self, provider: &ProviderConfig) -> StoreResult<()> {
        let mut providers = self.providers.write();
        let existing = providers.iter_mut().find(|p| {
            p.org_id == provider.org_id
                && p.provider_name == provider.provider_name
                && p.model_name == provider.model_name
        });
        match existing {
            // the row keeps its identity and position
            Some(row) => {
                let id = row.id;
                let created_at = row.created_at;
                *row = provider.clone();
                row.id = id;
                row.created_at = created_at;
            }
            None => providers.push(provider.clone()),
        }
        Ok(())
    }

    async fn update_provider_config(
        &self,
        org_id: OrgId,
        provider_name: &str,
        model_name: &str,
        config: &ConfigMap,
    ) -> StoreResult<()> {
        let mut providers = self.providers.write();
        let row = providers
            .iter_mut()
            .find(|p| {
                p.org_id == org_id && p.provider_name == provider_name && p.model_name == model_name
            })
            .ok_or_else(|| {
                StoreError::not_found("provider", format!("{provider_name}/{model_name}"))
            })?;
        row.config = config.clone();
        Ok(())
    }

    async fn insert_budget(&self, budget: &Budget) -> StoreResult<()> {
        let mut budgets = self.budgets.write();
        if budgets.iter().any(|row| row.budget.id == budget.id) {
            return Err(StoreError::backend(format!("duplicate budget id {}", budget.id)));
        }
        budgets.push(BudgetRow {
            budget: budget.clone(),
            period_key: None,
        });
        Ok(())
    }

    async fn ensure_period_budget(&self, budget: &Budget) -> StoreResult<Budget> {
        let key = period_key(budget);
        let mut budgets = self.budgets.write();
        if let Some(row) = budgets
            .iter()
            .find(|row| row.period_key.as_deref() == Some(key.as_str()))
        {
            return Ok(row.budget.clone());
        }
        budgets.push(BudgetRow {
            budget: budget.clone(),
            period_key: Some(key),
        });
        Ok(budget.clone())
    }

    async fn get_budget(&self, id: Uuid) -> StoreResult<Option<Budget>> {
        Ok(self
            .budgets
            .read()
            .iter()
            .find(|row| row.budget.id == id)
            .map(|row| row.budget.clone()))
    }

    async fn current_budget(
        &self,
        org_id: OrgId,
        project_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Budget>> {
        Ok(self
            .budgets
            .read()
            .iter()
            .map(|row| &row.budget)
            .filter(|b| b.org_id == org_id && b.project_id == project_id && b.covers(at))
            .max_by_key(|b| b.created_at)
            .cloned())
    }

    async fn list_budgets(&self, org_id: OrgId) -> StoreResult<Vec<Budget>> {
        let mut budgets: Vec<Budget> = self
            .budgets
            .read()
            .iter()
            .filter(|row| row.budget.org_id == org_id)
            .map(|row| row.budget.clone())
            .collect();
        budgets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(budgets)
    }

    async fn add_spend(&self, id: Uuid, amount_cents: i64) -> StoreResult<Budget> {
        let mut budgets = self.budgets.write();
        let row = budgets
            .iter_mut()
            .find(|row| row.budget.id == id)
            .ok_or_else(|| StoreError::not_found("budget", id))?;
        row.budget.spent_cents += amount_cents;
        Ok(row.budget.clone())
    }

    async fn update_budget_limit(&self, id: Uuid, limit_cents: i64) -> StoreResult<()> {
        let mut budgets = self.budgets.write();
        let row = budgets
            .iter_mut()
            .find(|row| row.budget.id == id)
            .ok_or_else(|| StoreError::not_found("budget", id))?;
        row.budget.limit_cents = limit_cents;
        Ok(())
    }

    async fn delete_budget(&self, id: Uuid) -> StoreResult<bool> {
        let mut budgets = self.budgets.write();
        let before = budgets.len();
        budgets.retain(|row| row.budget.id != id);
        Ok(budgets.len() != before)
    }

    async fn load_arms(&self, scope: &str) -> StoreResult<Vec<BanditArm>> {
        let mut arms: Vec<BanditArm> = self
            .arms
            .read()
            .iter()
            .filter(|((s, _, _), _)| s == scope)
            .map(|(_, arm)| arm.clone())
            .collect();
        arms.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(arms)
    }

    async fn save_arm(&self, scope: &str, arm: &BanditArm) -> StoreResult<()> {
        self.arms.write().insert(
            (
                scope.to_string(),
                arm.provider_name.clone(),
                arm.model_name.clone(),
            ),
            arm.clone(),
        );
        Ok(())
    }

    async fn delete_arm(
        &self,
        scope: &str,
        provider_name: &str,
        model_name: &str,
    ) -> StoreResult<()> {
        self.arms.write().remove(&(
            scope.to_string(),
            provider_name.to_string(),
            model_name.to_string(),
        ));
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
