//! SQL ledger store over the `sqlx` Any driver (PostgreSQL or SQLite).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use router_core::{BanditArm, Budget, ConfigMap, OrgId, PeriodType, ProviderConfig};
use sqlx::any::AnyRow;
use sqlx::Row;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::ledger::{period_key, LedgerStore};
use crate::pool::LedgerPool;

const PROVIDER_COLUMNS: &str = "id, org_id, provider_name, model_name, config, \
     cost_per_token_prompt, cost_per_token_completion, qps_limit, enabled, created_at";

const BUDGET_COLUMNS: &str = "id, org_id, project_id, period_type, limit_cents, spent_cents, \
     period_start, period_end, created_at";

/// Ledger store backed by a SQL database
#[derive(Debug)]
pub struct SqlLedgerStore {
    pool: LedgerPool,
    timeout: Duration,
}

impl SqlLedgerStore {
    /// Create a store over a connected pool
    #[must_use]
    pub fn new(pool: LedgerPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Get the pool
    #[must_use]
    pub fn pool(&self) -> &LedgerPool {
        &self.pool
    }

    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| {
                warn!(operation, error = %e, "Ledger statement failed");
                StoreError::from(e)
            }),
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Ledger statement timed out"
                );
                Err(StoreError::Timeout {
                    operation,
                    after: self.timeout,
                })
            }
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    // fixed width keeps lexical and chronological order identical
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{value}': {e}")))
}

fn parse_uuid(value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Serialization(format!("bad uuid '{value}': {e}")))
}

fn provider_from_row(row: &AnyRow) -> StoreResult<ProviderConfig> {
    let config: String = row.try_get("config")?;
    let config: ConfigMap = serde_json::from_str(&config)?;
    let enabled: i64 = row.try_get("enabled")?;

    Ok(ProviderConfig {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        org_id: parse_uuid(&row.try_get::<String, _>("org_id")?)?,
        provider_name: row.try_get("provider_name")?,
        model_name: row.try_get("model_name")?,
        config,
        cost_per_token_prompt: row.try_get("cost_per_token_prompt")?,
        cost_per_token_completion: row.try_get("cost_per_token_completion")?,
        qps_limit: row.try_get("qps_limit")?,
        enabled: enabled != 0,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn budget_from_row(row: &AnyRow) -> StoreResult<Budget> {
    let project_id: Option<String> = row.try_get("project_id")?;
    let period_type: String = row.try_get("period_type")?;

    Ok(Budget {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        org_id: parse_uuid(&row.try_get::<String, _>("org_id")?)?,
        project_id: project_id.as_deref().map(parse_uuid).transpose()?,
        period_type: period_type
            .parse::<PeriodType>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        limit_cents: row.try_get("limit_cents")?,
        spent_cents: row.try_get("spent_cents")?,
        period_start: parse_timestamp(&row.try_get::<String, _>("period_start")?)?,
        period_end: parse_timestamp(&row.try_get::<String, _>("period_end")?)?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn arm_from_row(row: &AnyRow) -> StoreResult<BanditArm> {
    let pulls: i64 = row.try_get("pulls")?;
    let last_selected: Option<String> = row.try_get("last_selected")?;
    let mut arm = BanditArm {
        provider_name: row.try_get("provider_name")?,
        model_name: row.try_get("model_name")?,
        pulls: u64::try_from(pulls).unwrap_or(0),
        total_reward: row.try_get("total_reward")?,
        average_reward: 0.0,
        last_selected: last_selected.as_deref().map(parse_timestamp).transpose()?,
    };
    arm.refresh_average();
    Ok(arm)
}

#[async_trait]
impl LedgerStore for SqlLedgerStore {
    async fn list_providers(
        &self,
        org_id: OrgId,
        enabled_only: bool,
    ) -> StoreResult<Vec<ProviderConfig>> {
        let sql = if enabled_only {
            format!(
                "SELECT {PROVIDER_COLUMNS} FROM provider_config \
                 WHERE org_id = $1 AND enabled = 1 \
                 ORDER BY created_at, provider_name, model_name"
            )
        } else {
            format!(
                "SELECT {PROVIDER_COLUMNS} FROM provider_config \
                 WHERE org_id = $1 \
                 ORDER BY created_at, provider_name, model_name"
            )
        };

        let rows = self
            .timed(
                "list_providers",
                sqlx::query(&sql)
                    .bind(org_id.to_string())
                    .fetch_all(self.pool.inner()),
            )
            .await?;
        rows.iter().map(provider_from_row).collect()
    }

    async fn upsert_provider(&self, provider: &ProviderConfig) -> StoreResult<()> {
        let config = serde_json::to_string(&provider.config)?;
        self.timed(
            "upsert_provider",
            sqlx::query(
                "INSERT INTO provider_config (id, org_id, provider_name, model_name, config, \
                 cost_per_token_prompt, cost_per_token_completion, qps_limit, enabled, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT (org_id, provider_name, model_name) DO UPDATE SET \
                 config = excluded.config, \
                 cost_per_token_prompt = excluded.cost_per_token_prompt, \
                 cost_per_token_completion = excluded.cost_per_token_completion, \
                 qps_limit = excluded.qps_limit, \
                 enabled = excluded.enabled",
            )
            .bind(provider.id.to_string())
            .bind(provider.org_id.to_string())
            .bind(provider.provider_name.clone())
            .bind(provider.model_name.clone())
            .bind(config)
            .bind(provider.cost_per_token_prompt)
            .bind(provider.cost_per_token_completion)
            .bind(provider.qps_limit)
            .bind(i64::from(provider.enabled))
            .bind(timestamp(provider.created_at))
            .execute(self.pool.inner()),
        )
        .await?;

        debug!(
            org_id = %provider.org_id,
            provider = %provider.provider_name,
            model = %provider.model_name,
            "Upserted provider config"
        );
        Ok(())
    }

    async fn update_provider_config(
        &self,
        org_id: OrgId,
        provider_name: &str,
        model_name: &str,
        config: &ConfigMap,
    ) -> StoreResult<()> {
        let config = serde_json::to_string(config)?;
        let result = self
            .timed(
                "update_provider_config",
                sqlx::query(
                    "UPDATE provider_config SET config = $1 \
                     WHERE org_id = $2 AND provider_name = $3 AND model_name = $4",
                )
                .bind(config)
                .bind(org_id.to_string())
                .bind(provider_name.to_string())
                .bind(model_name.to_string())
                .execute(self.pool.inner()),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(
                "provider",
                format!("{provider_name}/{model_name}"),
            ));
        }
        Ok(())
    }

    async fn insert_budget(&self, budget: &Budget) -> StoreResult<()> {
        self.timed(
            "insert_budget",
            sqlx::query(
                "INSERT INTO budget (id, org_id, project_id, period_type, limit_cents, \
                 spent_cents, period_start, period_end, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(budget.id.to_string())
            .bind(budget.org_id.to_string())
            .bind(budget.project_id.map(|p| p.to_string()))
            .bind(budget.period_type.as_str())
            .bind(budget.limit_cents)
            .bind(budget.spent_cents)
            .bind(timestamp(budget.period_start))
            .bind(timestamp(budget.period_end))
            .bind(timestamp(budget.created_at))
            .execute(self.pool.inner()),
        )
        .await?;
        Ok(())
    }

    async fn ensure_period_budget(&self, budget: &Budget) -> StoreResult<Budget> {
        let key = period_key(budget);
        self.timed(
            "ensure_period_budget",
            sqlx::query(
                "INSERT INTO budget (id, org_id, project_id, period_type, limit_cents, \
                 spent_cents, period_start, period_end, created_at, period_key) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT (period_key) DO NOTHING",
            )
            .bind(budget.id.to_string())
            .bind(budget.org_id.to_string())
            .bind(budget.project_id.map(|p| p.to_string()))
            .bind(budget.period_type.as_str())
            .bind(budget.limit_cents)
            .bind(budget.spent_cents)
            .bind(timestamp(budget.period_start))
            .bind(timestamp(budget.period_end))
            .bind(timestamp(budget.created_at))
            .bind(key.clone())
            .execute(self.pool.inner()),
        )
        .await?;

        let sql = format!("SELECT {BUDGET_COLUMNS} FROM budget WHERE period_key = $1");
        let row = self
            .timed(
                "ensure_period_budget",
                sqlx::query(&sql).bind(key).fetch_one(self.pool.inner()),
            )
            .await?;
        budget_from_row(&row)
    }

    async fn get_budget(&self, id: Uuid) -> StoreResult<Option<Budget>> {
        let sql = format!("SELECT {BUDGET_COLUMNS} FROM budget WHERE id = $1");
        let row = self
            .timed(
                "get_budget",
                sqlx::query(&sql)
                    .bind(id.to_string())
                    .fetch_optional(self.pool.inner()),
            )
            .await?;
        row.as_ref().map(budget_from_row).transpose()
    }

    async fn current_budget(
        &self,
        org_id: OrgId,
        project_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Budget>> {
        let at = timestamp(at);
        let row = match project_id {
            None => {
                let sql = format!(
                    "SELECT {BUDGET_COLUMNS} FROM budget \
                     WHERE org_id = $1 AND project_id IS NULL \
                     AND period_start <= $2 AND period_end > $3 \
                     ORDER BY created_at DESC LIMIT 1"
                );
                self.timed(
                    "current_budget",
                    sqlx::query(&sql)
                        .bind(org_id.to_string())
                        .bind(at.clone())
                        .bind(at)
                        .fetch_optional(self.pool.inner()),
                )
                .await?
            }
            Some(project_id) => {
                let sql = format!(
                    "SELECT {BUDGET_COLUMNS} FROM budget \
                     WHERE org_id = $1 AND project_id = $2 \
                     AND period_start <= $3 AND period_end > $4 \
                     ORDER BY created_at DESC LIMIT 1"
                );
                self.timed(
                    "current_budget",
                    sqlx::query(&sql)
                        .bind(org_id.to_string())
                        .bind(project_id.to_string())
                        .bind(at.clone())
                        .bind(at)
                        .fetch_optional(self.pool.inner()),
                )
                .await?
            }
        };
        row.as_ref().map(budget_from_row).transpose()
    }

    async fn list_budgets(&self, org_id: OrgId) -> StoreResult<Vec<Budget>> {
        let sql = format!(
            "SELECT {BUDGET_COLUMNS} FROM budget WHERE org_id = $1 ORDER BY created_at DESC"
        );
        let rows = self
            .timed(
                "list_budgets",
                sqlx::query(&sql)
                    .bind(org_id.to_string())
                    .fetch_all(self.pool.inner()),
            )
            .await?;
        rows.iter().map(budget_from_row).collect()
    }

    async fn add_spend(&self, id: Uuid, amount_cents: i64) -> StoreResult<Budget> {
        let sql = format!(
            "UPDATE budget SET spent_cents = spent_cents + $1 WHERE id = $2 \
             RETURNING {BUDGET_COLUMNS}"
        );
        let row = self
            .timed(
                "add_spend",
                sqlx::query(&sql)
                    .bind(amount_cents)
                    .bind(id.to_string())
                    .fetch_optional(self.pool.inner()),
            )
            .await?
            .ok_or_else(|| StoreError::not_found("budget", id))?;
        budget_from_row(&row)
    }

    async fn update_budget_limit(&self, id: Uuid, limit_cents: i64) -> StoreResult<()> {
        let result = self
            .timed(
                "update_budget_limit",
                sqlx::query("UPDATE budget SET limit_cents = $1 WHERE id = $2")
                    .bind(limit_cents)
                    .bind(id.to_string())
                    .execute(self.pool.inner()),
            )
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("budget", id));
        }
        Ok(())
    }

    async fn delete_budget(&self, id: Uuid) -> StoreResult<bool> {
        let result = self
            .timed(
                "delete_budget",
                sqlx::query("DELETE FROM budget WHERE id = $1")
                    .bind(id.to_string())
                    .execute(self.pool.inner()),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_arms(&self, scope: &str) -> StoreResult<Vec<BanditArm>> {
        let rows = self
            .timed(
                "load_arms",
                sqlx::query(
                    "SELECT provider_name, model_name, pulls, total_reward, last_selected \
                     FROM bandit_arm WHERE scope = $1 ORDER BY provider_name, model_name",
                )
                .bind(scope.to_string())
                .fetch_all(self.pool.inner()),
            )
            .await?;
        rows.iter().map(arm_from_row).collect()
    }

    async fn save_arm(&self, scope: &str, arm: &BanditArm) -> StoreResult<()> {
        self.timed(
            "save_arm",
            sqlx::query(
                "INSERT INTO bandit_arm (scope, provider_name, model_name, pulls, total_reward, \
                 last_selected) VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (scope, provider_name, model_name) DO UPDATE SET \
                 pulls = excluded.pulls, \
                 total_reward = excluded.total_reward, \
                 last_selected = excluded.last_selected",
            )
            .bind(scope.to_string())
            .bind(arm.provider_name.clone())
            .bind(arm.model_name.clone())
            .bind(i64::try_from(arm.pulls).unwrap_or(i64::MAX))
            .bind(arm.total_reward)
            .bind(arm.last_selected.map(timestamp))
            .execute(self.pool.inner()),
        )
        .await?;
        Ok(())
    }

    async fn delete_arm(
        &self,
        scope: &str,
        provider_name: &str,
        model_name: &str,
    ) -> StoreResult<()> {
        self.timed(
            "delete_arm",
            sqlx::query(
                "DELETE FROM bandit_arm WHERE scope = $1 AND provider_name = $2 AND model_name = $3",
            )
            .bind(scope.to_string())
            .bind(provider_name.to_string())
            .bind(model_name.to_string())
            .execute(self.pool.inner()),
        )
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.pool.test_connection(self.timeout).await
    }

    fn name(&self) -> &'static str {
        "sql"
    }
}
