//! Budget manager.
//!
//! Each organization (optionally each project) has one budget row per
//! period. The row covering "now" is created lazily with the configured
//! default limit, so a period rollover simply starts a new row. Spend is
//! only ever added through the ledger's atomic increment.

use router_core::{
    Budget, BudgetConfig, BudgetState, BudgetStatus, OrgId, PeriodType, RouterError, RouterResult,
    SharedClock, SystemClock,
};
use router_store::LedgerStore;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::alert::{AlertNotifier, AlertType, BudgetAlert, TracingAlertNotifier};

const STORE: &str = "ledger";

/// Classify a budget against a requested amount
#[must_use]
pub fn classify(budget: &Budget, requested_cents: i64, config: &BudgetConfig) -> BudgetStatus {
    let remaining = budget.remaining_cents();
    let utilization = budget.utilization_pct();

    let mut status = if remaining <= 0 {
        BudgetState::Exceeded
    } else if utilization >= config.critical_pct {
        BudgetState::Critical
    } else if utilization >= config.warning_pct {
        BudgetState::Warning
    } else {
        BudgetState::Healthy
    };
    if requested_cents > 0 && remaining < requested_cents {
        status = BudgetState::Exceeded;
    }

    BudgetStatus {
        budget_id: budget.id,
        limit_cents: budget.limit_cents,
        spent_cents: budget.spent_cents,
        remaining_cents: remaining,
        utilization_pct: utilization,
        period_start: budget.period_start,
        period_end: budget.period_end,
        status,
    }
}

fn non_negative(value: i64, field: &str) -> RouterResult<()> {
    if value < 0 {
        return Err(RouterError::validation(
            format!("{field} must not be negative"),
            Some(field.to_string()),
            "negative_amount",
        ));
    }
    Ok(())
}

/// Tracks spend against per-period limits
pub struct BudgetManager {
    ledger: Arc<dyn LedgerStore>,
    notifier: Arc<dyn AlertNotifier>,
    config: BudgetConfig,
    clock: SharedClock,
}

impl BudgetManager {
    /// Create a budget manager that logs alerts
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>, config: BudgetConfig) -> Self {
        Self {
            ledger,
            notifier: Arc::new(TracingAlertNotifier),
            config,
            clock: SystemClock::shared(),
        }
    }

    /// Send alerts to a different sink
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn AlertNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Use a specific clock
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Budget configuration
    #[must_use]
    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Create a budget for the period containing now
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn create_budget(
        &self,
        org_id: OrgId,
        project_id: Option<Uuid>,
        period_type: PeriodType,
        limit_cents: i64,
    ) -> RouterResult<Budget> {
        non_negative(limit_cents, "limit_cents")?;

        let now = self.clock.now();
        let bounds = period_type.bounds(now);
        let budget = Budget {
            id: Uuid::new_v4(),
            org_id,
            project_id,
            period_type,
            limit_cents,
            spent_cents: 0,
            period_start: bounds.start,
            period_end: bounds.end,
            created_at: now,
        };
        self.ledger
            .insert_budget(&budget)
            .await
            .map_err(|e| e.into_router_error(STORE))?;

        info!(
            budget_id = %budget.id,
            period = %period_type,
            limit_cents,
            "Budget created"
        );
        Ok(budget)
    }

    /// Budget by id
    pub async fn get_budget(&self, id: Uuid) -> RouterResult<Budget> {
        self.ledger
            .get_budget(id)
            .await
            .map_err(|e| e.into_router_error(STORE))?
            .ok_or_else(|| RouterError::not_found("budget", id.to_string()))
    }

    /// Budget covering now, created with the defaults when none exists
    pub async fn current_budget(
        &self,
        org_id: OrgId,
        project_id: Option<Uuid>,
    ) -> RouterResult<Budget> {
        let now = self.clock.now();
        let existing = self
            .ledger
            .current_budget(org_id, project_id, now)
            .await
            .map_err(|e| e.into_router_error(STORE))?;
        if let Some(budget) = existing {
            return Ok(budget);
        }

        let period_type = self.config.default_period;
        let bounds = period_type.bounds(now);
        let default = Budget {
            id: Uuid::new_v4(),
            org_id,
            project_id,
            period_type,
            limit_cents: self.config.default_limit_cents,
            spent_cents: 0,
            period_start: bounds.start,
            period_end: bounds.end,
            created_at: now,
        };
        let budget = self
            .ledger
            .ensure_period_budget(&default)
            .await
            .map_err(|e| e.into_router_error(STORE))?;

        debug!(
            org_id = %org_id,
            budget_id = %budget.id,
            period_start = %budget.period_start,
            "Using default budget for period"
        );
        Ok(budget)
    }

    /// Check whether the organization can spend `requested_cents` more
    pub async fn check_budget(&self, org_id: OrgId, requested_cents: i64) -> RouterResult<BudgetStatus> {
        let budget = self.current_budget(org_id, None).await?;
        let status = classify(&budget, requested_cents, &self.config);
        debug!(
            org_id = %org_id,
            requested_cents,
            remaining_cents = status.remaining_cents,
            status = %status.status,
            "Budget checked"
        );
        Ok(status)
    }

    /// Status of the current budget
    pub async fn get_status(&self, org_id: OrgId) -> RouterResult<BudgetStatus> {
        self.check_budget(org_id, 0).await
    }

    /// Add spend to the current period, alerting when it passes the limit
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn record_spending(&self, org_id: OrgId, amount_cents: i64) -> RouterResult<Budget> {
        non_negative(amount_cents, "amount_cents")?;

        let budget = self.current_budget(org_id, None).await?;
        let updated = self
            .ledger
            .add_spend(budget.id, amount_cents)
            .await
            .map_err(|e| e.into_router_error(STORE))?;

        debug!(
            budget_id = %updated.id,
            amount_cents,
            spent_cents = updated.spent_cents,
            "Spend recorded"
        );

        if self.config.alert_on_exceeded && updated.spent_cents > updated.limit_cents {
            self.raise_exceeded(&updated);
        }
        Ok(updated)
    }

    fn raise_exceeded(&self, budget: &Budget) {
        let utilization = budget.utilization_pct();
        let alert = BudgetAlert {
            budget_id: budget.id,
            org_id: budget.org_id,
            alert_type: AlertType::BudgetExceeded,
            message: format!("Budget exceeded: {utilization:.1}% utilized"),
            utilization_pct: utilization,
            spent_cents: budget.spent_cents,
            limit_cents: budget.limit_cents,
            timestamp: self.clock.now(),
        };
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            notifier.notify(alert).await;
        });
    }

    /// Change a budget's limit
    pub async fn update_budget(&self, id: Uuid, limit_cents: i64) -> RouterResult<Budget> {
        non_negative(limit_cents, "limit_cents")?;
        self.ledger
            .update_budget_limit(id, limit_cents)
            .await
            .map_err(|e| e.into_router_error(STORE))?;
        info!(budget_id = %id, limit_cents, "Budget limit updated");
        self.get_budget(id).await
    }

    /// All budgets of an organization, newest first
    pub async fn list_budgets(&self, org_id: OrgId) -> RouterResult<Vec<Budget>> {
        self.ledger
            .list_budgets(org_id)
            .await
            .map_err(|e| e.into_router_error(STORE))
    }

    /// Delete a budget
    pub async fn delete_budget(&self, id: Uuid) -> RouterResult<()> {
        let existed = self
            .ledger
            .delete_budget(id)
            .await
            .map_err(|e| e.into_router_error(STORE))?;
        if !existed {
            return Err(RouterError::not_found("budget", id.to_string()));
        }
        info!(budget_id = %id, "Budget deleted");
        Ok(())
    }
}

impl std::fmt::Debug for BudgetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetManager")
            .field("ledger", &self.ledger.name())
            .field("notifier", &self.notifier.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
