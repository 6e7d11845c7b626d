//! Ledger table definitions.
//!
//! Tables are created with `CREATE ... IF NOT EXISTS` so startup is
//! idempotent. The column types are the subset PostgreSQL and SQLite share
//! through the `sqlx` Any driver: identifiers and timestamps are TEXT
//! (UUID strings and RFC 3339), integers are BIGINT and flags are 0/1.

/// One ledger table with its indexes
#[derive(Debug, Clone, Copy)]
pub struct TableDefinition {
    /// Table name
    pub name: &'static str,
    /// Statements creating the table and its indexes
    pub create: &'static [&'static str],
    /// Statement dropping the table
    pub drop: &'static str,
}

/// Provider configuration per organization
pub const PROVIDER_CONFIG: TableDefinition = TableDefinition {
    name: "provider_config",
    create: &[
        r"CREATE TABLE IF NOT EXISTS provider_config (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            provider_name TEXT NOT NULL,
            model_name TEXT NOT NULL,
            config TEXT NOT NULL DEFAULT '{}',
            cost_per_token_prompt DOUBLE PRECISION NOT NULL DEFAULT 0,
            cost_per_token_completion DOUBLE PRECISION NOT NULL DEFAULT 0,
            qps_limit BIGINT NOT NULL DEFAULT 100,
            enabled BIGINT NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            UNIQUE (org_id, provider_name, model_name)
        )",
        "CREATE INDEX IF NOT EXISTS idx_provider_config_org ON provider_config (org_id, enabled)",
    ],
    drop: "DROP TABLE IF EXISTS provider_config",
};

/// Budgets per organization, project and period
pub const BUDGET: TableDefinition = TableDefinition {
    name: "budget",
    create: &[
        r"CREATE TABLE IF NOT EXISTS budget (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            project_id TEXT,
            period_type TEXT NOT NULL,
            limit_cents BIGINT NOT NULL,
            spent_cents BIGINT NOT NULL DEFAULT 0,
            period_start TEXT NOT NULL,
            period_end TEXT NOT NULL,
            created_at TEXT NOT NULL,
            period_key TEXT UNIQUE
        )",
        "CREATE INDEX IF NOT EXISTS idx_budget_org_period ON budget (org_id, period_start, period_end)",
    ],
    drop: "DROP TABLE IF EXISTS budget",
};

/// Persistent bandit arms
pub const BANDIT_ARM: TableDefinition = TableDefinition {
    name: "bandit_arm",
    create: &[r"CREATE TABLE IF NOT EXISTS bandit_arm (
            scope TEXT NOT NULL,
            provider_name TEXT NOT NULL,
            model_name TEXT NOT NULL,
            pulls BIGINT NOT NULL DEFAULT 0,
            total_reward DOUBLE PRECISION NOT NULL DEFAULT 0,
            last_selected TEXT,
            PRIMARY KEY (scope, provider_name, model_name)
        )"],
    drop: "DROP TABLE IF EXISTS bandit_arm",
};

/// All ledger tables in creation order
#[must_use]
pub fn all_tables() -> [TableDefinition; 3] {
    [PROVIDER_CONFIG, BUDGET, BANDIT_ARM]
}
