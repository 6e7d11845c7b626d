//! Database connection pool for the SQL ledger.

use router_core::LedgerConfig;
use serde::Serialize;
use sqlx::{any::AnyPoolOptions, AnyPool};
use std::time::Duration;
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::schema;

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    /// PostgreSQL database
    PostgreSQL,
    /// SQLite database
    SQLite,
}

impl DatabaseType {
    /// Parse from a database URL
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if url.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PostgreSQL => write!(f, "postgresql"),
            Self::SQLite => write!(f, "sqlite"),
        }
    }
}

/// Connection pool for the ledger database
pub struct LedgerPool {
    pool: AnyPool,
    database_type: DatabaseType,
    max_connections: u32,
}

impl LedgerPool {
    /// Connect using the ledger configuration
    ///
    /// # Errors
    /// Returns error if the URL is missing or unsupported, or the database is unreachable
    pub async fn connect(config: &LedgerConfig) -> StoreResult<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::Config("database_url is required".to_string()))?;
        let database_type = DatabaseType::from_url(url)
            .ok_or_else(|| StoreError::Config(format!("unsupported database url: {url}")))?;

        sqlx::any::install_default_drivers();

        let pool_config = &config.pool;
        let mut options = AnyPoolOptions::new()
            .max_connections(pool_config.max_connections)
            .min_connections(pool_config.min_connections)
            .acquire_timeout(pool_config.connect_timeout)
            .idle_timeout(Some(pool_config.idle_timeout))
            .max_lifetime(Some(pool_config.max_lifetime))
            .test_before_acquire(pool_config.test_on_acquire);

        // every connection to an in-memory SQLite URL opens a fresh database
        let in_memory = database_type == DatabaseType::SQLite && url.contains(":memory:");
        let max_connections = if in_memory { 1 } else { pool_config.max_connections };
        if in_memory {
            options = options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = options
            .connect(url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!(
            database = %database_type,
            max_connections,
            "Ledger pool connected"
        );

        let pool = Self {
            pool,
            database_type,
            max_connections,
        };
        if config.ensure_schema {
            pool.ensure_schema().await?;
        }
        Ok(pool)
    }

    /// Create missing ledger tables
    ///
    /// # Errors
    /// Returns error if a statement fails
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for table in schema::all_tables() {
            for statement in table.create {
                sqlx::query(statement).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    /// Drop all ledger tables
    ///
    /// # Errors
    /// Returns error if a statement fails
    pub async fn drop_schema(&self) -> StoreResult<()> {
        for table in schema::all_tables().iter().rev() {
            sqlx::query(table.drop).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Get a reference to the underlying pool
    #[must_use]
    pub fn inner(&self) -> &AnyPool {
        &self.pool
    }

    /// Get the database type
    #[must_use]
    pub fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    /// Close the pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Check if the pool is closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Get pool statistics
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max_connections: self.max_connections,
        }
    }

    /// Run a trivial query within the timeout
    ///
    /// # Errors
    /// Returns error if the query fails or times out
    pub async fn test_connection(&self, timeout: Duration) -> StoreResult<()> {
        tokio::time::timeout(timeout, sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "test_connection",
                after: timeout,
            })??;
        Ok(())
    }
}

impl std::fmt::Debug for LedgerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerPool")
            .field("database_type", &self.database_type)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Pool statistics
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Current number of connections
    pub size: u32,
    /// Number of idle connections
    pub idle: usize,
    /// Maximum connections allowed
    pub max_connections: u32,
}

impl PoolStats {
    /// Number of connections in use
    #[must_use]
    pub fn active(&self) -> usize {
        (self.size as usize).saturating_sub(self.idle)
    }

    /// Percentage of the pool in use
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max_connections == 0 {
            return 0.0;
        }
        (self.active() as f64 / f64::from(self.max_connections)) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_from_url() {
        assert_eq!(
            DatabaseType::from_url("postgres://localhost/router"),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(DatabaseType::from_url("sqlite::memory:"), Some(DatabaseType::SQLite));
        assert_eq!(DatabaseType::from_url("mysql://x"), None);
    }

    #[test]
    fn test_pool_stats() {
        let stats = PoolStats {
            size: 5,
            idle: 3,
            max_connections: 10,
        };
        assert_eq!(stats.active(), 2);
        assert!((stats.utilization() - 20.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_connect_in_memory_sqlite() {
        let config = LedgerConfig::default().with_database_url("sqlite::memory:");
        let pool = LedgerPool::connect(&config).await.expect("connect");
        assert_eq!(pool.database_type(), DatabaseType::SQLite);
        assert_eq!(pool.stats().max_connections, 1);
        pool.test_connection(Duration::from_secs(1)).await.expect("select 1");
        pool.drop_schema().await.expect("drop");
        pool.ensure_schema().await.expect("recreate");
        pool.close().await;
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_connect_requires_url() {
        let err = LedgerPool::connect(&LedgerConfig::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }
}
