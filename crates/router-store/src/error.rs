//! Store error types.

use router_core::RouterError;
use std::time::Duration;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Could not reach the backend
    #[error("store connection error: {0}")]
    Connection(String),

    /// Call did not finish in time
    #[error("store operation '{operation}' timed out after {after:?}")]
    Timeout {
        /// Operation name
        operation: &'static str,
        /// Configured timeout
        after: Duration,
    },

    /// Backend rejected or failed the command
    #[error("store backend error: {0}")]
    Backend(String),

    /// Stored data could not be encoded or decoded
    #[error("store serialization error: {0}")]
    Serialization(String),

    /// Row or key does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Identifier
        id: String,
    },

    /// Invalid store configuration
    #[error("store configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Check if the error is transient
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout { .. } | Self::Backend(_)
        )
    }

    /// Convert into a router error, naming the store that failed
    #[must_use]
    pub fn into_router_error(self, store: &str) -> RouterError {
        match self {
            Self::Connection(_) | Self::Timeout { .. } | Self::Backend(_) => {
                RouterError::store_unavailable(store, self.to_string())
            }
            Self::Serialization(msg) => RouterError::Serialization(msg),
            Self::NotFound { entity, id } => RouterError::not_found(entity, id),
            Self::Config(msg) => RouterError::Config(msg),
        }
    }
}

impl From<StoreError> for RouterError {
    fn from(err: StoreError) -> Self {
        err.into_router_error("backing")
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(e) => Self::Config(e.to_string()),
            sqlx::Error::RowNotFound => Self::NotFound {
                entity: "row",
                id: "query".to_string(),
            },
            sqlx::Error::PoolTimedOut => Self::Connection("connection pool timed out".to_string()),
            sqlx::Error::PoolClosed => Self::Connection("connection pool is closed".to_string()),
            sqlx::Error::Io(e) => Self::Connection(e.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Serialization(err.to_string())
            }
            _ => Self::Backend(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        if err.is_timeout() {
            Self::Backend(format!("redis timeout: {err}"))
        } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            Self::Connection(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}
