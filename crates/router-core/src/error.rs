//! Error types for the router.
//!
//! Every fallible operation in the workspace surfaces a [`RouterError`].
//! Store crates keep their own error enums and convert into this one at
//! the crate boundary.

use crate::types::QualityTier;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for router operations
pub type RouterResult<T> = Result<T, RouterError>;

/// Main error type for the router
#[derive(Debug, Error)]
pub enum RouterError {
    /// The organization's budget cannot cover the request
    #[error("budget exceeded: {spent_cents} of {limit_cents} cents spent, {requested_cents} requested")]
    BudgetExceeded {
        /// Budget that rejected the request
        budget_id: Uuid,
        /// Cents spent in the current period
        spent_cents: i64,
        /// Period limit in cents
        limit_cents: i64,
        /// Cents requested by the caller
        requested_cents: i64,
    },

    /// Every eligible provider is at its rate or concurrency limit
    #[error("no capacity: all {candidates} eligible providers are at quota")]
    NoCapacity {
        /// Number of eligible providers that were checked
        candidates: usize,
    },

    /// No enabled provider meets the requested quality tier
    #[error("no eligible provider for quality tier {tier}")]
    NoEligibleProvider {
        /// Requested tier
        tier: QualityTier,
    },

    /// A backing store could not be reached or timed out
    #[error("{store} store unavailable: {message}")]
    StoreUnavailable {
        /// Store name (counter, ledger, arm)
        store: String,
        /// Underlying failure
        message: String,
    },

    /// A quota reservation was refused after the provider looked available
    #[error("quota reservation refused for {provider}/{model}: {reason}")]
    ReservationRaceLost {
        /// Provider name
        provider: String,
        /// Model name
        model: String,
        /// Which limit refused the reservation
        reason: String,
    },

    /// Invalid input
    #[error("validation error: {message}")]
    Validation {
        /// Error message
        message: String,
        /// Field that failed validation
        field: Option<String>,
        /// Machine-readable code
        code: String,
    },

    /// A referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Entity identifier
        id: String,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl RouterError {
    /// Create a budget exceeded error
    #[must_use]
    pub fn budget_exceeded(
        budget_id: Uuid,
        spent_cents: i64,
        limit_cents: i64,
        requested_cents: i64,
    ) -> Self {
        Self::BudgetExceeded {
            budget_id,
            spent_cents,
            limit_cents,
            requested_cents,
        }
    }

    /// Create a store unavailable error
    pub fn store_unavailable(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Create a reservation race error
    pub fn reservation_lost(
        provider: impl Into<String>,
        model: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ReservationRaceLost {
            provider: provider.into(),
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Create a validation error
    pub fn validation(
        message: impl Into<String>,
        field: Option<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            field,
            code: code.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if the caller may retry the same request later
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NoCapacity { .. } | Self::StoreUnavailable { .. } | Self::ReservationRaceLost { .. }
        )
    }

    /// Stable machine-readable code for this error
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::NoCapacity { .. } => "no_capacity",
            Self::NoEligibleProvider { .. } => "no_eligible_provider",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::ReservationRaceLost { .. } => "reservation_race_lost",
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Config(_) => "config_error",
            Self::Serialization(_) => "serialization_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<serde_json::Error> for RouterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
