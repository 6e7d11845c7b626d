//! Integration tests for the LLM cost router
//!
//! Scenario groups:
//! - Budget periods, thresholds and alerts
//! - Quota reservations under concurrency
//! - Response caching
//! - Bandit learning and arm persistence
//! - End-to-end routing through the service
//! - The SQL ledger on in-memory SQLite

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items
pub use fixtures::*;
pub use helpers::*;

#[cfg(test)]
mod bandit_tests;
#[cfg(test)]
mod budget_tests;
#[cfg(test)]
mod cache_tests;
#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod ledger_tests;
#[cfg(test)]
mod quota_tests;
