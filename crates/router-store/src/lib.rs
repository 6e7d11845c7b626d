//! # Router Store
//!
//! Storage collaborators for the LLM cost router.
//!
//! Two kinds of store sit behind traits:
//! - [`CounterStore`]: low-latency counters with expiry and an atomic
//!   reservation primitive, used for quota windows and the response cache
//! - [`LedgerStore`]: durable provider configuration, budgets and bandit arms
//!
//! Each has an in-memory implementation. Redis (behind the `redis` feature)
//! and SQL (PostgreSQL or SQLite through `sqlx`) back the shared deployments.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod counter;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod memory_ledger;
pub mod pool;
#[cfg(feature = "redis")]
pub mod redis;
pub mod schema;
pub mod sql;

pub use counter::{
    glob_match, CounterStore, CounterStoreStats, Release, SlotKeys, SlotRequest, SlotReservation,
};
pub use error::{StoreError, StoreResult};
pub use ledger::LedgerStore;
pub use memory::MemoryCounterStore;
pub use memory_ledger::MemoryLedgerStore;
pub use pool::{DatabaseType, LedgerPool, PoolStats};
#[cfg(feature = "redis")]
pub use self::redis::RedisCounterStore;
pub use sql::SqlLedgerStore;
