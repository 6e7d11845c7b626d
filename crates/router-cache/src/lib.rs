//! # Router Cache
//!
//! Response cache keyed by organization, prompt fingerprint and input
//! fingerprint, stored in a [`router_store::CounterStore`] with a
//! per-entry lifetime and privacy classification.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod manager;
pub mod policy;
pub mod warmer;

pub use manager::{generate_hash, CacheManager, CacheStats, CachedEntry};
pub use policy::{derive_policy, ContentTag};
pub use warmer::{CacheWarmer, WarmupPrompt, WarmupReport};
