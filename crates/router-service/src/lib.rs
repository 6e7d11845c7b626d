//! # Router Service
//!
//! The routing entry point. A [`RoutingService`] checks the organization's
//! budget, filters providers by tier and quota headroom, lets the selection
//! engine pick one, reserves its quota and returns the decision. Reported
//! outcomes flow back into spend, quota and bandit state.
//!
//! Build one with [`RoutingServiceBuilder`], either from explicit stores or
//! from a [`router_core::RouterConfig`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod outcome;
pub mod service;

pub use builder::RoutingServiceBuilder;
pub use outcome::{UsageOutcome, UsageReport};
pub use service::RoutingService;
