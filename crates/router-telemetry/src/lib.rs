//! # Router Telemetry
//!
//! Observability for the LLM cost router:
//! - `tracing` subscriber setup with an optional OpenTelemetry layer
//! - Prometheus counters and histograms for routing decisions

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod metrics;
pub mod tracing_setup;

pub use metrics::RouterMetrics;
pub use opentelemetry_sdk::trace::TracerProvider;
pub use tracing_setup::{init_tracing, shutdown_tracing, TelemetryConfig, TelemetryError};
