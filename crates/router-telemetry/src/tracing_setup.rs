//! Subscriber setup: env filter, fmt layer and optional OpenTelemetry.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::{
    trace::{Config, RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use router_core::TelemetrySettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Telemetry error
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed or the filter is invalid
    #[error("failed to initialize tracing: {0}")]
    Init(String),

    /// A metric could not be created or registered
    #[error("metrics error: {0}")]
    Metrics(String),
}

impl From<prometheus::Error> for TelemetryError {
    fn from(err: prometheus::Error) -> Self {
        Self::Metrics(err.to_string())
    }
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name reported in spans
    pub service_name: String,
    /// Service version reported in spans
    pub service_version: String,
    /// Deployment environment
    pub environment: String,
    /// Filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON log lines
    pub json_logs: bool,
    /// Attach the OpenTelemetry layer
    pub otel_enabled: bool,
    /// Trace sampling rate in [0, 1]
    pub sampling_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from(&TelemetrySettings::default())
    }
}

impl From<&TelemetrySettings> for TelemetryConfig {
    fn from(settings: &TelemetrySettings) -> Self {
        Self {
            service_name: settings.service_name.clone(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: settings.environment.clone(),
            log_level: settings.log_level.clone(),
            json_logs: settings.json_logs,
            otel_enabled: settings.otel_enabled,
            sampling_rate: settings.sampling_rate.clamp(0.0, 1.0),
        }
    }
}

impl TelemetryConfig {
    /// Create a configuration for a service
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the environment
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Set the fallback log filter
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Switch JSON log lines on or off
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Attach an OpenTelemetry layer sampling at `rate`
    #[must_use]
    pub fn with_otel(mut self, rate: f64) -> Self {
        self.otel_enabled = true;
        self.sampling_rate = rate.clamp(0.0, 1.0);
        self
    }

    fn sampler(&self) -> Sampler {
        if self.sampling_rate >= 1.0 {
            Sampler::AlwaysOn
        } else if self.sampling_rate <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(self.sampling_rate)
        }
    }

    fn filter(&self) -> Result<EnvFilter, TelemetryError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.log_level)
                .map_err(|e| TelemetryError::Init(format!("invalid log level: {e}"))),
        }
    }

    fn tracer_provider(&self) -> TracerProvider {
        let resource = Resource::new(vec![
            KeyValue::new("service.name", self.service_name.clone()),
            KeyValue::new("service.version", self.service_version.clone()),
            KeyValue::new("deployment.environment", self.environment.clone()),
        ]);
        let config = Config::default()
            .with_sampler(self.sampler())
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(resource);
        TracerProvider::builder().with_config(config).build()
    }
}

/// Install the global subscriber
///
/// Returns the tracer provider when the OpenTelemetry layer is attached;
/// pass it to [`shutdown_tracing`] on exit.
///
/// # Errors
/// Returns error if the filter is invalid or a subscriber is already set
pub fn init_tracing(config: &TelemetryConfig) -> Result<Option<TracerProvider>, TelemetryError> {
    let filter = config.filter()?;

    let fmt_layer = if config.json_logs {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).with_line_number(true).boxed()
    };

    let provider = config.otel_enabled.then(|| config.tracer_provider());
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(fmt_layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    info!(
        service = %config.service_name,
        environment = %config.environment,
        json_logs = config.json_logs,
        otel = config.otel_enabled,
        "Tracing initialized"
    );

    Ok(provider)
}

/// Flush and drop the tracer provider
pub fn shutdown_tracing(provider: Option<TracerProvider>) {
    if let Some(provider) = provider {
        for result in provider.force_flush() {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Span flush failed");
            }
        }
        drop(provider);
        info!("Tracing shutdown complete");
    }
}
