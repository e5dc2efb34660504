//! Telemetry configuration.

use crate::logging::LogConfig;
use crate::metrics::MetricsConfig;
use crate::tracing::TracingConfig;
use serde::Deserialize;

/// Configuration for all telemetry subsystems.
///
/// Deserializes from the `[telemetry]` table of the gateway config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Metrics configuration.
    pub metrics: MetricsConfig,

    /// Tracing configuration.
    pub tracing: TracingConfig,

    /// Logging configuration.
    pub logging: LogConfig,
}

impl TelemetryConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    config: TelemetryConfig,
}

impl TelemetryConfigBuilder {
    /// Sets the service name reported on spans.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.tracing.service_name = name.into();
        self
    }

    /// Sets the log filter directive.
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Chooses JSON (`true`) or pretty (`false`) log output.
    #[must_use]
    pub fn json_logs(mut self, json: bool) -> Self {
        self.config.logging.json_format = json;
        self
    }

    /// Enables the Prometheus listener on `addr`.
    #[must_use]
    pub fn metrics_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.metrics.enabled = true;
        self.config.metrics.addr = addr.into();
        self
    }

    /// Enables OTLP trace export to `endpoint`.
    #[must_use]
    pub fn otlp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.tracing.enabled = true;
        self.config.tracing.otlp_endpoint = endpoint.into();
        self
    }

    /// Sets the trace sampling ratio.
    #[must_use]
    pub fn sample_ratio(mut self, ratio: f64) -> Self {
        self.config.tracing.sample_ratio = ratio;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        self.config
    }
}
