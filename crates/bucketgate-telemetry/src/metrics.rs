//! Prometheus metrics.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `bucketgate_requests_total` | Counter | `method`, `status` | HTTP requests served |
//! | `bucketgate_request_duration_seconds` | Histogram | `method` | Request latency |
//! | `bucketgate_authz_decisions_total` | Counter | `decision` | Policy decisions by outcome |
//! | `bucketgate_authz_duration_seconds` | Histogram | - | Policy endpoint round trip |
//! | `bucketgate_bucket_operations_total` | Counter | `operation`, `outcome` | Bucket operations |
//!
//! The recording functions are safe to call before [`init_metrics`]; the
//! `metrics` facade drops observations when no recorder is installed.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Address to expose metrics on (e.g., "0.0.0.0:9090").
    pub addr: String,

    /// Histogram buckets for durations.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
            // 1ms .. 10s
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Installs the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(&config.duration_buckets)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .install()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    register_metric_descriptions();

    Ok(())
}

fn register_metric_descriptions() {
    describe_counter!(
        "bucketgate_requests_total",
        "Total number of HTTP requests processed"
    );
    describe_histogram!(
        "bucketgate_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "bucketgate_authz_decisions_total",
        "Policy decisions by outcome (allowed, denied, unevaluable)"
    );
    describe_histogram!(
        "bucketgate_authz_duration_seconds",
        "Round trip to the policy endpoint in seconds"
    );
    describe_counter!(
        "bucketgate_bucket_operations_total",
        "Bucket operations by operation and outcome"
    );
}

/// Records a completed HTTP request.
pub fn record_request(method: &str, status_code: u16, duration: Duration) {
    counter!(
        "bucketgate_requests_total",
        "method" => method.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(
        "bucketgate_request_duration_seconds",
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records a policy decision.
///
/// `decision` is one of `allowed`, `denied`, `unevaluable`.
pub fn record_authz_decision(decision: &'static str, duration: Duration) {
    counter!("bucketgate_authz_decisions_total", "decision" => decision).increment(1);
    histogram!("bucketgate_authz_duration_seconds").record(duration.as_secs_f64());
}

/// Records a bucket operation outcome.
pub fn record_bucket_operation(operation: &'static str, outcome: &'static str) {
    counter!(
        "bucketgate_bucket_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}
