//! Prometheus metrics for ingestion, merging and bridge calls.
//!
//! Metrics are recorded with the `metrics` macros throughout the crate. When
//! enabled, a Prometheus recorder is installed and rendered on `GET /metrics`.
//! With no recorder installed every macro call is a no-op.

use std::collections::HashMap;
use std::time::Instant;

use metrics::{describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus recorder
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Histogram buckets for bridge call durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Labels added to every metric
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            duration_buckets: default_duration_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0]
}

/// Handle to the installed recorder, if any.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl MetricsRegistry {
    /// A registry with no recorder; `render` returns `None`.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Prometheus text exposition of every recorded metric.
    pub fn render(&self) -> Option<String> {
        self.prometheus_handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Install the global Prometheus recorder.
///
/// Only one recorder can be installed per process; a second call fails.
pub fn init_metrics(config: &MetricsConfig) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let mut builder = PrometheusBuilder::new();
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    builder = builder.set_buckets(&config.duration_buckets)?;

    let handle = builder.install_recorder()?;
    register_metric_descriptions();

    tracing::info!(labels = config.global_labels.len(), "Metrics initialized");

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

fn register_metric_descriptions() {
    // Store
    describe_counter!(
        "reqlens_events_merged_total",
        "Events merged into a record, by bucket"
    );
    describe_counter!(
        "reqlens_events_rejected_total",
        "Events discarded before merging, by reason"
    );
    describe_gauge!("reqlens_records", "Records currently held by the store");

    // Ingestion
    describe_counter!(
        "reqlens_decode_failures_total",
        "Transport payloads that could not be decoded"
    );
    describe_gauge!(
        "reqlens_ingest_connections",
        "Open ingestion connections"
    );

    // Bridge
    describe_counter!("reqlens_rpc_calls_total", "Bridge calls, by command");
    describe_counter!("reqlens_rpc_failures_total", "Bridge calls answered with an error");
    describe_histogram!(
        "reqlens_rpc_duration_seconds",
        "Bridge call handling time in seconds"
    );

    // Errors
    describe_counter!("reqlens_errors_total", "Errors constructed, by code and category");
}

/// Open ingestion connection tracking.
pub struct IngestConnectionsGauge;

impl IngestConnectionsGauge {
    pub fn increment() {
        gauge!("reqlens_ingest_connections").increment(1.0);
    }

    pub fn decrement() {
        gauge!("reqlens_ingest_connections").decrement(1.0);
    }
}

/// Records bridge call duration when finished.
pub struct RpcTimer {
    start: Instant,
    command: String,
}

impl RpcTimer {
    pub fn start(command: &str) -> Self {
        Self {
            start: Instant::now(),
            command: command.to_string(),
        }
    }

    pub fn finish(self) {
        histogram!("reqlens_rpc_duration_seconds", "command" => self.command)
            .record(self.start.elapsed().as_secs_f64());
    }
}
