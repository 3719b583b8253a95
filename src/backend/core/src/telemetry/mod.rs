//! Telemetry: structured logging and Prometheus metrics.
//!
//! # Example
//!
//! ```rust,no_run
//! use reqlens_core::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::default();
//! let handle = init_telemetry(&config).expect("Failed to initialize telemetry");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{init_metrics, IngestConnectionsGauge, MetricsConfig, MetricsRegistry, RpcTimer};

/// Logging plus metrics configuration.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Initialize metrics first, then logging.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<MetricsRegistry> {
    let registry = init_metrics(&config.metrics)?;
    init_logging(&config.logging)?;
    Ok(registry)
}
