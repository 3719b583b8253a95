//! Configuration management.
//!
//! Sources, later ones winning: built-in defaults, an optional config file,
//! then `REQLENS__SECTION__KEY` environment variables.

use std::path::Path;

use serde::Deserialize;

use crate::error::ReqlensError;
use crate::events::{DEFAULT_COMMAND_CAPACITY, DEFAULT_NOTIFICATION_CAPACITY};
use crate::telemetry::{LogFormat, LoggingConfig, MetricsConfig, TelemetryConfig};

const ENV_PREFIX: &str = "REQLENS";
const ENV_SEPARATOR: &str = "__";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// TCP ingestion listener
    #[serde(default)]
    pub ingest: IngestConfig,

    /// HTTP/WebSocket server
    #[serde(default)]
    pub server: ServerConfig,

    /// Aggregation store
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging and metrics
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_ingest_host")]
    pub host: String,

    #[serde(default = "default_ingest_port")]
    pub port: u16,

    /// Socket read chunk size
    #[serde(default = "default_read_buffer_bytes")]
    pub read_buffer_bytes: usize,

    /// Largest incomplete payload kept while waiting for more bytes
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            host: default_ingest_host(),
            port: default_ingest_port(),
            read_buffer_bytes: default_read_buffer_bytes(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl IngestConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Change notification channel depth; slow listeners past this lag
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,

    /// Store service command queue depth
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            notification_capacity: default_notification_capacity(),
            command_capacity: default_command_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

// Default value functions
fn default_ingest_host() -> String { "0.0.0.0".to_string() }
fn default_ingest_port() -> u16 { 3333 }
fn default_read_buffer_bytes() -> usize { 8 * 1024 }
fn default_max_payload_bytes() -> usize { 16 * 1024 * 1024 }
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8080 }
fn default_notification_capacity() -> usize { DEFAULT_NOTIFICATION_CAPACITY }
fn default_command_capacity() -> usize { DEFAULT_COMMAND_CAPACITY }
fn default_log_level() -> String { "info".to_string() }
fn default_metrics_enabled() -> bool { true }

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::build(None, Self::environment())
    }

    /// Load from a specific file path, with the environment on top.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::build(Some(path.as_ref()), Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
    }

    fn build(file: Option<&Path>, environment: config::Environment) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder.add_source(environment).build()?;
        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.ingest.read_buffer_bytes == 0 {
            return Err(ReqlensError::configuration(
                "ingest.read_buffer_bytes must be greater than zero",
            ));
        }
        if self.ingest.max_payload_bytes < self.ingest.read_buffer_bytes {
            return Err(ReqlensError::configuration(
                "ingest.max_payload_bytes must be at least ingest.read_buffer_bytes",
            ));
        }
        if self.store.command_capacity == 0 || self.store.notification_capacity == 0 {
            return Err(ReqlensError::configuration("store capacities must be greater than zero"));
        }
        Ok(())
    }

    /// Telemetry settings derived from the observability section.
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            logging: LoggingConfig {
                level: self.observability.log_level.clone(),
                format: self.observability.log_format,
                ..LoggingConfig::default()
            },
            metrics: MetricsConfig {
                enabled: self.observability.metrics_enabled,
                ..MetricsConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::environment().source(Some(source))
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::build(None, env(&[])).unwrap();
        assert_eq!(cfg.ingest.addr(), "0.0.0.0:3333");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.store.notification_capacity, DEFAULT_NOTIFICATION_CAPACITY);
        assert_eq!(cfg.observability.log_level, "info");
        assert!(cfg.observability.metrics_enabled);
    }

    #[test]
    fn test_environment_overrides() {
        let cfg = Config::build(
            None,
            env(&[
                ("REQLENS__INGEST__PORT", "4444"),
                ("REQLENS__OBSERVABILITY__LOG_FORMAT", "json"),
                ("REQLENS__OBSERVABILITY__METRICS_ENABLED", "false"),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.ingest.port, 4444);
        assert_eq!(cfg.observability.log_format, LogFormat::Json);
        assert!(!cfg.observability.metrics_enabled);
    }

    #[test]
    fn test_file_then_environment() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 9000\n\n[store]\ncommand_capacity = 64\n\n[ingest]\nport = 5000"
        )
        .unwrap();

        let cfg = Config::build(Some(file.path()), env(&[("REQLENS__INGEST__PORT", "5001")])).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.store.command_capacity, 64);
        assert_eq!(cfg.ingest.port, 5001);
    }

    #[test]
    fn test_invalid_capacity_rejected() {
        let result = Config::build(None, env(&[("REQLENS__STORE__COMMAND_CAPACITY", "0")]));
        let err = result.unwrap_err();
        let err = err.downcast_ref::<ReqlensError>().unwrap();
        assert_eq!(err.code(), crate::error::ErrorCode::ConfigurationError);
        assert_eq!(err.internal_message(), Some("store capacities must be greater than zero"));
    }

    #[test]
    fn test_payload_limit_below_read_buffer_rejected() {
        let mut cfg = Config::default();
        cfg.ingest.read_buffer_bytes = 4096;
        cfg.ingest.max_payload_bytes = 1024;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ConfigurationError);
    }

    #[test]
    fn test_telemetry_projection() {
        let mut cfg = Config::default();
        cfg.observability.log_level = "debug".into();
        let telemetry = cfg.telemetry();
        assert_eq!(telemetry.logging.level, "debug");
        assert!(telemetry.metrics.enabled);
    }
}
