//! Error handling for Reqlens Core.
//!
//! This module provides:
//! - A crate-wide error type with a stable machine-readable code
//! - HTTP status code mapping for the axum surface
//! - User-facing vs internal messages
//! - Error counting through the `metrics` crate

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::events::EventError;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Reqlens operations.
pub type Result<T> = std::result::Result<T, ReqlensError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and are what display clients should branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Event Errors (1000-1099)
    MissingRequestId,
    InvalidEvent,
    StoreUnavailable,

    // Bridge Errors (1100-1199)
    InvalidPayload,

    // Ingestion Errors (1200-1299)
    IngestIo,

    // Serialization Errors (2200-2299)
    InvalidJson,

    // Configuration Errors (5000-5099)
    ConfigurationError,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::MissingRequestId => 1001,
            Self::InvalidEvent => 1002,
            Self::StoreUnavailable => 1003,

            Self::InvalidPayload => 1102,

            Self::IngestIo => 1201,

            Self::InvalidJson => 2201,

            Self::ConfigurationError => 5000,

            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::MissingRequestId
            | Self::InvalidEvent
            | Self::InvalidPayload
            | Self::InvalidJson => StatusCode::UNPROCESSABLE_ENTITY,

            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            Self::IngestIo | Self::ConfigurationError | Self::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "event",
            1100..=1199 => "bridge",
            1200..=1299 => "ingest",
            2200..=2299 => "serialization",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller mistakes (bad events or payloads)
    Low,
    /// Operational issues (socket failures)
    Medium,
    /// System errors
    High,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::MissingRequestId
            | ErrorCode::InvalidEvent
            | ErrorCode::InvalidPayload
            | ErrorCode::InvalidJson => Self::Low,

            ErrorCode::IngestIo => Self::Medium,

            ErrorCode::StoreUnavailable
            | ErrorCode::ConfigurationError
            | ErrorCode::InternalError => Self::High,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Reqlens Core.
#[derive(Error, Debug)]
pub struct ReqlensError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for ReqlensError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl ReqlensError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// The store service task has stopped accepting commands.
    pub fn store_unavailable() -> Self {
        Self::new(ErrorCode::StoreUnavailable, "aggregation store is not running")
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Configuration error",
            message,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging & Metrics
    // ─────────────────────────────────────────────────────────────────────────

    /// Log the error at a level matching its severity.
    pub fn log(&self) {
        match self.severity() {
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %self.code,
                    category = self.code.category(),
                    message = %self.user_message,
                    "Request error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %self.code,
                    category = self.code.category(),
                    message = %self.user_message,
                    internal = ?self.internal_message,
                    "Operational error"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %self.code,
                    category = self.code.category(),
                    message = %self.user_message,
                    internal = ?self.internal_message,
                    source = ?self.source.as_ref().map(|s| s.to_string()),
                    "System error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "reqlens_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category()
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error body returned by the HTTP surface.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub numeric_code: u32,
    pub message: String,
    pub category: &'static str,
}

impl From<&ReqlensError> for ErrorResponse {
    fn from(error: &ReqlensError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                category: error.code.category(),
            },
        }
    }
}

impl IntoResponse for ReqlensError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.http_status();
        let body = ErrorResponse::from(&self);
        (status, Json(body)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for ReqlensError {
    fn from(error: serde_json::Error) -> Self {
        use serde_json::error::Category;

        let (code, message) = match error.classify() {
            Category::Syntax | Category::Eof => (ErrorCode::InvalidJson, "Invalid JSON payload"),
            Category::Data => (ErrorCode::InvalidPayload, "Body is not a bridge request"),
            Category::Io => (ErrorCode::InternalError, "An internal error occurred"),
        };
        Self::with_internal(code, message, error.to_string()).with_source(error)
    }
}

impl From<std::io::Error> for ReqlensError {
    fn from(error: std::io::Error) -> Self {
        Self::with_internal(ErrorCode::IngestIo, "I/O error", error.to_string()).with_source(error)
    }
}

impl From<EventError> for ReqlensError {
    fn from(error: EventError) -> Self {
        let code = match &error {
            EventError::MissingRequestId => ErrorCode::MissingRequestId,
            EventError::NotAnObject(_) => ErrorCode::InvalidEvent,
        };
        Self::new(code, error.to_string()).with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
