//! Decoded telemetry events.
//!
//! Producers send loosely-typed JSON objects. This module turns one such object
//! into a [`TelemetryEvent`]: the identity fields are lifted out and the rest is
//! classified into an [`EventKind`] so the merge dispatch in the store is an
//! exhaustive match.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Free-form event payload.
pub type Payload = Map<String, Value>;

/// Context key used when a context event does not name one.
pub const DEFAULT_CONTEXT_KEY: &str = "global";

/// Event type assumed when a producer omits `type`.
pub const DEFAULT_MESSAGE_TYPE: &str = "log";

const REQUEST_ID_KEYS: [&str; 2] = ["requestId", "requestID"];
const CORRELATION_ID_KEYS: [&str; 2] = ["correlationId", "correlationID"];

// =============================================================================
// Errors
// =============================================================================

/// Reasons a JSON value cannot become an event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event is not a JSON object (got {0})")]
    NotAnObject(&'static str),

    #[error("event has no requestId")]
    MissingRequestId,
}

// =============================================================================
// Event
// =============================================================================

/// One decoded telemetry fact.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub request_id: String,
    pub correlation_id: Option<String>,
    /// Producer clock, as sent. Informational only; the store stamps its own time.
    pub timestamp: Option<Value>,
    pub kind: EventKind,
}

/// The merge-relevant shape of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// HTTP request summary fields.
    Request(RequestSummary),
    /// A structured context group (`global` / `context` types).
    Context(ContextPatch),
    /// Datastore query.
    Query(Payload),
    /// Timeline span.
    Timeline(Payload),
    /// Counter sample.
    Counter(Payload),
    /// Anything else: console/log messages and unknown types.
    Other { event_type: String, payload: Payload },
}

impl EventKind {
    /// Classify a payload by its declared type.
    pub fn from_parts(event_type: String, mut payload: Payload) -> Self {
        match event_type.as_str() {
            "request" => Self::Request(RequestSummary::from_payload(&payload)),
            "global" | "context" => Self::Context(ContextPatch::from_payload(payload)),
            "query" => Self::Query(payload),
            "timeline" => Self::Timeline(payload),
            "counter" => Self::Counter(payload),
            _ => {
                payload.remove("type");
                Self::Other {
                    event_type,
                    payload,
                }
            }
        }
    }

    /// Event type as it appeared on the wire (`context` groups report `global`).
    pub fn event_type(&self) -> &str {
        match self {
            Self::Request(_) => "request",
            Self::Context(_) => "global",
            Self::Query(_) => "query",
            Self::Timeline(_) => "timeline",
            Self::Counter(_) => "counter",
            Self::Other { event_type, .. } => event_type,
        }
    }

    /// Name of the record section this event lands in.
    pub fn bucket(&self) -> &'static str {
        match self {
            Self::Request(_) => "summary",
            Self::Context(_) => "context",
            Self::Query(_) => "queries",
            Self::Timeline(_) => "timeline",
            Self::Counter(_) => "counters",
            Self::Other { .. } => "messages",
        }
    }
}

impl TelemetryEvent {
    /// Decode one event object.
    ///
    /// `requestId`/`correlationId` also accept the `...ID` spelling some
    /// producers use. A missing `type` is treated as a plain log message.
    pub fn from_value(value: Value) -> Result<Self, EventError> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => return Err(EventError::NotAnObject(json_kind(&other))),
        };

        let request_id = take_string(&mut fields, &REQUEST_ID_KEYS).ok_or(EventError::MissingRequestId)?;
        let correlation_id = take_string(&mut fields, &CORRELATION_ID_KEYS);
        let timestamp = fields.remove("timestamp").filter(|v| !v.is_null());
        let event_type =
            take_string(&mut fields, &["type"]).unwrap_or_else(|| DEFAULT_MESSAGE_TYPE.to_string());

        Ok(Self {
            request_id,
            correlation_id,
            timestamp,
            kind: EventKind::from_parts(event_type, fields),
        })
    }

    pub fn event_type(&self) -> &str {
        self.kind.event_type()
    }
}

// =============================================================================
// Request summary
// =============================================================================

/// Summary fields of an HTTP request. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub method: Option<String>,
    pub url: Option<String>,
    pub status: Option<u16>,
    pub duration_ms: Option<f64>,
    pub memory_bytes: Option<u64>,
}

impl RequestSummary {
    fn from_payload(payload: &Payload) -> Self {
        Self {
            method: string_field(payload, &["method"]),
            url: string_field(payload, &["url"]),
            status: first_present(payload, &["status"])
                .and_then(as_u64)
                .and_then(|v| u16::try_from(v).ok()),
            duration_ms: first_present(payload, &["duration", "durationMs"]).and_then(as_f64),
            memory_bytes: first_present(payload, &["memory", "memoryBytes"]).and_then(as_u64),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

// =============================================================================
// Context patch
// =============================================================================

/// A keyed group of structured metadata to deep-merge into a record's context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPatch {
    pub key: String,
    pub label: Option<String>,
    pub order: Option<i64>,
    pub value: Payload,
}

impl ContextPatch {
    fn from_payload(mut payload: Payload) -> Self {
        let key = take_string(&mut payload, &["key"]).unwrap_or_else(|| DEFAULT_CONTEXT_KEY.to_string());
        let label = take_string(&mut payload, &["label"]);
        let order = payload.remove("order").and_then(|v| v.as_i64());

        // An explicit `value` object wins; loose fields fill in around it.
        let value = match payload.remove("value") {
            Some(Value::Object(mut value)) => {
                for (k, v) in payload {
                    value.entry(k).or_insert(v);
                }
                value
            }
            Some(other) => {
                payload.insert("value".to_string(), other);
                payload
            }
            None => payload,
        };

        Self {
            key,
            label,
            order,
            value,
        }
    }
}

// =============================================================================
// Field helpers
// =============================================================================

fn take_string(fields: &mut Payload, keys: &[&str]) -> Option<String> {
    let mut found = None;
    for key in keys {
        if let Some(value) = fields.remove(*key) {
            if found.is_none() {
                found = scalar_to_string(value);
            }
        }
    }
    found
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_present<'a>(payload: &'a Payload, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| payload.get(*k))
        .find(|v| !v.is_null())
}

fn string_field(payload: &Payload, keys: &[&str]) -> Option<String> {
    first_present(payload, keys).and_then(|v| scalar_to_string(v.clone()))
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
