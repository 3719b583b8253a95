//! Aggregate trait and the per-request record it folds events into.
//!
//! An [`AggregateRecord`] is created on the first event for a request id and
//! then grows by applying every later event for the same id.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::{ContextPatch, EventKind, Payload, RequestSummary, TelemetryEvent};
use super::merge::{deep_merge_map, merge_last_non_null};

// =============================================================================
// Aggregate Trait
// =============================================================================

/// Something that can be rebuilt by folding telemetry events.
///
/// `apply` must not fail or perform I/O. Every event that reaches an aggregate
/// has already passed decoding.
pub trait Aggregate {
    /// Fold one event observed at `observed_at` (ingestion-local clock).
    fn apply(&mut self, event: TelemetryEvent, observed_at: DateTime<Utc>);
}

// =============================================================================
// Record Parts
// =============================================================================

impl RequestSummary {
    /// Field-wise last-non-null-wins merge.
    pub fn merge(&mut self, incoming: RequestSummary) {
        merge_last_non_null(&mut self.method, incoming.method);
        merge_last_non_null(&mut self.url, incoming.url);
        merge_last_non_null(&mut self.status, incoming.status);
        merge_last_non_null(&mut self.duration_ms, incoming.duration_ms);
        merge_last_non_null(&mut self.memory_bytes, incoming.memory_bytes);
    }
}

/// One keyed group of structured context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextGroup {
    pub label: String,
    pub order: i64,
    pub value: Payload,
}

impl ContextGroup {
    fn new(key: &str) -> Self {
        Self {
            label: key.to_string(),
            order: 0,
            value: Payload::new(),
        }
    }

    fn merge(&mut self, patch: ContextPatch) {
        if let Some(label) = patch.label {
            self.label = label;
        }
        if let Some(order) = patch.order {
            self.order = order;
        }
        deep_merge_map(&mut self.value, patch.value);
    }
}

/// An appended bucket entry: the event payload, without identity fields,
/// plus the producer `timestamp` exactly as sent (omitted when absent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(flatten)]
    pub fields: Payload,
}

impl EventEntry {
    pub fn new(timestamp: Option<Value>, fields: Payload) -> Self {
        Self { timestamp, fields }
    }

    /// The entry's original event type, present on `messages` entries.
    pub fn event_type(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }
}

// =============================================================================
// Aggregate Record
// =============================================================================

/// Everything known about one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRecord {
    pub request_id: String,
    pub correlation_id: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub arrival_order: u64,
    pub summary: RequestSummary,
    pub context: BTreeMap<String, ContextGroup>,
    pub messages: Vec<EventEntry>,
    pub queries: Vec<EventEntry>,
    pub timeline: Vec<EventEntry>,
    pub counters: Vec<EventEntry>,
    pub hidden: bool,
    /// Number of events applied.
    pub event_count: u64,
}

impl AggregateRecord {
    /// Start an empty record. Identity and arrival fields are fixed from here on.
    pub fn new(
        request_id: impl Into<String>,
        correlation_id: Option<String>,
        arrival_order: u64,
        first_seen_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            correlation_id,
            first_seen_at,
            last_seen_at: first_seen_at,
            arrival_order,
            summary: RequestSummary::default(),
            context: BTreeMap::new(),
            messages: Vec::new(),
            queries: Vec::new(),
            timeline: Vec::new(),
            counters: Vec::new(),
            hidden: false,
            event_count: 0,
        }
    }

    pub fn is_visible(&self) -> bool {
        !self.hidden
    }
}

impl Aggregate for AggregateRecord {
    fn apply(&mut self, event: TelemetryEvent, observed_at: DateTime<Utc>) {
        debug_assert_eq!(event.request_id, self.request_id);

        self.event_count += 1;
        self.last_seen_at = observed_at;

        // Only ever filled, never replaced.
        if self.correlation_id.is_none() {
            self.correlation_id = event.correlation_id;
        }

        let timestamp = event.timestamp;
        match event.kind {
            EventKind::Request(summary) => self.summary.merge(summary),
            EventKind::Context(patch) => {
                self.context
                    .entry(patch.key.clone())
                    .or_insert_with(|| ContextGroup::new(&patch.key))
                    .merge(patch);
            }
            EventKind::Query(payload) => self.queries.push(EventEntry::new(timestamp, payload)),
            EventKind::Timeline(payload) => self.timeline.push(EventEntry::new(timestamp, payload)),
            EventKind::Counter(payload) => self.counters.push(EventEntry::new(timestamp, payload)),
            EventKind::Other {
                event_type,
                mut payload,
            } => {
                payload.insert("type".to_string(), Value::String(event_type));
                self.messages.push(EventEntry::new(timestamp, payload));
            }
        }
    }
}
