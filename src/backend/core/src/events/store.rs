//! The aggregation store: request id to aggregate record.
//!
//! All mutation goes through [`AggregationStore::merge_event`]. Callers that
//! share a store across tasks do so through [`super::service::StoreService`],
//! which owns the store on a single task.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::ReqlensError;

use super::aggregate::{Aggregate, AggregateRecord};
use super::event::TelemetryEvent;

/// Default capacity of the change notification channel.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 1024;

/// Emitted once per merged event. Carries only the id; listeners re-query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    pub request_id: String,
}

/// What a merge did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First event for this id; the record was created.
    Created { arrival_order: u64 },
    /// Existing record updated.
    Updated,
    /// Event discarded; nothing changed and nothing was emitted.
    Rejected,
}

impl MergeOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

/// In-memory per-request aggregation.
pub struct AggregationStore {
    records: HashMap<String, AggregateRecord>,
    /// Process-lifetime counter; survives `clear`.
    next_arrival: u64,
    notifier: broadcast::Sender<ChangeNotification>,
}

impl Default for AggregationStore {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_CAPACITY)
    }
}

impl AggregationStore {
    pub fn new(notification_capacity: usize) -> Self {
        let (notifier, _) = broadcast::channel(notification_capacity.max(1));
        Self {
            records: HashMap::new(),
            next_arrival: 1,
            notifier,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────────

    /// Merge one event using the current time as its observation time.
    pub fn merge_event(&mut self, event: TelemetryEvent) -> MergeOutcome {
        self.merge_event_at(event, Utc::now())
    }

    /// Merge one event observed at `observed_at`.
    pub fn merge_event_at(&mut self, event: TelemetryEvent, observed_at: DateTime<Utc>) -> MergeOutcome {
        if event.request_id.trim().is_empty() {
            warn!(event_type = %event.event_type(), "Discarding event with empty requestId");
            counter!("reqlens_events_rejected_total", "reason" => "missing_request_id").increment(1);
            return MergeOutcome::Rejected;
        }

        let request_id = event.request_id.clone();
        let bucket = event.kind.bucket();

        let (mut record, outcome) = match self.records.remove(&request_id) {
            Some(record) => (record, MergeOutcome::Updated),
            None => {
                let arrival_order = self.next_arrival;
                self.next_arrival += 1;
                let record = AggregateRecord::new(
                    request_id.clone(),
                    event.correlation_id.clone(),
                    arrival_order,
                    observed_at,
                );
                (record, MergeOutcome::Created { arrival_order })
            }
        };

        record.apply(event, observed_at);
        self.records.insert(request_id.clone(), record);

        counter!("reqlens_events_merged_total", "bucket" => bucket).increment(1);
        gauge!("reqlens_records").set(self.records.len() as f64);
        debug!(request_id = %request_id, bucket, ?outcome, "Event merged");

        // No subscribers is fine.
        let _ = self.notifier.send(ChangeNotification { request_id });

        outcome
    }

    /// Decode and merge a raw event object.
    pub fn merge_value(&mut self, value: Value) -> MergeOutcome {
        match TelemetryEvent::from_value(value) {
            Ok(event) => self.merge_event(event),
            Err(e) => {
                let err = ReqlensError::from(e);
                warn!(error_code = %err.code(), error = %err.user_message(), "Discarding undecodable event");
                counter!("reqlens_events_rejected_total", "reason" => err.code().to_string())
                    .increment(1);
                MergeOutcome::Rejected
            }
        }
    }

    /// Soft-delete a record. Returns `false` when the id is unknown.
    pub fn hide(&mut self, request_id: &str) -> bool {
        match self.records.get_mut(request_id) {
            Some(record) => {
                record.hidden = true;
                debug!(request_id = %request_id, "Record hidden");
                true
            }
            None => false,
        }
    }

    /// Drop every record. Arrival numbering continues where it left off.
    pub fn clear(&mut self) {
        self.records.clear();
        gauge!("reqlens_records").set(0.0);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub fn get(&self, request_id: &str) -> Option<&AggregateRecord> {
        self.records.get(request_id)
    }

    /// Visible records, newest first by arrival order.
    pub fn list_visible(&self) -> Vec<&AggregateRecord> {
        let mut visible: Vec<_> = self.records.values().filter(|r| r.is_visible()).collect();
        visible.sort_by(|a, b| b.arrival_order.cmp(&a.arrival_order));
        visible
    }

    /// All records sharing a correlation id, hidden ones included, oldest first.
    pub fn list_by_correlation(&self, correlation_id: &str) -> Vec<&AggregateRecord> {
        let mut related: Vec<_> = self
            .records
            .values()
            .filter(|r| r.correlation_id.as_deref() == Some(correlation_id))
            .collect();
        related.sort_by_key(|r| r.arrival_order);
        related
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.notifier.subscribe()
    }

    pub(crate) fn notifier(&self) -> broadcast::Sender<ChangeNotification> {
        self.notifier.clone()
    }
}
