//! Read-side projections over the aggregation store.
//!
//! Every projection is a pure read. Lookups by id return [`Lookup`], which
//! keeps "unknown id" apart from "known but empty".

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{AggregateRecord, AggregationStore, ContextGroup, EventEntry, RequestSummary};

// =============================================================================
// Lookup
// =============================================================================

/// Result of a lookup by request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Lookup<T> {
    NotFound,
    Found(T),
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(value) => Lookup::Found(f(value)),
            Self::NotFound => Lookup::NotFound,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Found(value),
            None => Self::NotFound,
        }
    }
}

// =============================================================================
// Projections
// =============================================================================

/// Entry counts of a record's append-only buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketCounts {
    pub messages: usize,
    pub queries: usize,
    pub timeline: usize,
    pub counters: usize,
    pub context_groups: usize,
}

/// List-row view of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub request_id: String,
    pub correlation_id: Option<String>,
    pub arrival_order: u64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub summary: RequestSummary,
    pub counts: BucketCounts,
    pub hidden: bool,
    pub event_count: u64,
}

impl From<&AggregateRecord> for RecordSummary {
    fn from(record: &AggregateRecord) -> Self {
        Self {
            request_id: record.request_id.clone(),
            correlation_id: record.correlation_id.clone(),
            arrival_order: record.arrival_order,
            first_seen_at: record.first_seen_at,
            last_seen_at: record.last_seen_at,
            summary: record.summary.clone(),
            counts: BucketCounts {
                messages: record.messages.len(),
                queries: record.queries.len(),
                timeline: record.timeline.len(),
                counters: record.counters.len(),
                context_groups: record.context.len(),
            },
            hidden: record.hidden,
            event_count: record.event_count,
        }
    }
}

// =============================================================================
// Record Query
// =============================================================================

/// Borrowed, read-only view of the store.
#[derive(Clone, Copy)]
pub struct RecordQuery<'a> {
    store: &'a AggregationStore,
}

impl<'a> RecordQuery<'a> {
    pub fn new(store: &'a AggregationStore) -> Self {
        Self { store }
    }

    pub fn get(&self, request_id: &str) -> Option<&'a AggregateRecord> {
        self.store.get(request_id)
    }

    /// Full record, cloned out of the store.
    pub fn record(&self, request_id: &str) -> Lookup<AggregateRecord> {
        self.get(request_id).cloned().into()
    }

    pub fn summary(&self, request_id: &str) -> Lookup<RecordSummary> {
        self.get(request_id).map(RecordSummary::from).into()
    }

    pub fn context(&self, request_id: &str) -> Lookup<BTreeMap<String, ContextGroup>> {
        self.get(request_id).map(|r| r.context.clone()).into()
    }

    pub fn messages(&self, request_id: &str) -> Lookup<Vec<EventEntry>> {
        self.get(request_id).map(|r| r.messages.clone()).into()
    }

    pub fn queries(&self, request_id: &str) -> Lookup<Vec<EventEntry>> {
        self.get(request_id).map(|r| r.queries.clone()).into()
    }

    pub fn timeline(&self, request_id: &str) -> Lookup<Vec<EventEntry>> {
        self.get(request_id).map(|r| r.timeline.clone()).into()
    }

    pub fn counters(&self, request_id: &str) -> Lookup<Vec<EventEntry>> {
        self.get(request_id).map(|r| r.counters.clone()).into()
    }

    /// Summaries of visible records, newest first.
    pub fn list_visible(&self) -> Vec<RecordSummary> {
        self.store.list_visible().into_iter().map(RecordSummary::from).collect()
    }

    pub fn list_by_correlation(&self, correlation_id: &str) -> Vec<RecordSummary> {
        self.store
            .list_by_correlation(correlation_id)
            .into_iter()
            .map(RecordSummary::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> AggregationStore {
        let mut store = AggregationStore::default();
        store.merge_value(json!({"requestId": "r1", "type": "request", "method": "GET"}));
        store.merge_value(json!({"requestId": "r1", "type": "query", "sql": "SELECT 1"}));
        store.merge_value(json!({"requestId": "r2", "type": "request", "method": "POST"}));
        store
    }

    #[test]
    fn test_not_found_distinct_from_empty() {
        let store = seeded();
        let query = RecordQuery::new(&store);

        assert_eq!(query.messages("r1"), Lookup::Found(vec![]));
        assert_eq!(query.messages("missing"), Lookup::NotFound);
    }

    #[test]
    fn test_summary_counts() {
        let store = seeded();
        let summary = RecordQuery::new(&store).summary("r1").into_option().unwrap();

        assert_eq!(summary.counts.queries, 1);
        assert_eq!(summary.counts.messages, 0);
        assert_eq!(summary.summary.method.as_deref(), Some("GET"));
        assert_eq!(summary.event_count, 2);
    }

    #[test]
    fn test_list_visible_newest_first() {
        let store = seeded();
        let ids: Vec<_> = RecordQuery::new(&store)
            .list_visible()
            .into_iter()
            .map(|s| s.request_id)
            .collect();
        assert_eq!(ids, vec!["r2", "r1"]);
    }

    #[test]
    fn test_lookup_wire_format() {
        let not_found: Lookup<u32> = Lookup::NotFound;
        assert_eq!(serde_json::to_value(&not_found).unwrap(), json!({"status": "not_found"}));
        assert_eq!(
            serde_json::to_value(Lookup::Found(7)).unwrap(),
            json!({"status": "found", "data": 7})
        );

        let parsed: Lookup<u32> = serde_json::from_value(json!({"status": "not_found"})).unwrap();
        assert_eq!(parsed, Lookup::NotFound);
    }
}
