//! Aggregation store properties.
//!
//! These tests drive the store with raw event objects, the way the ingestion
//! path does, and check the merge guarantees on the resulting records.

use reqlens_core::events::{AggregationStore, MergeOutcome};
use reqlens_core::query::{Lookup, RecordQuery};
use serde_json::{json, Value};

// ============================================================================
// Test Utilities
// ============================================================================

fn store_with(events: &[Value]) -> AggregationStore {
    let mut store = AggregationStore::default();
    for event in events {
        store.merge_value(event.clone());
    }
    store
}

fn query_sqls(store: &AggregationStore, id: &str) -> Vec<String> {
    store
        .get(id)
        .unwrap()
        .queries
        .iter()
        .map(|e| e.fields["sql"].as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_request_query_request_scenario() {
    let store = store_with(&[
        json!({"requestId": "r1", "type": "request", "method": "GET", "url": "/a", "status": 200}),
        json!({"requestId": "r1", "type": "query", "sql": "SELECT 1"}),
        json!({"requestId": "r1", "type": "request", "status": 404}),
    ]);

    let record = store.get("r1").unwrap();
    assert_eq!(record.summary.method.as_deref(), Some("GET"));
    assert_eq!(record.summary.url.as_deref(), Some("/a"));
    assert_eq!(record.summary.status, Some(404));
    assert_eq!(record.summary.duration_ms, None);

    let queries: Vec<Value> = record
        .queries
        .iter()
        .map(|e| serde_json::to_value(e).unwrap())
        .collect();
    assert_eq!(queries, vec![json!({"sql": "SELECT 1"})]);
    assert_eq!(record.arrival_order, 1);
}

#[test]
fn test_later_request_event_fills_missing_fields() {
    let store = store_with(&[
        json!({"requestId": "r1", "type": "request", "method": "GET", "url": "/a"}),
        json!({"requestId": "r1", "type": "request", "status": 200, "duration": 12}),
    ]);

    let summary = &store.get("r1").unwrap().summary;
    assert_eq!(summary.method.as_deref(), Some("GET"));
    assert_eq!(summary.status, Some(200));
    assert_eq!(summary.duration_ms, Some(12.0));
}

#[test]
fn test_interleaved_requests_scenario() {
    let store = store_with(&[
        json!({"requestId": "r1", "type": "log", "msg": "a"}),
        json!({"requestId": "r2", "type": "log", "msg": "b"}),
        json!({"requestId": "r1", "type": "log", "msg": "c"}),
    ]);

    let r1 = store.get("r1").unwrap();
    let r2 = store.get("r2").unwrap();
    assert_eq!(r1.arrival_order, 1);
    assert_eq!(r2.arrival_order, 2);

    let r1_msgs: Vec<_> = r1.messages.iter().map(|m| m.fields["msg"].clone()).collect();
    assert_eq!(r1_msgs, vec![json!("a"), json!("c")]);
    assert_eq!(r2.messages.len(), 1);

    let order: Vec<_> = store.list_visible().iter().map(|r| r.request_id.clone()).collect();
    assert_eq!(order, vec!["r2", "r1"]);
}

// ============================================================================
// Merge Properties
// ============================================================================

#[test]
fn test_bucket_entries_kept_in_merge_order_without_loss() {
    let events: Vec<Value> = (0..50)
        .map(|i| match i % 3 {
            0 => json!({"requestId": "r", "type": "query", "sql": format!("q{}", i)}),
            1 => json!({"requestId": "r", "type": "timeline", "step": i}),
            _ => json!({"requestId": "r", "type": "counter", "n": i}),
        })
        .collect();
    let store = store_with(&events);

    let record = store.get("r").unwrap();
    assert_eq!(record.queries.len() + record.timeline.len() + record.counters.len(), 50);

    let expected: Vec<String> = (0..50).filter(|i| i % 3 == 0).map(|i| format!("q{}", i)).collect();
    assert_eq!(query_sqls(&store, "r"), expected);

    let steps: Vec<i64> = record.timeline.iter().map(|e| e.fields["step"].as_i64().unwrap()).collect();
    let mut sorted = steps.clone();
    sorted.sort();
    assert_eq!(steps, sorted);
}

#[test]
fn test_identical_events_are_not_deduplicated() {
    let event = json!({"requestId": "r", "type": "query", "sql": "SELECT 1"});
    let store = store_with(&[event.clone(), event]);
    assert_eq!(store.get("r").unwrap().queries.len(), 2);
}

#[test]
fn test_arrival_order_strictly_increasing() {
    let mut store = AggregationStore::default();
    let mut orders = Vec::new();
    for id in ["a", "b", "a", "c", "b", "d"] {
        if let MergeOutcome::Created { arrival_order } = store.merge_value(json!({"requestId": id})) {
            orders.push((id, arrival_order));
        }
    }
    assert_eq!(orders, vec![("a", 1), ("b", 2), ("c", 3), ("d", 4)]);
}

#[test]
fn test_absent_and_null_summary_fields_never_overwrite() {
    let store = store_with(&[
        json!({"requestId": "r", "type": "request", "method": "POST", "status": 201, "memory": 1024}),
        json!({"requestId": "r", "type": "request", "method": null}),
        json!({"requestId": "r", "type": "request", "url": "/late"}),
    ]);

    let summary = &store.get("r").unwrap().summary;
    assert_eq!(summary.method.as_deref(), Some("POST"));
    assert_eq!(summary.status, Some(201));
    assert_eq!(summary.memory_bytes, Some(1024));
    assert_eq!(summary.url.as_deref(), Some("/late"));
}

#[test]
fn test_context_deep_merge() {
    let store = store_with(&[
        json!({
            "requestId": "r",
            "type": "global",
            "key": "app",
            "value": {"env": "prod", "tags": ["a", "b"], "db": {"host": "x", "port": 5432}}
        }),
        json!({
            "requestId": "r",
            "type": "global",
            "key": "app",
            "value": {"env": "staging", "tags": ["c"], "db": {"host": "y"}}
        }),
    ]);

    let group = &store.get("r").unwrap().context["app"];
    assert_eq!(
        Value::Object(group.value.clone()),
        json!({"env": "staging", "tags": ["c"], "db": {"host": "y", "port": 5432}})
    );
}

#[test]
fn test_context_groups_are_independent() {
    let store = store_with(&[
        json!({"requestId": "r", "type": "global", "user": "alice"}),
        json!({"requestId": "r", "type": "global", "key": "session", "value": {"id": "s1"}}),
    ]);

    let context = &store.get("r").unwrap().context;
    assert_eq!(context.len(), 2);
    assert_eq!(context["global"].value["user"], "alice");
    assert_eq!(context["session"].value["id"], "s1");
}

// ============================================================================
// Hide / Visibility
// ============================================================================

#[test]
fn test_hide_excludes_from_list_but_not_from_get() {
    let mut store = store_with(&[json!({"requestId": "r1"}), json!({"requestId": "r2"})]);
    assert!(store.hide("r1"));

    let visible: Vec<_> = store.list_visible().iter().map(|r| r.request_id.clone()).collect();
    assert_eq!(visible, vec!["r2"]);

    let hidden = store.get("r1").unwrap();
    assert!(hidden.hidden);

    // Later events still merge into a hidden record.
    store.merge_value(json!({"requestId": "r1", "type": "query", "sql": "x"}));
    assert_eq!(store.get("r1").unwrap().queries.len(), 1);
    assert!(store.get("r1").unwrap().hidden);
}

#[test]
fn test_query_lookups_for_unknown_id() {
    let store = store_with(&[json!({"requestId": "known"})]);
    let query = RecordQuery::new(&store);

    assert_eq!(query.context("unknown"), Lookup::NotFound);
    assert_eq!(query.queries("unknown"), Lookup::NotFound);
    assert!(query.context("known").is_found());
    assert_eq!(query.queries("known"), Lookup::Found(vec![]));
}
