//! End-to-end tests: producers over TCP, display clients over HTTP.
//!
//! These tests wire the same pieces `reqlens-server` wires, on ephemeral
//! ports.

use std::time::Duration;

use reqlens_core::api::{self, AppState};
use reqlens_core::bridge::Notification;
use reqlens_core::config::IngestConfig;
use reqlens_core::events::{AggregationStore, StoreHandle, StoreService};
use reqlens_core::ingest::IngestListener;
use reqlens_core::telemetry::MetricsRegistry;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Utilities
// ============================================================================

struct Harness {
    store: StoreHandle,
    notifications: broadcast::Sender<Notification>,
    ingest_addr: std::net::SocketAddr,
    shutdown: CancellationToken,
}

async fn start() -> Harness {
    let (store, _task) = StoreService::spawn(AggregationStore::default(), 256);
    let (notifications, _) = broadcast::channel(256);
    api::spawn_change_forwarder(&store, notifications.clone());

    let config = IngestConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..IngestConfig::default()
    };
    let listener = IngestListener::bind(&config, store.clone(), notifications.clone())
        .await
        .unwrap();
    let ingest_addr = listener.local_addr().unwrap();

    let shutdown = CancellationToken::new();
    tokio::spawn(listener.run(shutdown.clone()));

    Harness {
        store,
        notifications,
        ingest_addr,
        shutdown,
    }
}

async fn serve_http(harness: &Harness) -> String {
    let state = AppState::new(
        harness.store.clone(),
        harness.notifications.clone(),
        MetricsRegistry::disabled(),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api::build_router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Collect notifications until a producer disconnects.
async fn until_disconnect(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let notification = rx.recv().await.unwrap();
            let done = matches!(notification, Notification::ClientDisconnected { .. });
            seen.push(notification);
            if done {
                break;
            }
        }
    })
    .await
    .expect("producer never disconnected");
    seen
}

async fn produce(addr: std::net::SocketAddr, chunks: &[&[u8]]) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    for chunk in chunks {
        stream.write_all(chunk).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    stream.shutdown().await.unwrap();
}

// ============================================================================
// Ingestion
// ============================================================================

#[tokio::test]
async fn test_tcp_events_are_aggregated() {
    let harness = start().await;
    let mut rx = harness.notifications.subscribe();

    produce(
        harness.ingest_addr,
        &[
            br#"[{"requestId":"r1","type":"request","method":"GET","url":"/a"},"#,
            br#"{"requestId":"r1","type":"query","sql":"SELECT 1"}]"#,
            b"\n{\"requestId\":\"r1\",\"type\":\"request\",\"status\":200}",
            b"{this is not json}",
        ],
    )
    .await;

    let seen = until_disconnect(&mut rx).await;
    assert!(matches!(seen[0], Notification::ClientConnected { .. }));

    let record = harness
        .store
        .read(|q| q.get("r1").cloned())
        .await
        .unwrap()
        .expect("record r1");
    assert_eq!(record.summary.method.as_deref(), Some("GET"));
    assert_eq!(record.summary.status, Some(200));
    assert_eq!(record.queries.len(), 1);
    assert_eq!(record.event_count, 3);

    harness.shutdown.cancel();
}

#[tokio::test]
async fn test_each_merge_emits_request_changed() {
    let harness = start().await;
    let mut rx = harness.notifications.subscribe();

    produce(
        harness.ingest_addr,
        &[br#"{"requestId":"a"}{"requestId":"b"}{"requestId":"a"}{"type":"log"}"#],
    )
    .await;
    let seen = until_disconnect(&mut rx).await;

    // Merges may trail the disconnect notice; a read queues behind them.
    assert_eq!(harness.store.len().await.unwrap(), 2);

    let mut changed: Vec<String> = seen
        .into_iter()
        .filter_map(|n| match n {
            Notification::RequestChanged { request_id } => Some(request_id),
            _ => None,
        })
        .collect();
    while changed.len() < 3 {
        let notification = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        if let Notification::RequestChanged { request_id } = notification {
            changed.push(request_id);
        }
    }
    assert_eq!(changed, vec!["a", "b", "a"]);

    harness.shutdown.cancel();
}

#[tokio::test]
async fn test_connections_keep_their_own_order() {
    let harness = start().await;
    let mut rx = harness.notifications.subscribe();

    let events: String = (0..20)
        .map(|i| format!(r#"{{"requestId":"shared","type":"timeline","step":{}}}"#, i))
        .collect();
    let other: String = (0..20)
        .map(|i| format!(r#"{{"requestId":"other","type":"timeline","step":{}}}"#, i))
        .collect();

    let events_chunks = [events.as_bytes()];
    let other_chunks = [other.as_bytes()];
    tokio::join!(
        produce(harness.ingest_addr, &events_chunks),
        produce(harness.ingest_addr, &other_chunks),
    );
    until_disconnect(&mut rx).await;
    until_disconnect(&mut rx).await;

    for id in ["shared", "other"] {
        let steps = harness
            .store
            .read(move |q| {
                q.get(id)
                    .map(|r| r.timeline.iter().map(|e| e.fields["step"].as_i64().unwrap()).collect::<Vec<_>>())
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(steps, (0..20).collect::<Vec<_>>());
    }

    harness.shutdown.cancel();
}

// ============================================================================
// HTTP Surface
// ============================================================================

#[tokio::test]
async fn test_rpc_endpoint_round_trip() {
    let harness = start().await;
    let base = serve_http(&harness).await;
    let mut rx = harness.notifications.subscribe();

    produce(
        harness.ingest_addr,
        &[br#"{"requestId":"r9","correlationId":"c9","type":"warning","text":"slow query"}"#],
    )
    .await;
    until_disconnect(&mut rx).await;
    harness.store.len().await.unwrap();

    let client = reqwest::Client::new();
    let reply: Value = client
        .post(format!("{}/rpc", base))
        .json(&json!({"id": "t1", "command": "messages", "payload": {"requestId": "r9"}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(reply["id"], "t1");
    assert_eq!(reply["result"]["status"], "found");
    assert_eq!(reply["result"]["data"][0]["type"], "warning");
    assert_eq!(reply["result"]["data"][0]["text"], "slow query");

    let reply: Value = client
        .post(format!("{}/rpc", base))
        .json(&json!({"id": "t2", "command": "nope", "payload": {}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["id"], "t2");
    assert!(reply["error"].as_str().unwrap().contains("nope"));

    harness.shutdown.cancel();
}

#[tokio::test]
async fn test_rpc_rejects_non_bridge_body() {
    let harness = start().await;
    let base = serve_http(&harness).await;

    let response = reqwest::Client::new()
        .post(format!("{}/rpc", base))
        .json(&json!({"hello": "world"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "INVALID_PAYLOAD");

    harness.shutdown.cancel();
}

#[tokio::test]
async fn test_rpc_rejects_malformed_json() {
    let harness = start().await;
    let base = serve_http(&harness).await;

    let response = reqwest::Client::new()
        .post(format!("{}/rpc", base))
        .header("content-type", "application/json")
        .body(r#"{"id":"t3","command":"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_JSON");
    assert_eq!(body["error"]["category"], "serialization");

    harness.shutdown.cancel();
}

#[tokio::test]
async fn test_health_and_disabled_metrics() {
    let harness = start().await;
    let base = serve_http(&harness).await;

    let health: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["records"], 0);

    let metrics = reqwest::get(format!("{}/metrics", base)).await.unwrap();
    assert_eq!(metrics.status(), reqwest::StatusCode::NOT_FOUND);

    harness.shutdown.cancel();
}
