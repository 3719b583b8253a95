//! HTTP and WebSocket surface for display clients.
//!
//! - `GET  /health`  liveness plus record count
//! - `GET  /metrics` Prometheus exposition (when enabled)
//! - `POST /rpc`     one bridge request, one bridge reply
//! - `GET  /bridge`  WebSocket carrying bridge traffic and pushed notifications

mod handlers;
mod websocket;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::bridge::{register_store_commands, BridgeServer, Notification};
use crate::events::StoreHandle;
use crate::telemetry::MetricsRegistry;

pub use handlers::health_check;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: StoreHandle,
    pub bridge: Arc<BridgeServer>,
    pub notifications: broadcast::Sender<Notification>,
    pub metrics: MetricsRegistry,
}

impl AppState {
    /// State with the store's query surface registered on a fresh bridge.
    pub fn new(
        store: StoreHandle,
        notifications: broadcast::Sender<Notification>,
        metrics: MetricsRegistry,
    ) -> Self {
        let mut bridge = BridgeServer::new();
        register_store_commands(&mut bridge, store.clone());

        Self {
            store,
            bridge: Arc::new(bridge),
            notifications,
            metrics,
        }
    }
}

/// Relay store change notifications onto the display notification channel.
///
/// Ends when the store service stops.
pub fn spawn_change_forwarder(
    store: &StoreHandle,
    notifications: broadcast::Sender<Notification>,
) -> JoinHandle<()> {
    let mut changes = BroadcastStream::new(store.subscribe());
    tokio::spawn(async move {
        while let Some(change) = changes.next().await {
            match change {
                Ok(change) => {
                    let _ = notifications.send(Notification::from(change));
                }
                Err(e) => warn!(error = %e, "Change notifications dropped"),
            }
        }
    })
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/rpc", post(handlers::rpc))
        .route("/bridge", get(websocket::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
