//! HTTP request handlers.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

use super::AppState;
use crate::bridge::{BridgeReply, BridgeRequest};
use crate::error::ReqlensError;

// ═══════════════════════════════════════════════════════════════════════════════
// Health Check
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.len().await {
        Ok(records) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "records": records,
                "timestamp": chrono::Utc::now().to_rfc3339()
            })),
        ),
        Err(e) => {
            e.log();
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "version": env!("CARGO_PKG_VERSION"),
                    "error": e.user_message(),
                    "timestamp": chrono::Utc::now().to_rfc3339()
                })),
            )
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Bridge over HTTP
// ═══════════════════════════════════════════════════════════════════════════════

/// One bridge round trip. Bridge failures travel in the reply body, not as
/// HTTP errors; only a body that is not a bridge request is a 4xx.
pub async fn rpc(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BridgeReply>, ReqlensError> {
    let request: BridgeRequest = serde_json::from_slice(&body)?;
    Ok(Json(state.bridge.dispatch(request).await))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "metrics disabled\n".to_string(),
        ),
    }
}
