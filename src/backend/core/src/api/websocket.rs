//! Bridge over WebSocket.
//!
//! Inbound text frames are bridge requests. Outbound frames are bridge replies
//! and pushed [`Notification`]s (`requestChanged`, `clientConnected`, ...).
//! Replies can leave in a different order than requests arrived.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::BroadcastStream;

use super::AppState;
use crate::bridge::BridgeReply;

const OUTBOUND_CAPACITY: usize = 256;

/// Handle WebSocket upgrade.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);

    tracing::info!("Display client connected");

    // Single writer: replies and notifications share the sink.
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let pusher = {
        let out_tx = out_tx.clone();
        let mut notifications = BroadcastStream::new(state.notifications.subscribe());
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                let Ok(notification) = notification else {
                    tracing::warn!("Display client lagging; notifications skipped");
                    continue;
                };
                let Ok(text) = serde_json::to_string(&notification) else {
                    continue;
                };
                if out_tx.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        })
    };

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let value = match serde_json::from_str::<Value>(&text) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(error = %e, "Invalid bridge frame");
                        continue;
                    }
                };

                let bridge = state.bridge.clone();
                let out_tx = out_tx.clone();
                tokio::spawn(async move {
                    if let Some(reply) = bridge.dispatch_value(value).await {
                        send_reply(&out_tx, &reply).await;
                    }
                });
            }
            Ok(Message::Ping(data)) => {
                if out_tx.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::error!(error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    pusher.abort();
    drop(out_tx);
    let _ = writer.await;

    tracing::info!("Display client disconnected");
}

async fn send_reply(out_tx: &mpsc::Sender<Message>, reply: &BridgeReply) {
    match serde_json::to_string(reply) {
        Ok(text) => {
            let _ = out_tx.send(Message::Text(text)).await;
        }
        Err(e) => tracing::error!(error = %e, id = %reply.id, "Failed to encode bridge reply"),
    }
}
