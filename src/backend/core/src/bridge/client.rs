//! Caller side of the bridge.
//!
//! [`BridgeClient::call`] registers a waiting entry under a fresh token and
//! sends the request. The transport feeds every inbound message to
//! [`BridgeClient::handle_inbound`], which either settles the matching call or
//! hands the message to the listeners for its `type`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::message::BridgeRequest;
use super::{BridgeError, BridgeResult};

const LISTENER_CAPACITY: usize = 256;

type Waiter = oneshot::Sender<BridgeResult<Value>>;

/// Outstanding calls by token. `closed` shares the lock so no entry can be
/// registered after [`BridgeClient::close`] has drained the table.
#[derive(Default)]
struct WaitingTable {
    closed: bool,
    waiters: HashMap<String, Waiter>,
}

impl WaitingTable {
    fn register(&mut self, id: String, waiter: Waiter) -> BridgeResult<()> {
        if self.closed {
            return Err(BridgeError::ChannelClosed);
        }
        self.waiters.insert(id, waiter);
        Ok(())
    }

    fn close(&mut self) -> Vec<Waiter> {
        self.closed = true;
        self.waiters.drain().map(|(_, waiter)| waiter).collect()
    }
}

/// What [`BridgeClient::handle_inbound`] did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Settled a waiting call.
    Resolved,
    /// Forwarded to the listeners of this type.
    Dispatched(String),
    /// Nobody wanted it.
    Ignored,
}

/// Caller half of the bridge. Cheap to clone; clones share the waiting table.
#[derive(Clone)]
pub struct BridgeClient {
    outbound: mpsc::Sender<BridgeRequest>,
    pending: Arc<Mutex<WaitingTable>>,
    listeners: Arc<Mutex<HashMap<String, broadcast::Sender<Value>>>>,
}

impl BridgeClient {
    pub fn new(outbound: mpsc::Sender<BridgeRequest>) -> Self {
        Self {
            outbound,
            pending: Arc::new(Mutex::new(WaitingTable::default())),
            listeners: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Calls
    // ─────────────────────────────────────────────────────────────────────────

    /// Call `command` and wait for its reply. Never times out on its own.
    pub async fn call(&self, command: &str, payload: Value) -> BridgeResult<Value> {
        let (_, reply) = self.send_request(command, payload).await?;
        reply.await.unwrap_or(Err(BridgeError::ChannelClosed))
    }

    /// Like [`call`](Self::call) but gives up after `timeout`, dropping the waiting entry.
    pub async fn call_with_timeout(
        &self,
        command: &str,
        payload: Value,
        timeout: Duration,
    ) -> BridgeResult<Value> {
        let (id, reply) = self.send_request(command, payload).await?;
        match tokio::time::timeout(timeout, reply).await {
            Ok(outcome) => outcome.unwrap_or(Err(BridgeError::ChannelClosed)),
            Err(_) => {
                self.pending.lock().waiters.remove(&id);
                debug!(id = %id, command = %command, "Bridge call abandoned");
                Err(BridgeError::TimedOut(timeout))
            }
        }
    }

    /// Typed convenience over [`call`](Self::call).
    pub async fn call_typed<P, T>(&self, command: &str, payload: &P) -> BridgeResult<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_value(payload).map_err(|e| BridgeError::InvalidPayload(e.to_string()))?;
        let value = self.call(command, payload).await?;
        serde_json::from_value(value).map_err(|e| BridgeError::InvalidPayload(e.to_string()))
    }

    async fn send_request(
        &self,
        command: &str,
        payload: Value,
    ) -> BridgeResult<(String, oneshot::Receiver<BridgeResult<Value>>)> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().register(id.clone(), tx)?;

        let request = BridgeRequest::new(id.clone(), command, payload);
        trace!(id = %id, command = %command, "Bridge call sent");
        if self.outbound.send(request).await.is_err() {
            self.pending.lock().waiters.remove(&id);
            return Err(BridgeError::ChannelClosed);
        }

        Ok((id, rx))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────────

    /// Route one inbound message.
    pub fn handle_inbound(&self, message: Value) -> Disposition {
        if let Some(id) = message.get("id").and_then(Value::as_str) {
            let waiter = self.pending.lock().waiters.remove(id);
            if let Some(waiter) = waiter {
                let outcome = match message.get("error") {
                    Some(error) if !error.is_null() => Err(BridgeError::Remote(error_text(error))),
                    _ => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
                };
                // The caller may have stopped waiting.
                let _ = waiter.send(outcome);
                return Disposition::Resolved;
            }
        }

        let Some(kind) = message.get("type").and_then(Value::as_str).map(str::to_owned) else {
            warn!("Dropping inbound message with no matching call and no type");
            return Disposition::Ignored;
        };

        let listeners = self.listeners.lock().get(&kind).cloned();
        match listeners {
            Some(tx) if tx.receiver_count() > 0 => {
                let _ = tx.send(message);
                Disposition::Dispatched(kind)
            }
            _ => Disposition::Ignored,
        }
    }

    /// Receive every unsolicited message tagged with `type == kind`.
    pub fn subscribe(&self, kind: &str) -> broadcast::Receiver<Value> {
        self.listeners
            .lock()
            .entry(kind.to_string())
            .or_insert_with(|| broadcast::channel(LISTENER_CAPACITY).0)
            .subscribe()
    }

    /// Drain an inbound stream until it ends, then close.
    pub async fn run<S>(self, inbound: S)
    where
        S: Stream<Item = Value>,
    {
        futures::pin_mut!(inbound);
        while let Some(message) = inbound.next().await {
            self.handle_inbound(message);
        }
        self.close();
    }

    /// Reject every waiting call and refuse new ones.
    pub fn close(&self) {
        let drained = self.pending.lock().close();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Rejecting outstanding bridge calls");
        }
        for waiter in drained {
            let _ = waiter.send(Err(BridgeError::ChannelClosed));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().waiters.len()
    }

    pub fn is_closed(&self) -> bool {
        self.pending.lock().closed
    }
}

fn error_text(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}
