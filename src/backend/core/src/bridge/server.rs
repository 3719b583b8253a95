//! Callee side of the bridge: a registry of named async handlers.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use metrics::counter;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::telemetry::RpcTimer;

use super::message::{BridgeReply, BridgeRequest};
use super::{BridgeError, BridgeResult};

// =============================================================================
// Handler Trait
// =============================================================================

/// A named bridge command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> BridgeResult<Value>;
}

#[async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BridgeResult<Value>> + Send + 'static,
{
    async fn handle(&self, payload: Value) -> BridgeResult<Value> {
        (self)(payload).await
    }
}

// =============================================================================
// Server
// =============================================================================

/// Dispatches bridge requests to registered handlers.
#[derive(Default)]
pub struct BridgeServer {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl BridgeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `command`, replacing any previous one.
    pub fn register<H>(&mut self, command: impl Into<String>, handler: H) -> &mut Self
    where
        H: CommandHandler + 'static,
    {
        let command = command.into();
        if self.handlers.insert(command.clone(), Arc::new(handler)).is_some() {
            warn!(command = %command, "Bridge handler replaced");
        }
        self
    }

    pub fn has_command(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    pub fn commands(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run one request to completion and build its reply.
    ///
    /// Handler failures and panics become error replies.
    pub async fn dispatch(&self, request: BridgeRequest) -> BridgeReply {
        let BridgeRequest { id, command, payload } = request;
        let result = self.invoke(&command, payload).await;

        if let Err(e) = &result {
            debug!(id = %id, command = %command, error = %e, "Bridge call rejected");
            counter!("reqlens_rpc_failures_total").increment(1);
        }

        BridgeReply::from_result(id, result)
    }

    /// Dispatch a raw JSON message.
    ///
    /// Returns `None` when the message cannot even be answered (no `id`).
    pub async fn dispatch_value(&self, message: Value) -> Option<BridgeReply> {
        match serde_json::from_value::<BridgeRequest>(message.clone()) {
            Ok(request) => Some(self.dispatch(request).await),
            Err(e) => {
                let id = message.get("id").and_then(Value::as_str)?;
                counter!("reqlens_rpc_failures_total").increment(1);
                Some(BridgeReply::err(id, BridgeError::InvalidPayload(e.to_string()).to_string()))
            }
        }
    }

    /// Answer requests from `inbound` on `outbound` until either side closes.
    ///
    /// Each request runs on its own task, so replies may leave out of order.
    pub async fn serve(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<BridgeRequest>,
        outbound: mpsc::Sender<BridgeReply>,
    ) {
        while let Some(request) = inbound.recv().await {
            let server = Arc::clone(&self);
            let outbound = outbound.clone();
            tokio::spawn(async move {
                let reply = server.dispatch(request).await;
                let _ = outbound.send(reply).await;
            });
        }
    }

    async fn invoke(&self, command: &str, payload: Value) -> BridgeResult<Value> {
        let Some(handler) = self.handlers.get(command).cloned() else {
            counter!("reqlens_rpc_calls_total", "command" => "unknown").increment(1);
            warn!(command = %command, "Unknown bridge command");
            return Err(BridgeError::UnknownCommand(command.to_string()));
        };

        counter!("reqlens_rpc_calls_total", "command" => command.to_string()).increment(1);
        let timer = RpcTimer::start(command);

        let outcome = AssertUnwindSafe(handler.handle(payload)).catch_unwind().await;
        timer.finish();

        match outcome {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(command = %command, panic = %message, "Bridge handler panicked");
                Err(BridgeError::Handler(format!("Handler for {} panicked: {}", command, message)))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
