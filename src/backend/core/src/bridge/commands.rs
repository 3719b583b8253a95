//! The store's query surface, exposed as bridge commands.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::StoreHandle;
use crate::query::{Lookup, RecordSummary};

use super::server::{BridgeServer, CommandHandler};
use super::{BridgeError, BridgeResult};

/// Every command the store answers, under its stable wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryCommand {
    ListVisible,
    Get,
    Summary,
    Context,
    Messages,
    Queries,
    Timeline,
    Counters,
    Hide,
    ListByCorrelation,
}

impl QueryCommand {
    pub const ALL: [QueryCommand; 10] = [
        Self::ListVisible,
        Self::Get,
        Self::Summary,
        Self::Context,
        Self::Messages,
        Self::Queries,
        Self::Timeline,
        Self::Counters,
        Self::Hide,
        Self::ListByCorrelation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListVisible => "listVisible",
            Self::Get => "get",
            Self::Summary => "summary",
            Self::Context => "context",
            Self::Messages => "messages",
            Self::Queries => "queries",
            Self::Timeline => "timeline",
            Self::Counters => "counters",
            Self::Hide => "hide",
            Self::ListByCorrelation => "listByCorrelation",
        }
    }
}

impl fmt::Display for QueryCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryCommand {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| BridgeError::UnknownCommand(s.to_string()))
    }
}

/// Payload of the id-based commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestIdPayload {
    #[serde(alias = "requestID")]
    pub request_id: String,
}

/// Payload of `listByCorrelation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationPayload {
    #[serde(alias = "correlationID")]
    pub correlation_id: String,
}

/// Answers one [`QueryCommand`] against the store task.
pub struct StoreCommandHandler {
    store: StoreHandle,
    command: QueryCommand,
}

impl StoreCommandHandler {
    pub fn new(store: StoreHandle, command: QueryCommand) -> Self {
        Self { store, command }
    }
}

#[async_trait]
impl CommandHandler for StoreCommandHandler {
    async fn handle(&self, payload: Value) -> BridgeResult<Value> {
        let store = &self.store;
        match self.command {
            QueryCommand::ListVisible => to_value(store.read(|q| q.list_visible()).await),
            QueryCommand::ListByCorrelation => {
                let CorrelationPayload { correlation_id } = parse(payload)?;
                to_value(store.read(move |q| q.list_by_correlation(&correlation_id)).await)
            }
            QueryCommand::Hide => {
                let id = request_id(payload)?;
                let hidden = store
                    .with_store(move |s| {
                        s.hide(&id);
                        Lookup::from(s.get(&id).map(RecordSummary::from))
                    })
                    .await;
                to_value(hidden)
            }
            QueryCommand::Get => {
                let id = request_id(payload)?;
                to_value(store.read(move |q| q.record(&id)).await)
            }
            QueryCommand::Summary => {
                let id = request_id(payload)?;
                to_value(store.read(move |q| q.summary(&id)).await)
            }
            QueryCommand::Context => {
                let id = request_id(payload)?;
                to_value(store.read(move |q| q.context(&id)).await)
            }
            QueryCommand::Messages => {
                let id = request_id(payload)?;
                to_value(store.read(move |q| q.messages(&id)).await)
            }
            QueryCommand::Queries => {
                let id = request_id(payload)?;
                to_value(store.read(move |q| q.queries(&id)).await)
            }
            QueryCommand::Timeline => {
                let id = request_id(payload)?;
                to_value(store.read(move |q| q.timeline(&id)).await)
            }
            QueryCommand::Counters => {
                let id = request_id(payload)?;
                to_value(store.read(move |q| q.counters(&id)).await)
            }
        }
    }
}

/// Register the full query surface on `server`.
pub fn register_store_commands(server: &mut BridgeServer, store: StoreHandle) {
    for command in QueryCommand::ALL {
        server.register(command.as_str(), StoreCommandHandler::new(store.clone(), command));
    }
}

fn request_id(payload: Value) -> BridgeResult<String> {
    parse::<RequestIdPayload>(payload).map(|p| p.request_id)
}

fn parse<T: serde::de::DeserializeOwned>(payload: Value) -> BridgeResult<T> {
    serde_json::from_value(payload).map_err(|e| BridgeError::InvalidPayload(e.to_string()))
}

fn to_value<T: Serialize>(result: crate::error::Result<T>) -> BridgeResult<Value> {
    let value = result.map_err(|e| BridgeError::Handler(e.to_string()))?;
    serde_json::to_value(value).map_err(|e| BridgeError::Handler(e.to_string()))
}
