//! Bridge wire messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BridgeError;

/// A call: `{id, command, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub payload: Value,
}

impl BridgeRequest {
    pub fn new(id: impl Into<String>, command: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            payload,
        }
    }
}

/// Either side of a reply, flattened into it as `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOutcome {
    Result(Value),
    Error(String),
}

/// A reply: `{id, result}` or `{id, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeReply {
    pub id: String,
    #[serde(flatten)]
    pub outcome: ReplyOutcome,
}

impl BridgeReply {
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            outcome: ReplyOutcome::Result(result),
        }
    }

    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            outcome: ReplyOutcome::Error(error.into()),
        }
    }

    pub fn from_result(id: impl Into<String>, result: Result<Value, BridgeError>) -> Self {
        match result {
            Ok(value) => Self::ok(id, value),
            Err(e) => Self::err(id, e.to_string()),
        }
    }

    /// Caller-side view of the outcome.
    pub fn into_result(self) -> Result<Value, BridgeError> {
        match self.outcome {
            ReplyOutcome::Result(value) => Ok(value),
            ReplyOutcome::Error(message) => Err(BridgeError::Remote(message)),
        }
    }
}

/// Unsolicited messages pushed to display clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    #[serde(rename_all = "camelCase")]
    RequestChanged { request_id: String },
    ClientConnected { peer: String },
    ClientDisconnected { peer: String },
    ClientError { peer: String, message: String },
}

impl Notification {
    /// The `type` tag this notification is sent under.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestChanged { .. } => "requestChanged",
            Self::ClientConnected { .. } => "clientConnected",
            Self::ClientDisconnected { .. } => "clientDisconnected",
            Self::ClientError { .. } => "clientError",
        }
    }
}

impl From<crate::events::ChangeNotification> for Notification {
    fn from(change: crate::events::ChangeNotification) -> Self {
        Self::RequestChanged {
            request_id: change.request_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_wire_shape() {
        let ok = serde_json::to_value(BridgeReply::ok("t1", json!([1, 2]))).unwrap();
        assert_eq!(ok, json!({"id": "t1", "result": [1, 2]}));

        let err = serde_json::to_value(BridgeReply::err("t2", "boom")).unwrap();
        assert_eq!(err, json!({"id": "t2", "error": "boom"}));
    }

    #[test]
    fn test_reply_parses_both_shapes() {
        let reply: BridgeReply = serde_json::from_value(json!({"id": "a", "error": "nope"})).unwrap();
        assert_eq!(reply.into_result(), Err(BridgeError::Remote("nope".into())));

        let reply: BridgeReply = serde_json::from_value(json!({"id": "a", "result": null})).unwrap();
        assert_eq!(reply.into_result(), Ok(Value::Null));
    }

    #[test]
    fn test_request_payload_defaults_to_null() {
        let req: BridgeRequest = serde_json::from_value(json!({"id": "x", "command": "listVisible"})).unwrap();
        assert_eq!(req.payload, Value::Null);
    }

    #[test]
    fn test_notification_tags() {
        let n = Notification::RequestChanged {
            request_id: "r1".into(),
        };
        assert_eq!(
            serde_json::to_value(&n).unwrap(),
            json!({"type": "requestChanged", "requestId": "r1"})
        );

        let n = Notification::ClientConnected { peer: "1.2.3.4:5".into() };
        assert_eq!(serde_json::to_value(&n).unwrap()["type"], n.kind());
    }
}
