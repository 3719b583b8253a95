//! HTTP client for the Reqlens bridge endpoint.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A bridge call that reached the server but was rejected there.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("{command} rejected: {message}")]
    Rejected { command: String, message: String },
    #[error("reply token {got} does not match request {expected}")]
    TokenMismatch { expected: String, got: String },
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: String,
    command: &'a str,
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Lookup result as the server encodes it: `{"status": "found", "data": ..}`
/// or `{"status": "not_found"}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Lookup<T> {
    NotFound,
    Found(T),
}

/// HTTP client for the Reqlens API.
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client pointing at the given base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Return the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one bridge request through `POST /rpc` and return its result.
    pub async fn call(&self, command: &str, payload: Value) -> Result<Value> {
        let url = format!("{}/rpc", self.base_url);
        let request = BridgeRequest {
            id: Uuid::new_v4().to_string(),
            command,
            payload,
        };

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        let reply: BridgeReply = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))?;

        if reply.id != request.id {
            return Err(RpcError::TokenMismatch {
                expected: request.id,
                got: reply.id,
            }
            .into());
        }

        match reply.error {
            Some(message) => Err(RpcError::Rejected {
                command: command.to_string(),
                message,
            }
            .into()),
            None => Ok(reply.result.unwrap_or(Value::Null)),
        }
    }

    /// Bridge call with the result deserialized into `T`.
    pub async fn call_typed<T: DeserializeOwned>(&self, command: &str, payload: Value) -> Result<T> {
        let value = self.call(command, payload).await?;
        serde_json::from_value(value)
            .with_context(|| format!("Unexpected result shape for {}", command))
    }

    /// Bridge call for an id-based command; a missing record is an error.
    pub async fn lookup<T: DeserializeOwned>(&self, command: &str, request_id: &str) -> Result<T> {
        let lookup: Lookup<T> = self
            .call_typed(command, serde_json::json!({ "requestId": request_id }))
            .await?;
        match lookup {
            Lookup::Found(value) => Ok(value),
            Lookup::NotFound => anyhow::bail!("No request with id {}", request_id),
        }
    }

    /// Perform a raw GET request and return the full JSON value (for health endpoint).
    pub async fn get_raw(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = resp.status();
        if !status.is_success() && status != reqwest::StatusCode::SERVICE_UNAVAILABLE {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    /// GET a plain-text endpoint such as `/metrics`.
    pub async fn get_raw_text(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        if !resp.status().is_success() {
            anyhow::bail!("API error ({}) for {}", resp.status(), url);
        }
        Ok(resp.text().await?)
    }
}
