//! Correlated request/response bridge.
//!
//! A caller ([`client::BridgeClient`]) and a callee ([`server::BridgeServer`])
//! talk over any message-only channel. Every call carries a fresh UUID token;
//! the callee echoes it in its reply so the caller can pair replies with
//! waiting calls regardless of order. Messages that are not replies are handed
//! to listeners keyed by their `type` field.

use std::time::Duration;

use thiserror::Error;

pub mod client;
pub mod commands;
pub mod message;
pub mod server;

pub use client::{BridgeClient, Disposition};
pub use commands::{register_store_commands, QueryCommand};
pub use message::{BridgeReply, BridgeRequest, Notification, ReplyOutcome};
pub use server::{BridgeServer, CommandHandler};

/// Rejected outcome of a bridge call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The handler ran and failed (or panicked).
    #[error("{0}")]
    Handler(String),

    /// The remote side replied with an error.
    #[error("{0}")]
    Remote(String),

    #[error("Bridge channel closed")]
    ChannelClosed,

    #[error("Call timed out after {0:?}")]
    TimedOut(Duration),
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
