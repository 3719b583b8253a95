//! # Reqlens Core
//!
//! Streaming per-request telemetry aggregation with a correlated query bridge.
//!
//! ## Architecture
//!
//! - **Ingest**: TCP listener and incremental JSON decoder for producer events
//! - **Events**: merge algebra, per-request aggregate records, and the store task
//! - **Query**: read-only projections (summaries, sub-collections, not-found lookups)
//! - **Bridge**: correlated request/response RPC over message-only channels
//! - **API**: HTTP and WebSocket surface for display clients
//! - **Telemetry**: structured logging and Prometheus metrics

pub mod api;
pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod ingest;
pub mod query;
pub mod telemetry;

pub use error::{ErrorCode, ErrorSeverity, ReqlensError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bridge::{
        BridgeClient, BridgeError, BridgeReply, BridgeRequest, BridgeServer, CommandHandler,
        Notification, QueryCommand,
    };
    pub use crate::error::{ErrorCode, ReqlensError, Result};
    pub use crate::events::{
        AggregateRecord, AggregationStore, ChangeNotification, EventKind, MergeOutcome, StoreHandle,
        StoreService, TelemetryEvent,
    };
    pub use crate::query::{Lookup, RecordQuery, RecordSummary};
}
