//! Streaming aggregation of telemetry events.
//!
//! - **`event`**: decoded telemetry events and their type classification.
//! - **`merge`**: the merge algebra (last-non-null, deep merge).
//! - **`aggregate`**: the `Aggregate` trait and the per-request record.
//! - **`store`**: the request id to record mapping and change notifications.
//! - **`service`**: the single task that owns the store.

pub mod aggregate;
pub mod event;
pub mod merge;
pub mod service;
pub mod store;

pub use aggregate::*;
pub use event::*;
pub use service::{StoreHandle, StoreService, DEFAULT_COMMAND_CAPACITY};
pub use store::*;
