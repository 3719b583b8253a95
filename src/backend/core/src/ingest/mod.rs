//! Event ingestion over TCP.

pub mod decoder;
pub mod listener;

pub use decoder::EventDecoder;
pub use listener::IngestListener;
