//! Incremental decoder for the ingestion byte stream.
//!
//! A connection carries JSON payloads back to back, each either one event
//! object or an array of them. Reads can split a payload anywhere, so bytes
//! are buffered until a complete value parses.

use metrics::counter;
use serde_json::{Deserializer, Value};
use tracing::{trace, warn};

/// Splits a byte stream into event values.
#[derive(Debug)]
pub struct EventDecoder {
    buffer: Vec<u8>,
    max_buffered: usize,
    failures: u64,
}

impl EventDecoder {
    /// `max_buffered` bounds an incomplete payload; past it the buffer is dropped.
    pub fn new(max_buffered: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_buffered,
            failures: 0,
        }
    }

    /// Feed bytes; returns every event value completed by them, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        let mut consumed = 0;
        let mut malformed = None;

        {
            let mut stream = Deserializer::from_slice(&self.buffer).into_iter::<Value>();
            loop {
                match stream.next() {
                    Some(Ok(value)) => {
                        consumed = stream.byte_offset();
                        flatten_into(value, &mut events);
                    }
                    Some(Err(e)) if e.is_eof() => break,
                    Some(Err(e)) => {
                        malformed = Some(e);
                        break;
                    }
                    None => {
                        consumed = self.buffer.len();
                        break;
                    }
                }
            }
        }

        match malformed {
            Some(e) => {
                // No way to find the next payload boundary; drop what is left.
                self.record_failure(&format!("malformed payload: {}", e));
                self.buffer.clear();
            }
            None => {
                self.buffer.drain(..consumed);
                if self.buffer.len() > self.max_buffered {
                    self.record_failure("incomplete payload exceeds buffer limit");
                    self.buffer.clear();
                }
            }
        }

        trace!(decoded = events.len(), buffered = self.buffer.len(), "Decoder pass");
        events
    }

    /// Call at end of stream. Leftover non-whitespace bytes count as a failure.
    pub fn finish(&mut self) {
        if self.buffer.iter().any(|b| !b.is_ascii_whitespace()) {
            self.record_failure("connection closed mid-payload");
        }
        self.buffer.clear();
    }

    /// Bytes held while waiting for the rest of a payload.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Payloads dropped so far.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    fn record_failure(&mut self, reason: &str) {
        self.failures += 1;
        counter!("reqlens_decode_failures_total").increment(1);
        warn!(reason = %reason, dropped_bytes = self.buffer.len(), "Dropping undecodable payload");
    }
}

fn flatten_into(value: Value, events: &mut Vec<Value>) {
    match value {
        Value::Array(items) => events.extend(items),
        other => events.push(other),
    }
}
