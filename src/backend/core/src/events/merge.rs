//! Merge algebra for aggregate records.
//!
//! Three rules cover every field of a record:
//!
//! - scalar summary fields: last non-null write wins,
//! - context maps: recursive deep merge (objects merged per key, arrays and
//!   scalars replaced by the incoming value),
//! - buckets: append-only, handled by the aggregate itself.

use serde_json::{Map, Value};

/// Overwrite `current` only when `incoming` carries a value.
pub fn merge_last_non_null<T>(current: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *current = incoming;
    }
}

/// Deep-merge `incoming` into `target`.
///
/// Objects on both sides are merged key by key. Any other pairing (arrays
/// included) is replaced wholesale by the incoming value.
pub fn deep_merge(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(target), Value::Object(incoming)) => deep_merge_map(target, incoming),
        (target, incoming) => *target = incoming,
    }
}

/// Deep-merge every key of `incoming` into `target`, keeping sibling keys.
pub fn deep_merge_map(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match target.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                target.insert(key, value);
            }
        }
    }
}
