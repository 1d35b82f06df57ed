//! Content fingerprint used for deduplication
//!
//! SHA-256 over a key-sorted compact JSON serialization, hex encoded.
//! Never shown to users.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::AnalysisPayload;

/// Fingerprint an arbitrary payload. `None` when there is nothing to key on
/// (null or an empty container/string).
pub fn fingerprint(payload: Option<&Value>) -> Option<String> {
    let payload = payload?;
    if is_empty(payload) {
        return None;
    }

    let canonical = canonical_json(payload);
    let digest = Sha256::digest(canonical.as_bytes());
    Some(hex::encode(digest))
}

pub fn fingerprint_payload(payload: &AnalysisPayload) -> Option<String> {
    fingerprint(Some(&payload.to_value()))
}

/// Compact JSON with object keys sorted at every level
pub fn canonical_json(value: &Value) -> String {
    sort_keys(value).to_string()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_keys(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
