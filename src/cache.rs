//! Content cache keyed by semantic fingerprint.
//!
//! The fingerprint is a blake3 digest of the task kind plus a normalized
//! rendering of the semantically significant inputs, so trivially
//! different but equivalent requests (case, whitespace, key order) still
//! hit. Expired entries are treated as absent and pruned on access; there
//! is no background eviction.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    created_at: DateTime<Utc>,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.num_milliseconds() >= self.ttl.as_millis() as i64
    }
}

pub struct ContentCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl ContentCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Look up a fingerprint. Absence is not an error. An expired entry is
    /// removed and reported absent.
    pub fn get(&self, fingerprint: &str) -> Option<Value> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        match entries.get(fingerprint) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(fingerprint);
                None
            }
            Some(entry) => Some(entry.payload.clone()),
            None => None,
        }
    }

    pub fn put(&self, fingerprint: String, payload: Value) {
        self.put_with_ttl(fingerprint, payload, self.default_ttl);
    }

    pub fn put_with_ttl(&self, fingerprint: String, payload: Value, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            fingerprint,
            CacheEntry {
                payload,
                created_at: Utc::now(),
                ttl,
            },
        );
    }
}

/// Fingerprint for a task's inputs: blake3 over the kind label and a
/// normalized form of the inputs.
pub fn fingerprint(kind_label: &str, inputs: &Value) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(kind_label.as_bytes());
    hasher.update(b"\x00");
    hasher.update(normalize(inputs).as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Render a JSON value deterministically: strings lowercased with
/// whitespace collapsed, object keys in sorted order (serde_json maps are
/// already ordered), arrays kept in place.
fn normalize(value: &Value) -> String {
    fn fold(value: &Value, out: &mut String) {
        match value {
            Value::String(s) => {
                out.push('"');
                let mut last_was_space = false;
                for c in s.trim().chars() {
                    if c.is_whitespace() {
                        if !last_was_space {
                            out.push(' ');
                        }
                        last_was_space = true;
                    } else {
                        for lc in c.to_lowercase() {
                            out.push(lc);
                        }
                        last_was_space = false;
                    }
                }
                out.push('"');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    fold(item, out);
                }
                out.push(']');
            }
            Value::Object(map) => {
                out.push('{');
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push('"');
                    out.push_str(k);
                    out.push_str("\":");
                    fold(v, out);
                }
                out.push('}');
            }
            other => out.push_str(&other.to_string()),
        }
    }

    let mut out = String::new();
    fold(value, &mut out);
    out
}
