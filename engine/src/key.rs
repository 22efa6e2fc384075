//! Operation keys.
//!
//! An [`OperationKey`] identifies a logical operation for both in-flight
//! deduplication and offline queue identity. It is the SHA-256 digest of the
//! method, the target and the canonical JSON body, so keys are fixed-length
//! and do not reveal payload contents.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::operation::Method;

/// Deterministic fingerprint of (method, target, body).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationKey(String);

impl OperationKey {
    /// Derive the key for a call.
    ///
    /// Object fields are hashed in sorted order, so bodies that differ only in
    /// field order produce the same key.
    pub fn derive(method: Method, target: &str, body: Option<&serde_json::Value>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(method.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(target.as_bytes());
        hasher.update(b"\n");
        if let Some(body) = body {
            let mut canonical = String::new();
            write_canonical(body, &mut canonical);
            hasher.update(canonical.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an already-computed key, e.g. one read back from storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Write `value` as compact JSON with object fields sorted by name.
fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut fields: Vec<_> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (name, field)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OperationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
