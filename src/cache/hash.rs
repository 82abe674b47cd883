//! Content hashing utilities for cache keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Version tag mixed into every fingerprint. Bump this when the encoding of
/// entities or descriptions changes so stale keys never collide.
pub const FINGERPRINT_VERSION: u32 = 1;

/// Content-addressed key of an entity or description.
///
/// A 64-character lowercase hexadecimal SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash a structural encoding together with [`FINGERPRINT_VERSION`].
    pub fn of(encoding: Value) -> Self {
        Fingerprint(compute_hash(&Value::Array(vec![
            Value::from(FINGERPRINT_VERSION),
            encoding,
        ])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute SHA256 hash of a JSON value.
///
/// The value is rendered as compact JSON before hashing, so equal values
/// always give the same digest. Returns a 64-character lowercase
/// hexadecimal string.
pub fn compute_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compute_hash_deterministic() {
        let value = json!(["Person", 14, "", ""]);
        let hash1 = compute_hash(&value);
        let hash2 = compute_hash(&value);
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA256 hex = 64 chars
    }

    #[test]
    fn test_compute_hash_different_values() {
        let v1 = json!(["Person", 14, "", ""]);
        let v2 = json!(["Person", 0, "", ""]);
        assert_ne!(compute_hash(&v1), compute_hash(&v2));
    }

    #[test]
    fn test_fingerprint_is_versioned() {
        let encoding = json!(["Person", 14, "", ""]);
        let fp = Fingerprint::of(encoding.clone());
        assert_ne!(fp.as_str(), compute_hash(&encoding));
        assert_eq!(fp, Fingerprint::of(encoding));
    }
}
