//! Canonical (hash-stable) JSON encoding.
//!
//! `serde_json`'s `Map` is backed by a `BTreeMap` as long as the
//! `preserve_order` feature is not enabled (it isn't, see Cargo.toml), so
//! routing a value through `serde_json::Value` before serializing it always
//! yields sorted object keys -- the same guarantee the original system got
//! from `json.dumps(obj, sort_keys=True, default=str)`.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Serializes `value` with object keys in sorted order.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let as_value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&as_value)?)
}

/// SHA-256 hex digest of a value's canonical JSON form.
pub fn content_hash<T: Serialize>(value: &T) -> Result<String> {
    let body = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys() {
        let v = json!({"b": 1, "a": 2});
        assert_eq!(canonical_json(&v).unwrap(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn hash_is_stable_under_key_reordering() {
        let v1 = json!({"b": 1, "a": 2});
        let v2 = json!({"a": 2, "b": 1});
        assert_eq!(content_hash(&v1).unwrap(), content_hash(&v2).unwrap());
    }
}
