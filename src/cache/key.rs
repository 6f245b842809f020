//! Deterministic cache keys.
//!
//! A key is `{namespace}{method}:{digest}` where the digest is the first
//! [`KEY_DIGEST_LEN`] hex characters of the SHA-256 of a canonical JSON form of
//! the call. Positional arguments keep their order; every object (keyword
//! arguments included, at any depth) is written with sorted keys.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Hex characters kept from the digest.
pub const KEY_DIGEST_LEN: usize = 16;

/// Rebuild `value` with every object's keys in sorted order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonical textual form of a call, before hashing.
pub fn canonical_call(method: &str, args: &[Value], kwargs: &Map<String, Value>) -> String {
    let mut call = Map::new();
    call.insert(
        "args".to_string(),
        Value::Array(args.iter().map(canonicalize).collect()),
    );
    call.insert(
        "kwargs".to_string(),
        canonicalize(&Value::Object(kwargs.clone())),
    );
    call.insert("method".to_string(), Value::String(method.to_string()));
    Value::Object(call).to_string()
}

/// Derive the cache key for `method` called with `args` and `kwargs`.
pub fn derive_key(
    namespace: &str,
    method: &str,
    args: &[Value],
    kwargs: &Map<String, Value>,
) -> String {
    let digest = Sha256::digest(canonical_call(method, args, kwargs).as_bytes());
    let hex = hex::encode(digest);
    format!("{namespace}{method}:{}", &hex[..KEY_DIGEST_LEN])
}
