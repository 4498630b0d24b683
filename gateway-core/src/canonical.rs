//! Canonical JSON and stable cache-key derivation (spec §4.6, §8 items 5/11).
//!
//! Canonical JSON sorts object keys lexicographically and uses no
//! insignificant whitespace, so `canonicalJson(X) = canonicalJson(X')` iff
//! `X` and `X'` are the same value up to key order.

use md5::{Digest, Md5};
use serde::Serialize;
use serde_json::Value;

/// Recursively sort all object keys, producing a value whose `to_string()`
/// is the canonical JSON representation (`serde_json` preserves insertion
/// order for `Map`, so sorting before serializing is sufficient).
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonical JSON string for any serializable input.
pub fn canonical_json<T: Serialize>(value: &T) -> String {
    let raw = serde_json::to_value(value).expect("value must serialize");
    canonicalize(&raw).to_string()
}

/// `<namespace>:<hex(md5(canonicalJson(X)))>` (spec §4.6).
pub fn cache_key<T: Serialize>(namespace: &str, value: &T) -> crate::model::CacheKey {
    let canonical = canonical_json(value);
    let digest = Md5::digest(canonical.as_bytes());
    crate::model::CacheKey(format!("{namespace}:{}", hex::encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_canonical_json() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn nested_objects_are_canonicalized_recursively() {
        let a = json!({"outer": {"z": 1, "y": 2}});
        let b = json!({"outer": {"y": 2, "z": 1}});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn different_values_produce_different_keys() {
        let a = cache_key("search", &json!({"q": "acme"}));
        let b = cache_key("search", &json!({"q": "acme corp"}));
        assert_ne!(a, b);
    }

    #[test]
    fn same_value_produces_same_key_regardless_of_order() {
        let a = cache_key("search", &json!({"q": "acme", "page": 1}));
        let b = cache_key("search", &json!({"page": 1, "q": "acme"}));
        assert_eq!(a, b);
    }

    proptest::proptest! {
        #[test]
        fn canonical_json_is_order_insensitive(a in 0i64..1000, b in 0i64..1000) {
            let x = json!({"a": a, "b": b});
            let y = json!({"b": b, "a": a});
            proptest::prop_assert_eq!(canonical_json(&x), canonical_json(&y));
        }
    }
}
