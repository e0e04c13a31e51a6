//! Canonical request hashing.
//!
//! Deduplication needs a hash that is stable under key reordering: the
//! request identity (name, data, priority) is rendered into a canonical
//! textual form and mixed with FNV-1a 64. Object keys are sorted
//! lexicographically at every level, array order is preserved, scalars
//! render by their lexical form, and keys starting with `_` are excluded so
//! callers can attach transient bookkeeping without changing identity.

use serde_json::Value;

use crate::types::Priority;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hash the identity of a request.
pub fn canonical_hash(name: &str, data: &Value, priority: Priority) -> u64 {
    let mut text = String::with_capacity(name.len() + 32);
    text.push_str(name);
    text.push('|');
    write_canonical(data, &mut text);
    text.push('|');
    text.push_str(priority.as_str());
    fnv1a64(text.as_bytes())
}

/// Canonical textual form of a JSON value. Exposed for tests and debugging.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().filter(|k| !k.starts_with('_')).collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('"');
                out.push_str(key);
                out.push_str("\":");
                if let Some(child) = map.get(*key) {
                    write_canonical(child, out);
                }
            }
            out.push('}');
        }
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_invariant_under_key_reordering() {
        let a = json!({"x": 1, "y": {"b": 2, "a": 3}});
        let b = json!({"y": {"a": 3, "b": 2}, "x": 1});
        assert_eq!(
            canonical_hash("Demo.ping-symphony", &a, Priority::Normal),
            canonical_hash("Demo.ping-symphony", &b, Priority::Normal)
        );
    }

    #[test]
    fn test_underscore_keys_excluded_from_identity() {
        let plain = json!({"x": 1});
        let tagged = json!({"x": 1, "_trace": "abc"});
        assert_eq!(
            canonical_hash("Demo.ping-symphony", &plain, Priority::Normal),
            canonical_hash("Demo.ping-symphony", &tagged, Priority::Normal)
        );
    }

    #[test]
    fn test_priority_changes_identity() {
        let data = json!({"x": 1});
        assert_ne!(
            canonical_hash("Demo.ping-symphony", &data, Priority::Normal),
            canonical_hash("Demo.ping-symphony", &data, Priority::High)
        );
    }

    #[test]
    fn test_array_order_preserved() {
        assert_ne!(
            canonical_string(&json!([1, 2, 3])),
            canonical_string(&json!([3, 2, 1]))
        );
    }

    #[test]
    fn test_canonical_string_sorts_nested_keys() {
        let value = json!({"b": {"d": 2, "c": 1}, "a": 0});
        assert_eq!(canonical_string(&value), r#"{"a":0,"b":{"c":1,"d":2}}"#);
    }
}
