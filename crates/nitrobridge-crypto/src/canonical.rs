//! Canonical JSON
//!
//! Signed payloads are serialized with object keys sorted at every depth
//! and no insignificant whitespace, so signer and verifier hash the same
//! bytes regardless of field order.

use serde::Serialize;
use serde_json::Value;

use crate::{CryptoError, CryptoResult};

/// Serialize a value to canonical JSON
pub fn canonical_json<T: Serialize>(value: &T) -> CryptoResult<String> {
    let value = serde_json::to_value(value).map_err(|e| CryptoError::Serialization(e.to_string()))?;
    let mut out = String::new();
    write_canonical(&value, &mut out)?;
    Ok(out)
}

// serde_json::Map keeps insertion order only with `preserve_order`; write keys explicitly.
fn write_canonical(value: &Value, out: &mut String) -> CryptoResult<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).map_err(|e| CryptoError::Serialization(e.to_string()))?);
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_canonical(v, out)?;
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => {
            out.push_str(&serde_json::to_string(scalar).map_err(|e| CryptoError::Serialization(e.to_string()))?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_at_every_depth() {
        let v = json!({"b": 1, "a": {"z": true, "m": [ {"y": 1, "x": 2} ]}});
        assert_eq!(
            canonical_json(&v).unwrap(),
            r#"{"a":{"m":[{"x":2,"y":1}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_array_order_preserved() {
        let v = json!([3, "two", 1]);
        assert_eq!(canonical_json(&v).unwrap(), r#"[3,"two",1]"#);
    }
}
