use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

/// Canonical SHA-256 of a seed document, hex encoded.
///
/// Objects hash their keys in sorted order as `key:hash` pairs joined by `|`,
/// arrays hash the ordered list of their element hashes, scalars hash their
/// JSON literal. Key order and whitespace do not change the result; array
/// order and any value do.
pub fn checksum(value: &JsonValue) -> String {
    to_hex(&digest(value))
}

fn digest(value: &JsonValue) -> [u8; 32] {
    let mut hasher = Sha256::new();
    match value {
        JsonValue::Array(items) => {
            hasher.update(b"[");
            for item in items {
                hasher.update(to_hex(&digest(item)).as_bytes());
                hasher.update(b",");
            }
            hasher.update(b"]");
        }
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            hasher.update(b"{");
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    hasher.update(b"|");
                }
                hasher.update(key.as_bytes());
                hasher.update(b":");
                hasher.update(to_hex(&digest(&map[key])).as_bytes());
            }
            hasher.update(b"}");
        }
        // The JSON literal keeps `1` and `"1"` apart.
        scalar => hasher.update(scalar.to_string().as_bytes()),
    }
    hasher.finalize().into()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a: JsonValue = serde_json::from_str(r#"{"author": {"data": [{"name": "Ada", "age": 36}]}}"#).unwrap();
        let b: JsonValue = serde_json::from_str(
            r#"{
                "author": {
                    "data": [ { "age": 36, "name": "Ada" } ]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(checksum(&a), checksum(&b));
    }

    #[test]
    fn test_array_order_matters() {
        let a = json!({ "tag": { "data": [{ "label": "a" }, { "label": "b" }] } });
        let b = json!({ "tag": { "data": [{ "label": "b" }, { "label": "a" }] } });
        assert_ne!(checksum(&a), checksum(&b));
    }

    #[test]
    fn test_value_change_matters() {
        let a = json!({ "author": { "data": [{ "name": "Ada" }] } });
        let b = json!({ "author": { "data": [{ "name": "Grace" }] } });
        assert_ne!(checksum(&a), checksum(&b));
    }

    #[test]
    fn test_scalar_types_are_distinct() {
        assert_ne!(checksum(&json!({ "n": 1 })), checksum(&json!({ "n": "1" })));
        assert_ne!(checksum(&json!([])), checksum(&json!({})));
    }

    #[test]
    fn test_hex_shape() {
        let sum = checksum(&json!({}));
        assert_eq!(sum.len(), 64);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
