use std::fmt::Write as _;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serializes a JSON value with object keys sorted lexicographically at every
/// nesting level.
///
/// The output is byte-stable for structurally equal values regardless of the
/// key order they were built with, which makes it suitable as hashing input
/// for idempotency fingerprints.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut output = String::new();
    write_canonical(value, &mut output);
    output
}

/// Returns the lowercase hex SHA-256 digest of the canonical serialization.
#[must_use]
pub fn payload_hash(value: &Value) -> String {
    let digest = Sha256::digest(canonical_json(value).as_bytes());
    let mut encoded = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(encoded, "{byte:02x}");
    }

    encoded
}

fn write_canonical(value: &Value, output: &mut String) {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            output.push_str(
                serde_json::to_string(value)
                    .unwrap_or_else(|_| "null".to_owned())
                    .as_str(),
            );
        }
        Value::Array(items) => {
            output.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    output.push(',');
                }
                write_canonical(item, output);
            }
            output.push(']');
        }
        Value::Object(entries) => {
            let mut keys: Vec<&String> = entries.keys().collect();
            keys.sort();

            output.push('{');
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    output.push(',');
                }
                output.push_str(
                    serde_json::to_string(key)
                        .unwrap_or_else(|_| "\"\"".to_owned())
                        .as_str(),
                );
                output.push(':');
                if let Some(entry) = entries.get(key.as_str()) {
                    write_canonical(entry, output);
                }
            }
            output.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::{Strategy, any, prop, proptest};
    use serde_json::{Value, json};

    use super::{canonical_json, payload_hash};

    #[test]
    fn canonical_json_sorts_keys_at_every_level() {
        let value = json!({
            "zeta": {"b": 1, "a": 2},
            "alpha": [{"y": true, "x": false}],
        });

        assert_eq!(
            canonical_json(&value),
            r#"{"alpha":[{"x":false,"y":true}],"zeta":{"a":2,"b":1}}"#
        );
    }

    #[test]
    fn payload_hash_ignores_key_order() {
        let left = json!({"to": "ops@example.test", "body": "hi", "meta": {"b": 1, "a": 2}});
        let right = json!({"meta": {"a": 2, "b": 1}, "body": "hi", "to": "ops@example.test"});

        assert_eq!(payload_hash(&left), payload_hash(&right));
    }

    #[test]
    fn payload_hash_is_lowercase_hex_sha256() {
        let hash = payload_hash(&json!({}));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_eq!(
            hash,
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    fn arbitrary_value() -> impl Strategy<Value = Value> {
        let leaf = prop::strategy::Union::new(vec![
            any::<bool>().prop_map(Value::Bool).boxed(),
            any::<i64>().prop_map(|number| json!(number)).boxed(),
            ".{0,12}".prop_map(Value::String).boxed(),
        ]);

        leaf.prop_recursive(3, 24, 4, |inner| {
            prop::collection::btree_map(".{0,8}", inner, 0..4)
                .prop_map(|entries| json!(entries))
                .boxed()
        })
    }

    proptest! {
        #[test]
        fn payload_hash_is_stable_under_reserialization(value in arbitrary_value()) {
            let reparsed: Value = serde_json::from_str(canonical_json(&value).as_str())
                .unwrap_or(Value::Null);
            assert_eq!(payload_hash(&value), payload_hash(&reparsed));
        }
    }
}
