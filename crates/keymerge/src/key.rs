//! Key encoding: derive a comparable identity string from a record.
//!
//! The identity is built from the record's *own* field order, filtered by
//! membership in the key specification, not from the key specification's
//! declared order. Two records whose key fields were inserted in different
//! orders therefore encode differently.

use serde_json::Value;

use crate::error::MergeResult;
use crate::record::{KeySpec, Record};

/// Separator placed between encoded key values.
pub const KEY_SEPARATOR: &str = ",";

/// Encode the key fields of `record` into its identity string.
///
/// Key fields missing from the record are skipped.
pub fn encode(record: &Record, keys: &KeySpec) -> MergeResult<String> {
    let mut parts = Vec::with_capacity(keys.len());
    for (field, value) in record {
        if keys.contains(field) {
            parts.push(encode_value(value)?);
        }
    }
    Ok(parts.join(KEY_SEPARATOR))
}

/// Canonical compact JSON encoding of a single value.
pub fn encode_value(value: &Value) -> MergeResult<String> {
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn encodes_single_key() {
        let keys = KeySpec::new(["key"]).unwrap();
        let encoded = encode(&record(json!({"key": 2, "score": 5})), &keys).unwrap();
        assert_eq!(encoded, "2");
    }

    #[test]
    fn encodes_composite_key_with_json_values() {
        let keys = KeySpec::new(["region", "id", "tags"]).unwrap();
        let r = record(json!({"region": "eu", "id": 7, "tags": ["a", null], "score": 1}));
        assert_eq!(encode(&r, &keys).unwrap(), r#""eu",7,["a",null]"#);
    }

    #[test]
    fn string_and_number_keys_do_not_collide() {
        let keys = KeySpec::new(["key"]).unwrap();
        let number = encode(&record(json!({"key": 1})), &keys).unwrap();
        let string = encode(&record(json!({"key": "1"})), &keys).unwrap();
        assert_ne!(number, string);
    }

    #[test]
    fn follows_record_field_order_not_key_order() {
        let keys = KeySpec::new(["a", "b"]).unwrap();
        let ab = encode(&record(json!({"a": 1, "b": 2})), &keys).unwrap();
        let ba = encode(&record(json!({"b": 2, "a": 1})), &keys).unwrap();
        assert_eq!(ab, "1,2");
        assert_eq!(ba, "2,1");
        assert_ne!(ab, ba);
    }

    #[test]
    fn missing_key_fields_are_skipped() {
        let keys = KeySpec::new(["key", "region"]).unwrap();
        assert_eq!(encode(&record(json!({"key": 3})), &keys).unwrap(), "3");
        assert_eq!(encode(&record(json!({"score": 3})), &keys).unwrap(), "");
    }

    #[test]
    fn null_is_a_distinct_key_value() {
        let keys = KeySpec::new(["key"]).unwrap();
        assert_eq!(encode(&record(json!({"key": null})), &keys).unwrap(), "null");
    }
}
