//! Attribute model shared by spans, metrics, and resources.
//!
//! Attribute values form a closed tagged union mirroring the OTLP `AnyValue`
//! wire union. Arbitrary dynamically-typed input (anything representable as a
//! [`serde_json::Value`]) maps onto exactly one tag via [`AttributeValue::from_json`];
//! the mapping is total and deterministic so encoding a value can never fail
//! and never depends on call order.

use serde::{Deserialize, Serialize};

/// A single attribute value.
///
/// Exactly one variant per OTLP `AnyValue` tag. Byte payloads are kept raw
/// here; base64 rendering happens at the wire boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// UTF-8 string value.
    Str(String),
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer value.
    Int(i64),
    /// 64-bit float value.
    Double(f64),
    /// Raw byte payload.
    Bytes(Vec<u8>),
    /// Homogeneous or heterogeneous list of values.
    Array(Vec<AttributeValue>),
    /// Nested key/value list (object-shaped input).
    KvList(Vec<KeyValue>),
}

/// A keyed attribute entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AttributeValue,
}

impl KeyValue {
    /// Creates a new key/value pair.
    pub fn new(key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl AttributeValue {
    /// Maps an arbitrary JSON value onto exactly one tag.
    ///
    /// Total: every input shape produces a value. Deterministic: the same
    /// input always yields the same tag.
    ///
    /// - `null` becomes the empty string (absent values still round-trip)
    /// - integer-valued numbers become [`AttributeValue::Int`], all other
    ///   numbers [`AttributeValue::Double`]
    /// - arrays and objects recurse, preserving member order
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Str(String::new()),
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Double(f)
                } else {
                    // Fallback stringification for exotic numbers
                    Self::Str(n.to_string())
                }
            }
            Value::String(s) => Self::Str(s.clone()),
            Value::Array(items) => Self::Array(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::KvList(
                map.iter()
                    .map(|(key, val)| KeyValue {
                        key: key.clone(),
                        value: Self::from_json(val),
                    })
                    .collect(),
            ),
        }
    }

    /// Writes a canonical textual form of this value.
    ///
    /// Used to build content-identity keys (resource grouping, metric
    /// attribute sets). Stable across runs and independent of how the value
    /// was constructed.
    pub(crate) fn write_canonical(&self, out: &mut String) {
        use std::fmt::Write as _;

        match self {
            Self::Str(s) => {
                let _ = write!(out, "{s:?}");
            }
            Self::Bool(b) => {
                let _ = write!(out, "{b}");
            }
            Self::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Self::Double(d) => {
                let _ = write!(out, "{d}");
            }
            Self::Bytes(bytes) => {
                let _ = write!(out, "b:");
                for byte in bytes {
                    let _ = write!(out, "{byte:02x}");
                }
            }
            Self::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_canonical(out);
                }
                out.push(']');
            }
            Self::KvList(entries) => {
                out.push('{');
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{}=", entry.key);
                    entry.value.write_canonical(out);
                }
                out.push('}');
            }
        }
    }
}

/// Inserts or overwrites an attribute in an ordered attribute list.
///
/// Keys stay unique; a repeated key keeps its original position and takes the
/// new value (last write wins).
pub fn set_attribute(attributes: &mut Vec<KeyValue>, key: impl Into<String>, value: AttributeValue) {
    let key = key.into();
    if let Some(existing) = attributes.iter_mut().find(|kv| kv.key == key) {
        existing.value = value;
    } else {
        attributes.push(KeyValue { key, value });
    }
}

/// Canonical string for a whole attribute set: sorted `key:value` entries
/// joined with `|`. Two sets with the same content produce the same string
/// regardless of insertion order.
pub fn canonical_attributes(attributes: &[KeyValue]) -> String {
    let mut entries: Vec<String> = attributes
        .iter()
        .map(|kv| {
            let mut s = String::new();
            s.push_str(&kv.key);
            s.push(':');
            kv.value.write_canonical(&mut s);
            s
        })
        .collect();
    entries.sort_unstable();
    entries.join("|")
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u64> for AttributeValue {
    /// Saturates at `i64::MAX`; the wire integer type is signed.
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&[u8]> for AttributeValue {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(v: Vec<String>) -> Self {
        Self::Array(v.into_iter().map(AttributeValue::Str).collect())
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(v: Vec<&str>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<i64>> for AttributeValue {
    fn from(v: Vec<i64>) -> Self {
        Self::Array(v.into_iter().map(AttributeValue::Int).collect())
    }
}

impl From<Vec<f64>> for AttributeValue {
    fn from(v: Vec<f64>) -> Self {
        Self::Array(v.into_iter().map(AttributeValue::Double).collect())
    }
}

impl From<Vec<bool>> for AttributeValue {
    fn from(v: Vec<bool>) -> Self {
        Self::Array(v.into_iter().map(AttributeValue::Bool).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_maps_every_shape_to_one_tag() {
        let cases = [
            (json!(null), AttributeValue::Str(String::new())),
            (json!(true), AttributeValue::Bool(true)),
            (json!(42), AttributeValue::Int(42)),
            (json!(-7), AttributeValue::Int(-7)),
            (json!(2.5), AttributeValue::Double(2.5)),
            (json!("hello"), AttributeValue::Str("hello".to_string())),
        ];

        for (input, expected) in cases {
            assert_eq!(AttributeValue::from_json(&input), expected);
        }
    }

    #[test]
    fn test_from_json_recurses_into_arrays_and_objects() {
        let value = AttributeValue::from_json(&json!({
            "name": "checkout",
            "retries": 3,
            "flags": [true, false],
        }));

        let AttributeValue::KvList(entries) = value else {
            panic!("object input must map to KvList");
        };
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].key, "flags");
        assert!(matches!(entries[0].value, AttributeValue::Array(_)));
        assert_eq!(entries[1].value, AttributeValue::Str("checkout".into()));
        assert_eq!(entries[2].value, AttributeValue::Int(3));
    }

    #[test]
    fn test_from_json_is_deterministic() {
        let input = json!({"a": [1, 2.5, "x"], "b": null});
        assert_eq!(
            AttributeValue::from_json(&input),
            AttributeValue::from_json(&input)
        );
    }

    #[test]
    fn test_set_attribute_last_write_wins_keeps_position() {
        let mut attrs = Vec::new();
        set_attribute(&mut attrs, "first", AttributeValue::Int(1));
        set_attribute(&mut attrs, "second", AttributeValue::Int(2));
        set_attribute(&mut attrs, "first", AttributeValue::Int(10));

        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].key, "first");
        assert_eq!(attrs[0].value, AttributeValue::Int(10));
        assert_eq!(attrs[1].key, "second");
    }

    #[test]
    fn test_canonical_attributes_order_independent() {
        let a = vec![
            KeyValue::new("x", 1i64),
            KeyValue::new("y", "two"),
        ];
        let b = vec![
            KeyValue::new("y", "two"),
            KeyValue::new("x", 1i64),
        ];
        assert_eq!(canonical_attributes(&a), canonical_attributes(&b));
    }

    #[test]
    fn test_canonical_attributes_distinguishes_values() {
        let a = vec![KeyValue::new("x", 1i64)];
        let b = vec![KeyValue::new("x", "1")];
        assert_ne!(canonical_attributes(&a), canonical_attributes(&b));
    }

    #[test]
    fn test_u64_conversion_saturates() {
        assert_eq!(
            AttributeValue::from(u64::MAX),
            AttributeValue::Int(i64::MAX)
        );
        assert_eq!(AttributeValue::from(5u64), AttributeValue::Int(5));
    }
}
