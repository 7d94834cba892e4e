//! Dynamic values flowing between pipeline stages.

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::document::NodeRef;
use crate::pipeline::error::ActionError;

/// Maximum length (in characters) of [`Value::summary`].
const SUMMARY_LIMIT: usize = 80;

/// The working value of a pipeline.
///
/// Closed on purpose: actions match on the variant they need and report a
/// [`ActionError::Type`] otherwise.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No result. Produced when `|?` absorbs a recoverable error.
    #[default]
    Absent,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Bytes(Vec<u8>),
    /// Handle into a parsed HTML document.
    Node(NodeRef),
    List(Vec<Value>),
    /// Record with keys in insertion order.
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Variant name used in shape-mismatch messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Absent => "absent",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Node(_) => "node",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_string(self) -> Result<String, ActionError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(ActionError::type_mismatch("string", other.kind())),
        }
    }

    pub fn into_list(self) -> Result<Vec<Value>, ActionError> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(ActionError::type_mismatch("list", other.kind())),
        }
    }

    pub fn as_node(&self) -> Result<&NodeRef, ActionError> {
        match self {
            Value::Node(node) => Ok(node),
            other => Err(ActionError::type_mismatch("node", other.kind())),
        }
    }

    /// Build a number, falling back to a string for NaN and infinities.
    pub fn from_f64(n: f64) -> Value {
        if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
            return Value::Number((n as i64).into());
        }
        match serde_json::Number::from_f64(n) {
            Some(number) => Value::Number(number),
            None => Value::String(n.to_string()),
        }
    }

    /// Convert into plain JSON. Nodes become their markup.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Absent => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(bytes) => {
                serde_json::Value::Array(bytes.iter().map(|b| (*b).into()).collect())
            }
            Value::Node(node) => serde_json::Value::String(node.outer_html()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Bounded one-line preview for traces and error messages.
    pub fn summary(&self) -> String {
        let full = match self {
            Value::Absent => "absent".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => format!("{s:?}"),
            Value::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
            Value::Node(node) => node.describe(),
            Value::List(items) => format!("list of {}", items.len()),
            Value::Map(map) => {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                format!("record {{{}}}", keys.join(", "))
            }
        };
        truncate(full, SUMMARY_LIMIT)
    }
}

fn truncate(mut text: String, limit: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(limit) {
        text.truncate(idx);
        text.push('…');
    }
    text
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Absent,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Absent => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(bytes) => {
                let mut seq = serializer.serialize_seq(Some(bytes.len()))?;
                for b in bytes {
                    seq.serialize_element(b)?;
                }
                seq.end()
            }
            Value::Node(node) => serializer.serialize_str(&node.outer_html()),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_preserves_key_order() {
        let value = Value::from(json!({"zeta": 1, "alpha": [true, null], "mid": "x"}));
        let Value::Map(map) = &value else {
            panic!("expected map, got {}", value.kind());
        };
        let keys: Vec<&String> = map.keys().collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
        assert_eq!(
            map["alpha"],
            Value::List(vec![Value::Bool(true), Value::Absent])
        );
    }

    #[test]
    fn test_serialize_matches_to_json() {
        let value = Value::List(vec![
            Value::from("a"),
            Value::Bytes(vec![104, 105]),
            Value::Absent,
            Value::from_f64(2.0),
        ]);
        let serialized = serde_json::to_value(&value).unwrap();
        assert_eq!(serialized, value.to_json());
        assert_eq!(serialized, json!(["a", [104, 105], null, 2]));
    }

    #[test]
    fn test_from_f64_handles_fractions_and_nan() {
        assert_eq!(Value::from_f64(3.0), Value::Number(3.into()));
        assert_eq!(Value::from_f64(0.5).to_json(), json!(0.5));
        assert_eq!(Value::from_f64(f64::NAN), Value::String("NaN".into()));
    }

    #[test]
    fn test_type_accessors_report_kind() {
        let err = Value::from("text").into_list().unwrap_err();
        assert_eq!(err.to_string(), "expected list, got string");
        assert!(!err.is_recoverable());
        assert!(Value::List(vec![]).into_string().is_err());
        assert!(Value::Absent.as_node().is_err());
    }

    #[test]
    fn test_summary_is_bounded() {
        let long = Value::String("x".repeat(500));
        let summary = long.summary();
        assert_eq!(summary.chars().count(), SUMMARY_LIMIT + 1);
        assert!(summary.ends_with('…'));

        let record = Value::from(json!({"title": "a", "url": "b"}));
        assert_eq!(record.summary(), "record {title, url}");
    }
}
