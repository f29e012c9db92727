//! Structurally typed values for inspector tooling.
//!
//! Cached payloads cross into the inspector through serde: any `Serialize`
//! value becomes a [`DebugValue`], and an edited `DebugValue` converts back
//! into JSON for deserialization into the store's resource type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Largest magnitude at which every integer is exactly representable as f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A JSON-shaped value the inspector can display and edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum DebugValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<DebugValue>),
    Map(BTreeMap<String, DebugValue>),
}

impl DebugValue {
    /// Capture any serializable value. Values that fail to serialize are
    /// reported as a string describing the failure.
    pub fn capture<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => Self::from(json),
            Err(err) => Self::String(format!("<unserializable: {}>", err)),
        }
    }

    /// Convert back into JSON. Non-finite numbers become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            DebugValue::Null => Value::Null,
            DebugValue::Bool(b) => Value::Bool(*b),
            // Integral values go back out as integers so integer fields decode.
            DebugValue::Number(n) if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER => {
                Value::from(*n as i64)
            }
            DebugValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            DebugValue::String(s) => Value::String(s.clone()),
            DebugValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            DebugValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DebugValue::Null)
    }

    /// Look up a key when this value is a map.
    pub fn get(&self, key: &str) -> Option<&DebugValue> {
        match self {
            DebugValue::Map(map) => map.get(key),
            _ => None,
        }
    }
}

impl From<Value> for DebugValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => DebugValue::Null,
            Value::Bool(b) => DebugValue::Bool(b),
            // Integers beyond 2^53 lose precision.
            Value::Number(n) => n.as_f64().map(DebugValue::Number).unwrap_or(DebugValue::Null),
            Value::String(s) => DebugValue::String(s),
            Value::Array(items) => DebugValue::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                DebugValue::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}
