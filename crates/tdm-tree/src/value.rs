//! Values carried by tree nodes.

#![allow(missing_docs)]

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Display value of a node.
///
/// Capability nodes decide which shapes they accept and how they render;
/// `Display` here is the plain rendering used for device rows and
/// placeholder nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(SmolStr),
    Fields(IndexMap<SmolStr, NodeValue>),
}

impl NodeValue {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.is_empty(),
            Self::Fields(fields) => fields.is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Numeric view; numeric text is accepted since transports often quote numbers.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
            Self::Fields(fields) => {
                for (idx, (key, value)) in fields.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}={value}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for NodeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for NodeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for NodeValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for NodeValue {
    fn from(value: &str) -> Self {
        Self::Text(SmolStr::new(value))
    }
}

impl From<String> for NodeValue {
    fn from(value: String) -> Self {
        Self::Text(SmolStr::new(value))
    }
}

impl From<SmolStr> for NodeValue {
    fn from(value: SmolStr) -> Self {
        Self::Text(value)
    }
}

impl From<serde_json::Value> for NodeValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Empty,
            serde_json::Value::Bool(value) => Self::Bool(value),
            serde_json::Value::Number(number) => number
                .as_f64()
                .map_or_else(|| Self::Text(SmolStr::new(number.to_string())), Self::Number),
            serde_json::Value::String(text) => Self::Text(SmolStr::new(text)),
            serde_json::Value::Array(items) => Self::Fields(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(idx, item)| (SmolStr::new((idx + 1).to_string()), Self::from(item)))
                    .collect(),
            ),
            serde_json::Value::Object(map) => Self::Fields(
                map.into_iter()
                    .map(|(key, item)| (SmolStr::new(key), Self::from(item)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_render_in_insertion_order() {
        let value = NodeValue::from(serde_json::json!({
            "Total": 30.5,
            "Today": 1.25,
            "Unit": "kWh",
        }));
        assert_eq!(value.to_string(), "Total=30.5, Today=1.25, Unit=kWh");
    }

    #[test]
    fn numeric_text_reads_as_number() {
        assert_eq!(NodeValue::from(" 21.5 ").as_number(), Some(21.5));
        assert_eq!(NodeValue::from("warm").as_number(), None);
        assert_eq!(NodeValue::Bool(true).as_number(), None);
    }

    #[test]
    fn json_null_and_arrays_map_to_node_values() {
        assert_eq!(NodeValue::from(serde_json::Value::Null), NodeValue::Empty);
        let array = NodeValue::from(serde_json::json!(["ON", "OFF"]));
        assert_eq!(array.to_string(), "1=ON, 2=OFF");
    }

    #[test]
    fn empty_detection() {
        assert!(NodeValue::Empty.is_empty());
        assert!(NodeValue::from("").is_empty());
        assert!(!NodeValue::Number(0.0).is_empty());
    }
}
