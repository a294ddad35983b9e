//! Capability nodes: the per-field children of a device.

#![allow(missing_docs)]

use std::fmt;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::value::NodeValue;

mod registry;
pub use registry::{CapabilityFactory, CapabilityRegistry, CapabilityTemplate};

/// Closed set of capability shapes a device can announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    /// Numeric reading with an optional unit.
    Sensor,
    /// Free-form status text.
    Status,
    /// ON/OFF control.
    Toggle,
    /// Group of named sub-values rendered on one row.
    Composite,
}

impl CapabilityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::Status => "status",
            Self::Toggle => "toggle",
            Self::Composite => "composite",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour of a capability child node.
///
/// Implementations own the value shape they accept and how it renders; the
/// tree never branches on the concrete capability type.
pub trait CapabilityNode: fmt::Debug {
    fn kind(&self) -> CapabilityKind;

    /// Raw value for editing.
    fn value(&self) -> NodeValue;

    /// Formatted value for display.
    fn display(&self) -> SmolStr;

    /// Apply a new value. A rejected value is handed back unchanged.
    fn set_value(&mut self, value: NodeValue) -> Result<(), NodeValue>;

    /// Decoration tag, if any.
    fn type_info(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct SensorNode {
    unit: Option<SmolStr>,
    reading: Option<f64>,
}

impl SensorNode {
    #[must_use]
    pub fn new(unit: Option<SmolStr>) -> Self {
        Self {
            unit,
            reading: None,
        }
    }
}

impl CapabilityNode for SensorNode {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Sensor
    }

    fn value(&self) -> NodeValue {
        self.reading.map_or(NodeValue::Empty, NodeValue::Number)
    }

    fn display(&self) -> SmolStr {
        match (self.reading, self.unit.as_deref()) {
            (None, _) => SmolStr::default(),
            (Some(reading), Some(unit)) if !unit.is_empty() => {
                SmolStr::new(format!("{reading} {unit}"))
            }
            (Some(reading), _) => SmolStr::new(reading.to_string()),
        }
    }

    fn set_value(&mut self, value: NodeValue) -> Result<(), NodeValue> {
        if matches!(value, NodeValue::Empty) {
            self.reading = None;
            return Ok(());
        }
        match value.as_number() {
            Some(reading) => {
                self.reading = Some(reading);
                Ok(())
            }
            None => Err(value),
        }
    }

    fn type_info(&self) -> Option<&str> {
        Some("sensor")
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusNode {
    text: NodeValue,
}

impl CapabilityNode for StatusNode {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Status
    }

    fn value(&self) -> NodeValue {
        self.text.clone()
    }

    fn display(&self) -> SmolStr {
        SmolStr::new(self.text.to_string())
    }

    fn set_value(&mut self, value: NodeValue) -> Result<(), NodeValue> {
        self.text = value;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToggleNode {
    state: Option<bool>,
}

impl ToggleNode {
    fn parse(&self, value: &NodeValue) -> Option<Option<bool>> {
        match value {
            NodeValue::Empty => Some(None),
            NodeValue::Bool(state) => Some(Some(*state)),
            NodeValue::Number(number) if *number == 0.0 => Some(Some(false)),
            NodeValue::Number(number) if *number == 1.0 => Some(Some(true)),
            NodeValue::Text(text) => match text.trim().to_ascii_uppercase().as_str() {
                "ON" | "1" | "TRUE" => Some(Some(true)),
                "OFF" | "0" | "FALSE" => Some(Some(false)),
                "TOGGLE" => Some(Some(!self.state.unwrap_or(false))),
                _ => None,
            },
            _ => None,
        }
    }
}

impl CapabilityNode for ToggleNode {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Toggle
    }

    fn value(&self) -> NodeValue {
        self.state.map_or(NodeValue::Empty, NodeValue::Bool)
    }

    fn display(&self) -> SmolStr {
        match self.state {
            Some(true) => SmolStr::new_inline("ON"),
            Some(false) => SmolStr::new_inline("OFF"),
            None => SmolStr::default(),
        }
    }

    fn set_value(&mut self, value: NodeValue) -> Result<(), NodeValue> {
        match self.parse(&value) {
            Some(state) => {
                self.state = state;
                Ok(())
            }
            None => Err(value),
        }
    }

    fn type_info(&self) -> Option<&str> {
        match self.state {
            Some(true) => Some("on"),
            Some(false) => Some("off"),
            None => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompositeNode {
    fields: IndexMap<SmolStr, NodeValue>,
}

impl CapabilityNode for CompositeNode {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Composite
    }

    fn value(&self) -> NodeValue {
        NodeValue::Fields(self.fields.clone())
    }

    fn display(&self) -> SmolStr {
        SmolStr::new(NodeValue::Fields(self.fields.clone()).to_string())
    }

    fn set_value(&mut self, value: NodeValue) -> Result<(), NodeValue> {
        match value {
            NodeValue::Empty => {
                self.fields.clear();
                Ok(())
            }
            NodeValue::Fields(fields) => {
                for (key, item) in fields {
                    self.fields.insert(key, item);
                }
                Ok(())
            }
            other => Err(other),
        }
    }
}
