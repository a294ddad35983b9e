//! Device payload carried by device nodes.

#![allow(missing_docs)]

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::TreeError;
use crate::node::NodeId;

/// Full topic pattern used by Tasmota firmware out of the box.
pub const DEFAULT_FULL_TOPIC: &str = "%prefix%/%topic%/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Tasmota,
    Generic,
}

impl DeviceType {
    pub fn parse(text: &str) -> Result<Self, TreeError> {
        match text.trim().to_ascii_lowercase().as_str() {
            "tasmota" => Ok(Self::Tasmota),
            "generic" | "device" => Ok(Self::Generic),
            _ => Err(TreeError::InvalidConfig(
                format!("invalid device type '{text}' (expected tasmota/generic)").into(),
            )),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tasmota => "tasmota",
            Self::Generic => "generic",
        }
    }

    /// Decoration tag for device rows.
    #[must_use]
    pub fn type_info(self) -> &'static str {
        match self {
            Self::Tasmota => "tasmota",
            Self::Generic => "device",
        }
    }

    /// Capabilities materialized for devices restored from the settings store.
    #[must_use]
    pub fn default_capabilities(self) -> &'static [&'static str] {
        match self {
            Self::Tasmota => &["LWT", "Module", "Firmware", "IPAddress", "Uptime", "POWER"],
            Self::Generic => &["LWT"],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    topic: SmolStr,
    full_topic: SmolStr,
    friendly_name: Option<SmolStr>,
    device_type: DeviceType,
    provides: IndexMap<SmolStr, NodeId>,
}

impl Device {
    #[must_use]
    pub fn new(device_type: DeviceType, topic: impl Into<SmolStr>) -> Self {
        Self {
            topic: topic.into(),
            full_topic: SmolStr::new_inline(DEFAULT_FULL_TOPIC),
            friendly_name: None,
            device_type,
            provides: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_full_topic(mut self, full_topic: impl Into<SmolStr>) -> Self {
        self.set_full_topic(full_topic);
        self
    }

    #[must_use]
    pub fn with_friendly_name(mut self, name: impl Into<SmolStr>) -> Self {
        self.set_friendly_name(name);
        self
    }

    /// Stable device identifier.
    #[must_use]
    pub fn topic(&self) -> &SmolStr {
        &self.topic
    }

    pub(crate) fn set_topic(&mut self, topic: SmolStr) {
        self.topic = topic;
    }

    #[must_use]
    pub fn full_topic(&self) -> &SmolStr {
        &self.full_topic
    }

    pub fn set_full_topic(&mut self, full_topic: impl Into<SmolStr>) {
        let full_topic = full_topic.into();
        self.full_topic = if full_topic.trim().is_empty() {
            SmolStr::new_inline(DEFAULT_FULL_TOPIC)
        } else {
            full_topic
        };
    }

    #[must_use]
    pub fn friendly_name(&self) -> Option<&SmolStr> {
        self.friendly_name.as_ref()
    }

    /// Empty names clear the label back to the topic.
    pub fn set_friendly_name(&mut self, name: impl Into<SmolStr>) {
        let name = name.into();
        self.friendly_name = if name.trim().is_empty() {
            None
        } else {
            Some(name)
        };
    }

    /// User-facing label: friendly name, or the topic when unset.
    #[must_use]
    pub fn label(&self) -> &str {
        self.friendly_name.as_deref().unwrap_or(self.topic.as_str())
    }

    #[must_use]
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Capability key to child node, in announcement order.
    #[must_use]
    pub fn provides(&self) -> &IndexMap<SmolStr, NodeId> {
        &self.provides
    }

    pub(crate) fn provides_mut(&mut self) -> &mut IndexMap<SmolStr, NodeId> {
        &mut self.provides
    }

    /// Lookup by capability key, ignoring ASCII case.
    #[must_use]
    pub fn provided(&self, key: &str) -> Option<NodeId> {
        self.provides.get(key).copied().or_else(|| {
            self.provides
                .iter()
                .find(|(provided, _)| provided.eq_ignore_ascii_case(key))
                .map(|(_, id)| *id)
        })
    }

    /// Expand the full topic pattern for one message prefix (`cmnd`, `stat`, `tele`).
    #[must_use]
    pub fn topic_for(&self, prefix: &str) -> String {
        self.full_topic
            .replace("%prefix%", prefix)
            .replace("%topic%", &self.topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_falls_back_to_topic() {
        let mut device = Device::new(DeviceType::Tasmota, "sonoff-1");
        assert_eq!(device.label(), "sonoff-1");
        device.set_friendly_name("Kitchen");
        assert_eq!(device.label(), "Kitchen");
        device.set_friendly_name("  ");
        assert_eq!(device.friendly_name(), None);
        assert_eq!(device.label(), "sonoff-1");
    }

    #[test]
    fn full_topic_expands_prefix_and_topic() {
        let device = Device::new(DeviceType::Tasmota, "plug");
        assert_eq!(device.topic_for("cmnd"), "cmnd/plug/");
        let custom = device.with_full_topic("home/%topic%/%prefix%/");
        assert_eq!(custom.topic_for("tele"), "home/plug/tele/");
    }

    #[test]
    fn device_type_parse_rejects_unknown() {
        assert_eq!(DeviceType::parse(" Tasmota ").unwrap(), DeviceType::Tasmota);
        assert_eq!(DeviceType::parse("device").unwrap(), DeviceType::Generic);
        assert!(matches!(
            DeviceType::parse("zigbee"),
            Err(TreeError::InvalidConfig(_))
        ));
    }
}
