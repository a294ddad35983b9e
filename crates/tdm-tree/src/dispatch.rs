//! Applies transport announcements to a device tree.
//!
//! Announcements arrive as JSON objects tagged by `"event"`:
//!
//! ```json
//! {"event": "discovered", "id": "plug", "capabilities": ["POWER", "LWT"]}
//! {"event": "field", "id": "plug", "capability": "POWER", "value": "ON"}
//! {"event": "lost", "id": "plug"}
//! ```

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::debug;

use crate::address::ModelIndex;
use crate::device::{Device, DeviceType};
use crate::error::TreeError;
use crate::tree::DeviceTree;
use crate::value::NodeValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Announcement {
    Discovered {
        id: SmolStr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        friendly_name: Option<SmolStr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        full_topic: Option<SmolStr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_type: Option<DeviceType>,
        #[serde(default)]
        capabilities: Vec<SmolStr>,
    },
    Field {
        id: SmolStr,
        capability: SmolStr,
        #[serde(default)]
        value: NodeValue,
    },
    Lost {
        id: SmolStr,
    },
}

impl Announcement {
    /// Parse one JSON-lines record.
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    #[must_use]
    pub fn device_id(&self) -> &SmolStr {
        match self {
            Self::Discovered { id, .. } | Self::Field { id, .. } | Self::Lost { id } => id,
        }
    }
}

/// What applying one announcement did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// New device inserted at this address.
    Added(ModelIndex),
    /// Device was already present; nothing changed.
    Known(ModelIndex),
    /// Capability value updated at this address.
    Updated(ModelIndex),
    Removed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher;

impl Dispatcher {
    pub fn apply(
        tree: &mut DeviceTree,
        announcement: Announcement,
    ) -> Result<DispatchOutcome, TreeError> {
        debug!(id = %announcement.device_id(), "applying announcement");
        match announcement {
            Announcement::Discovered {
                id,
                friendly_name,
                full_topic,
                device_type,
                capabilities,
            } => {
                let mut device = Device::new(
                    device_type.unwrap_or(tree.options().default_type),
                    id,
                )
                .with_full_topic(full_topic.unwrap_or_else(|| tree.options().full_topic.clone()));
                if let Some(name) = friendly_name {
                    device.set_friendly_name(name);
                }
                device_discovered(tree, device, &capabilities)
            }
            Announcement::Field {
                id,
                capability,
                value,
            } => field_updated(tree, &id, &capability, value),
            Announcement::Lost { id } => device_lost(tree, &id),
        }
    }
}

/// Insert a device and persist its record; a known id is left untouched.
pub fn device_discovered<S: AsRef<str>>(
    tree: &mut DeviceTree,
    device: Device,
    capabilities: &[S],
) -> Result<DispatchOutcome, TreeError> {
    if let Some(existing) = tree.device_index(device.topic()) {
        return Ok(DispatchOutcome::Known(existing));
    }
    let index = tree.add_device_node(device, capabilities)?;
    tree.persist_device(&index)?;
    Ok(DispatchOutcome::Added(index))
}

pub fn field_updated(
    tree: &mut DeviceTree,
    id: &str,
    capability: &str,
    value: NodeValue,
) -> Result<DispatchOutcome, TreeError> {
    let index = tree.capability_index(id, capability)?;
    tree.set_data(&index, value)?;
    Ok(DispatchOutcome::Updated(index))
}

pub fn device_lost(tree: &mut DeviceTree, id: &str) -> Result<DispatchOutcome, TreeError> {
    tree.remove_device(id)?;
    Ok(DispatchOutcome::Removed)
}
