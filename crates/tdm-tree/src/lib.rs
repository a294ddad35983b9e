//! `tdm-tree` - live device/capability tree model for Tasmota device managers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// External (row, column, parent) addressing.
pub mod address;
/// Capability node kinds and the constructor registry.
pub mod capability;
/// Device manager configuration.
pub mod config;
/// Device payload and device types.
pub mod device;
/// Transport announcement dispatch.
pub mod dispatch;
/// Tree model errors.
pub mod error;
/// Node storage with generational handles.
pub mod node;
/// Change notifications for views.
pub mod observer;
/// Settings stores and the write-through bridge.
pub mod store;
/// The device tree model.
pub mod tree;
/// Node values.
pub mod value;

pub use address::ModelIndex;
pub use capability::{CapabilityKind, CapabilityNode, CapabilityRegistry};
pub use config::TreeConfig;
pub use device::{Device, DeviceType};
pub use dispatch::{Announcement, DispatchOutcome, Dispatcher};
pub use error::TreeError;
pub use node::NodeId;
pub use observer::{ChangeKind, EventLog, TreeEvent, TreeObserver};
pub use store::{
    DeviceField, DeviceRecord, MemoryStore, PersistenceBridge, SettingsStore, TomlFileStore,
};
pub use tree::{DataRole, DeviceTree, TreeOptions};
pub use value::NodeValue;
