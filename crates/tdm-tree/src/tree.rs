//! Device tree: addressing, two-phase device expansion, and edits.
//!
//! The tree is exactly two levels deep under a synthetic root: device nodes,
//! then the capability nodes each device announced. Every structural change
//! goes through the notifier bracket; every name/topic edit writes through to
//! the persistence bridge before observers hear about it.

#![allow(missing_docs)]

use std::fmt::Write as _;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::address::ModelIndex;
use crate::capability::{CapabilityFactory, CapabilityRegistry};
use crate::device::{Device, DeviceType, DEFAULT_FULL_TOPIC};
use crate::error::TreeError;
use crate::node::{Node, NodeArena, NodeId, NodeKind};
use crate::observer::{ChangeKind, Notifier, TreeObserver};
use crate::store::{DeviceField, DeviceRecord, PersistenceBridge, SettingsStore};
use crate::value::NodeValue;

pub const COLUMN_COUNT: usize = 2;
pub const NAME_COLUMN: usize = 0;
pub const VALUE_COLUMN: usize = 1;

/// What a view asks [`DeviceTree::data`] for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRole {
    Display,
    Edit,
    Decoration,
    ToolTip,
}

/// Defaults applied to devices that do not carry their own settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeOptions {
    /// Type of devices restored from the settings store.
    pub default_type: DeviceType,
    pub full_topic: SmolStr,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            default_type: DeviceType::Tasmota,
            full_topic: SmolStr::new_inline(DEFAULT_FULL_TOPIC),
        }
    }
}

pub struct DeviceTree {
    arena: NodeArena,
    devices: FxHashMap<SmolStr, NodeId>,
    registry: CapabilityRegistry,
    persistence: PersistenceBridge,
    notifier: Notifier,
    options: TreeOptions,
}

impl std::fmt::Debug for DeviceTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceTree")
            .field("devices", &self.devices.len())
            .field("nodes", &self.arena.len())
            .field("notifier", &self.notifier)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl DeviceTree {
    pub fn new(
        registry: CapabilityRegistry,
        persistence: PersistenceBridge,
    ) -> Result<Self, TreeError> {
        Self::with_options(registry, persistence, TreeOptions::default())
    }

    /// Build the tree and restore one device per stored record.
    pub fn with_options(
        registry: CapabilityRegistry,
        persistence: PersistenceBridge,
        options: TreeOptions,
    ) -> Result<Self, TreeError> {
        let records = persistence.load_records()?;
        let mut tree = Self {
            arena: NodeArena::new(),
            devices: FxHashMap::default(),
            registry,
            persistence,
            notifier: Notifier::default(),
            options,
        };
        let device_type = tree.options.default_type;
        for (id, record) in records {
            let mut device = Device::new(device_type, id).with_full_topic(
                record
                    .full_topic
                    .unwrap_or_else(|| tree.options.full_topic.clone()),
            );
            if let Some(name) = record.friendly_name {
                device.set_friendly_name(name);
            }
            tree.insert_device(device, device_type.default_capabilities())?;
        }
        info!(devices = tree.devices.len(), "device tree loaded");
        Ok(tree)
    }

    pub fn subscribe(&mut self, observer: impl TreeObserver + 'static) {
        self.notifier.subscribe(Box::new(observer));
    }

    #[must_use]
    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    #[must_use]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    #[must_use]
    pub fn store(&self) -> &dyn SettingsStore {
        self.persistence.store()
    }

    /// Read-only view of the node storage.
    #[must_use]
    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Device topics in row order.
    #[must_use]
    pub fn device_topics(&self) -> Vec<SmolStr> {
        self.devices_in_order()
            .map(|(_, device)| device.topic().clone())
            .collect()
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        COLUMN_COUNT
    }

    #[must_use]
    pub fn row_count(&self, parent: &ModelIndex) -> usize {
        self.parent_id(parent)
            .map_or(0, |id| self.arena.child_count(id))
    }

    /// Address of the `row`-th child of `parent`, or the invalid address.
    #[must_use]
    pub fn index(&self, row: usize, column: usize, parent: &ModelIndex) -> ModelIndex {
        if column >= COLUMN_COUNT {
            return ModelIndex::invalid();
        }
        let Ok(parent_id) = self.parent_id(parent) else {
            return ModelIndex::invalid();
        };
        match self.arena.child_at(parent_id, row) {
            Some(child) => ModelIndex::new(row, column, child),
            None => ModelIndex::invalid(),
        }
    }

    /// Parent address; the root (and anything unresolvable) maps to invalid.
    #[must_use]
    pub fn parent(&self, index: &ModelIndex) -> ModelIndex {
        let Some(parent_id) = index
            .node_id()
            .and_then(|id| self.arena.get(id))
            .and_then(Node::parent)
        else {
            return ModelIndex::invalid();
        };
        if parent_id == self.arena.root() {
            return ModelIndex::invalid();
        }
        self.arena
            .get(parent_id)
            .map_or_else(ModelIndex::invalid, |parent| {
                ModelIndex::new(parent.row(), NAME_COLUMN, parent_id)
            })
    }

    pub fn node(&self, index: &ModelIndex) -> Result<&Node, TreeError> {
        let id = self.node_id(index)?;
        self.arena.get(id).ok_or(TreeError::StaleAddress)
    }

    pub fn device(&self, index: &ModelIndex) -> Result<&Device, TreeError> {
        self.node(index)?
            .as_device()
            .ok_or(TreeError::InvalidAddress)
    }

    #[must_use]
    pub fn data(&self, index: &ModelIndex, role: DataRole) -> Option<NodeValue> {
        let node = self.node(index).ok()?;
        match (role, index.column()) {
            (DataRole::Display | DataRole::Edit, NAME_COLUMN) => Some(NodeValue::from(node.name())),
            (DataRole::Display, VALUE_COLUMN) => Some(NodeValue::Text(node.display_value())),
            (DataRole::Edit, VALUE_COLUMN) => Some(node.value()),
            (DataRole::Decoration, NAME_COLUMN) => node.type_info().map(NodeValue::from),
            (DataRole::ToolTip, _) => node.as_device().map(|device| {
                NodeValue::from(format!(
                    "Topic: {}\nFull topic: {}",
                    device.topic(),
                    device.full_topic()
                ))
            }),
            _ => None,
        }
    }

    #[must_use]
    pub fn header_data(&self, section: usize) -> Option<&'static str> {
        match section {
            NAME_COLUMN => Some("Device"),
            VALUE_COLUMN => Some("Value"),
            _ => None,
        }
    }

    /// Scan every device row for `topic`.
    #[must_use]
    pub fn get_device_by_topic(&self, topic: &str) -> Option<ModelIndex> {
        self.devices_in_order()
            .find(|(_, device)| device.topic().as_str() == topic)
            .and_then(|(id, _)| {
                let row = self.arena.get(id)?.row();
                Some(ModelIndex::new(row, NAME_COLUMN, id))
            })
    }

    /// Device-index lookup; agrees with [`Self::get_device_by_topic`].
    #[must_use]
    pub fn device_index(&self, topic: &str) -> Option<ModelIndex> {
        let id = *self.devices.get(topic)?;
        let row = self.arena.get(id)?.row();
        Some(ModelIndex::new(row, NAME_COLUMN, id))
    }

    /// Value-column address of one capability of one device.
    pub fn capability_index(&self, topic: &str, key: &str) -> Result<ModelIndex, TreeError> {
        let id = *self
            .devices
            .get(topic)
            .ok_or_else(|| TreeError::DeviceNotFound(SmolStr::new(topic)))?;
        let device = self
            .arena
            .get(id)
            .and_then(Node::as_device)
            .ok_or(TreeError::StaleAddress)?;
        let child = device
            .provided(key)
            .ok_or_else(|| TreeError::UnknownCapability(SmolStr::new(key)))?;
        let row = self.arena.get(child).ok_or(TreeError::StaleAddress)?.row();
        Ok(ModelIndex::new(row, VALUE_COLUMN, child))
    }

    /// Add a device with the configured full topic and expand its capabilities.
    pub fn add_device<S: AsRef<str>>(
        &mut self,
        device_type: DeviceType,
        topic: &str,
        capabilities: &[S],
    ) -> Result<ModelIndex, TreeError> {
        let device =
            Device::new(device_type, topic).with_full_topic(self.options.full_topic.clone());
        self.add_device_node(device, capabilities)
    }

    /// Insert a prepared device under the root, then one child per capability.
    ///
    /// A capability key missing from the registry removes the device again
    /// and fails the call; no half-built device is left behind.
    pub fn add_device_node<S: AsRef<str>>(
        &mut self,
        device: Device,
        capabilities: &[S],
    ) -> Result<ModelIndex, TreeError> {
        let index = self.insert_device(device, capabilities)?;
        if let Ok(device) = self.device(&index) {
            info!(
                topic = %device.topic(),
                capabilities = device.provides().len(),
                "device added"
            );
        }
        Ok(index)
    }

    /// Write the device's full topic and friendly name to the store.
    pub fn persist_device(&mut self, index: &ModelIndex) -> Result<(), TreeError> {
        let device = self.device(index)?;
        let topic = device.topic().clone();
        let record = DeviceRecord {
            full_topic: Some(device.full_topic().clone()),
            friendly_name: device.friendly_name().cloned(),
        };
        self.persistence.write_record(&topic, &record).inspect_err(|err| {
            warn!("persisting device '{topic}' failed: {err}");
        })
    }

    /// Edit one cell and notify observers of exactly that address.
    ///
    /// Column 0 renames the node (a device's friendly name, written through
    /// to the store); column 1 sets the value. Store failures are returned
    /// after the in-memory edit and the notification.
    pub fn set_data(&mut self, index: &ModelIndex, value: NodeValue) -> Result<(), TreeError> {
        let id = self.node_id(index)?;
        let current = self.current_index(id, index.column());
        let persisted = match index.column() {
            NAME_COLUMN => {
                let name = SmolStr::new(value.to_string());
                let node = self.arena.get_mut(id).ok_or(TreeError::StaleAddress)?;
                node.set_name(name.clone());
                let topic = node.as_device().map(|device| device.topic().clone());
                match topic {
                    Some(topic) => self.persist_field(&topic, DeviceField::FriendlyName, &name),
                    None => Ok(()),
                }
            }
            VALUE_COLUMN => {
                let node = self.arena.get_mut(id).ok_or(TreeError::StaleAddress)?;
                node.set_value(value)
                    .map_err(|rejected| TreeError::InvalidValue {
                        capability: SmolStr::new(node.name()),
                        value: SmolStr::new(rejected.to_string()),
                    })?;
                Ok(())
            }
            _ => return Err(TreeError::InvalidAddress),
        };
        debug!(row = current.row(), column = current.column(), "data changed");
        self.notifier.data_changed(&current);
        persisted
    }

    pub fn set_device_friendly_name(
        &mut self,
        index: &ModelIndex,
        name: &str,
    ) -> Result<(), TreeError> {
        let id = self.node_id(index)?;
        self.device(index)?;
        let current = self.current_index(id, NAME_COLUMN);
        self.set_data(&current, NodeValue::from(name))
    }

    pub fn set_device_full_topic(
        &mut self,
        index: &ModelIndex,
        full_topic: &str,
    ) -> Result<(), TreeError> {
        let id = self.node_id(index)?;
        let device = self
            .arena
            .get_mut(id)
            .and_then(Node::as_device_mut)
            .ok_or(TreeError::InvalidAddress)?;
        device.set_full_topic(full_topic);
        let topic = device.topic().clone();
        let stored = device.full_topic().clone();
        let persisted = self.persist_field(&topic, DeviceField::FullTopic, &stored);
        let current = self.current_index(id, index.column());
        self.notifier.data_changed(&current);
        persisted
    }

    /// Change a device's topic, re-keying its stored record and index entry.
    ///
    /// The store is updated first; when it fails nothing in memory changes.
    /// Topics with surrounding whitespace are rejected, not trimmed.
    pub fn set_device_name(&mut self, index: &ModelIndex, new_topic: &str) -> Result<(), TreeError> {
        let id = self.node_id(index)?;
        let device = self
            .arena
            .get(id)
            .and_then(Node::as_device)
            .ok_or(TreeError::InvalidAddress)?;
        let old = device.topic().clone();
        let new = SmolStr::new(new_topic);
        if new_topic.is_empty() || new_topic.trim() != new_topic {
            return Err(TreeError::InvalidValue {
                capability: SmolStr::new_inline("topic"),
                value: new,
            });
        }
        if new == old {
            return Ok(());
        }
        if self.devices.contains_key(&new) {
            return Err(TreeError::DuplicateDevice(new));
        }
        let record = DeviceRecord {
            full_topic: Some(device.full_topic().clone()),
            friendly_name: device.friendly_name().cloned(),
        };
        if let Err(err) = self.persistence.rename(&old, &new, &record) {
            warn!("renaming device '{old}' to '{new}' failed: {err}");
            return Err(err);
        }
        if let Some(device) = self.arena.get_mut(id).and_then(Node::as_device_mut) {
            device.set_topic(new.clone());
        }
        self.devices.remove(&old);
        self.devices.insert(new.clone(), id);
        info!(%old, %new, "device renamed");
        let current = self.current_index(id, index.column());
        self.notifier.data_changed(&current);
        Ok(())
    }

    /// Insert `count` placeholder rows at `position` under `parent`.
    pub fn insert_rows(
        &mut self,
        position: usize,
        count: usize,
        parent: &ModelIndex,
    ) -> Result<(), TreeError> {
        let parent_id = self.parent_id(parent)?;
        let root = self.arena.root();
        let parent_node = self.arena.get(parent_id).ok_or(TreeError::StaleAddress)?;
        if (parent_id != root && parent_node.parent() != Some(root)) || parent_node.is_capability() {
            return Err(TreeError::InvalidAddress);
        }
        let rows = parent_node.child_count();
        if position > rows {
            return Err(TreeError::OutOfRangeMutation {
                position,
                count,
                rows,
            });
        }
        if count == 0 {
            return Ok(());
        }
        let change =
            self.notifier
                .begin(parent, position, position + count - 1, ChangeKind::Insert);
        let mut result = Ok(());
        for offset in 0..count {
            let name = format!("untitled{}", self.arena.child_count(parent_id));
            if let Err(err) = self.arena.insert_child(
                parent_id,
                position + offset,
                Node::new(name, NodeKind::Plain),
            ) {
                result = Err(err);
                break;
            }
        }
        self.notifier.end(change);
        result
    }

    /// Remove rows `position..position + count` under `parent`.
    ///
    /// Removed devices leave the device index inside the bracket; their stored
    /// records are purged afterwards and the first purge failure is returned.
    pub fn remove_rows(
        &mut self,
        position: usize,
        count: usize,
        parent: &ModelIndex,
    ) -> Result<(), TreeError> {
        let parent_id = self.parent_id(parent)?;
        let rows = self.arena.child_count(parent_id);
        let end = position
            .checked_add(count)
            .filter(|end| *end <= rows)
            .ok_or(TreeError::OutOfRangeMutation {
                position,
                count,
                rows,
            })?;
        if count == 0 {
            return Ok(());
        }
        let doomed: Vec<NodeId> = self
            .arena
            .get(parent_id)
            .map(|node| node.children()[position..end].to_vec())
            .unwrap_or_default();

        let change = self
            .notifier
            .begin(parent, position, end - 1, ChangeKind::Remove);
        let mut removed_topics = Vec::new();
        let mut failure = None;
        for _ in 0..count {
            match self.arena.remove_child(parent_id, position) {
                Ok(node) => {
                    if let Some(device) = node.as_device() {
                        removed_topics.push(device.topic().clone());
                    }
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        for topic in &removed_topics {
            self.devices.remove(topic);
        }
        if let Some(device) = self.arena.get_mut(parent_id).and_then(Node::as_device_mut) {
            device.provides_mut().retain(|_, id| !doomed.contains(id));
        }
        self.notifier.end(change);

        if let Some(err) = failure {
            return Err(err);
        }
        let mut first_error = None;
        for topic in removed_topics {
            info!(%topic, "device removed");
            if let Err(err) = self.persistence.purge(&topic) {
                warn!("purging record of '{topic}' failed: {err}");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Remove one device by topic.
    pub fn remove_device(&mut self, topic: &str) -> Result<(), TreeError> {
        let index = self
            .device_index(topic)
            .ok_or_else(|| TreeError::DeviceNotFound(SmolStr::new(topic)))?;
        self.remove_rows(index.row(), 1, &ModelIndex::invalid())
    }

    /// Indented text rendering: one line per node, `name: value`.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_children(self.arena.root(), 0, &mut out);
        out
    }

    fn dump_children(&self, parent: NodeId, depth: usize, out: &mut String) {
        let Some(node) = self.arena.get(parent) else {
            return;
        };
        for child in node.children() {
            let Some(child_node) = self.arena.get(*child) else {
                continue;
            };
            let _ = write!(out, "{}{}", "  ".repeat(depth), child_node.name());
            if let Some(device) = child_node.as_device() {
                if device.friendly_name().is_some() {
                    let _ = write!(out, " [{}]", device.topic());
                }
            }
            let value = child_node.display_value();
            if !value.is_empty() {
                let _ = write!(out, ": {value}");
            }
            out.push('\n');
            self.dump_children(*child, depth + 1, out);
        }
    }

    fn insert_device<S: AsRef<str>>(
        &mut self,
        device: Device,
        capabilities: &[S],
    ) -> Result<ModelIndex, TreeError> {
        let topic = device.topic().clone();
        if self.devices.contains_key(&topic) {
            return Err(TreeError::DuplicateDevice(topic));
        }
        let root = self.arena.root();
        let row = self.arena.child_count(root);

        let change = self
            .notifier
            .begin(&ModelIndex::invalid(), row, row, ChangeKind::Insert);
        let inserted = self.arena.insert_child(root, row, Node::device(device));
        self.notifier.end(change);
        let device_id = inserted?;
        self.devices.insert(topic.clone(), device_id);
        let device_index = ModelIndex::new(row, NAME_COLUMN, device_id);

        if let Err(err) = self.expand_device(device_id, &device_index, capabilities) {
            warn!("rolling back device '{topic}': {err}");
            self.rollback_device(row, &topic);
            return Err(err);
        }
        Ok(device_index)
    }

    /// Second phase: resolve every constructor, then insert all children in
    /// one bracket sized to the announced set.
    fn expand_device<S: AsRef<str>>(
        &mut self,
        device_id: NodeId,
        device_index: &ModelIndex,
        capabilities: &[S],
    ) -> Result<(), TreeError> {
        let mut planned: Vec<(SmolStr, CapabilityFactory)> = Vec::with_capacity(capabilities.len());
        for key in capabilities {
            let key = key.as_ref().trim();
            let factory = self.registry.resolve(key)?;
            let canonical = &factory.template().canonical;
            if planned
                .iter()
                .any(|(_, seen)| seen.template().canonical == *canonical)
            {
                continue;
            }
            planned.push((SmolStr::new(key), factory));
        }
        if planned.is_empty() {
            return Ok(());
        }
        let first = self.arena.child_count(device_id);
        let last = first + planned.len() - 1;
        let change = self
            .notifier
            .begin(device_index, first, last, ChangeKind::Insert);
        let result = self.attach_capabilities(device_id, first, planned);
        self.notifier.end(change);
        result
    }

    fn attach_capabilities(
        &mut self,
        device_id: NodeId,
        first: usize,
        planned: Vec<(SmolStr, CapabilityFactory)>,
    ) -> Result<(), TreeError> {
        for (offset, (key, factory)) in planned.into_iter().enumerate() {
            let child = self.arena.insert_child(
                device_id,
                first + offset,
                Node::capability(key.clone(), factory.create()),
            )?;
            if let Some(device) = self.arena.get_mut(device_id).and_then(Node::as_device_mut) {
                device.provides_mut().insert(key, child);
            }
        }
        Ok(())
    }

    fn rollback_device(&mut self, row: usize, topic: &SmolStr) {
        let root = self.arena.root();
        let change = self
            .notifier
            .begin(&ModelIndex::invalid(), row, row, ChangeKind::Remove);
        let removed = self.arena.remove_child(root, row);
        self.notifier.end(change);
        if let Err(err) = removed {
            warn!("rollback of device '{topic}' failed: {err}");
        }
        self.devices.remove(topic);
    }

    fn persist_field(
        &mut self,
        topic: &str,
        field: DeviceField,
        value: &str,
    ) -> Result<(), TreeError> {
        self.persistence
            .write_field(topic, field, value)
            .inspect_err(|err| warn!("writing {} of '{topic}' failed: {err}", field.key()))
    }

    fn devices_in_order(&self) -> impl Iterator<Item = (NodeId, &Device)> + '_ {
        let root = self.arena.root();
        self.arena
            .get(root)
            .map(Node::children)
            .unwrap_or_default()
            .iter()
            .filter_map(move |id| Some((*id, self.arena.get(*id)?.as_device()?)))
    }

    /// Invalid parent means the root. Only column 0 addresses have children.
    fn parent_id(&self, parent: &ModelIndex) -> Result<NodeId, TreeError> {
        match parent.node_id() {
            None => Ok(self.arena.root()),
            Some(_) if parent.column() != NAME_COLUMN => Err(TreeError::InvalidAddress),
            Some(id) if self.arena.contains(id) => Ok(id),
            Some(_) => Err(TreeError::StaleAddress),
        }
    }

    fn node_id(&self, index: &ModelIndex) -> Result<NodeId, TreeError> {
        let id = index.node_id().ok_or(TreeError::InvalidAddress)?;
        if index.column() >= COLUMN_COUNT {
            return Err(TreeError::InvalidAddress);
        }
        if self.arena.contains(id) {
            Ok(id)
        } else {
            Err(TreeError::StaleAddress)
        }
    }

    /// Address of `id` at its present row; callers' rows go stale once an
    /// earlier sibling is removed.
    fn current_index(&self, id: NodeId, column: usize) -> ModelIndex {
        self.arena
            .get(id)
            .map_or_else(ModelIndex::invalid, |node| ModelIndex::new(node.row(), column, id))
    }
}
