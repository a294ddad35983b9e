//! Tree nodes stored in a generational arena.
//!
//! Parents own their children through the ordered `children` list; the
//! `parent` field is a plain id used for navigation only. Handles carry a
//! generation so an id kept across a removal resolves to nothing instead of
//! to whatever node reuses the slot.

#![allow(missing_docs)]

use smol_str::SmolStr;

use crate::capability::CapabilityNode;
use crate::device::Device;
use crate::error::TreeError;
use crate::value::NodeValue;

/// Generation-counted handle into a [`NodeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    #[must_use]
    pub fn index(self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// What a node represents.
#[derive(Debug)]
pub enum NodeKind {
    Root,
    /// Untyped node created by `insert_rows`.
    Plain,
    Device(Device),
    Capability(Box<dyn CapabilityNode>),
}

#[derive(Debug)]
pub struct Node {
    name: SmolStr,
    kind: NodeKind,
    value: NodeValue,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    row: usize,
}

impl Node {
    #[must_use]
    pub fn new(name: impl Into<SmolStr>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value: NodeValue::Empty,
            parent: None,
            children: Vec::new(),
            row: 0,
        }
    }

    #[must_use]
    pub fn device(device: Device) -> Self {
        Self::new(device.topic().clone(), NodeKind::Device(device))
    }

    #[must_use]
    pub fn capability(name: impl Into<SmolStr>, node: Box<dyn CapabilityNode>) -> Self {
        Self::new(name, NodeKind::Capability(node))
    }

    /// Display key. Devices show their friendly name.
    #[must_use]
    pub fn name(&self) -> &str {
        match &self.kind {
            NodeKind::Device(device) => device.label(),
            _ => self.name.as_str(),
        }
    }

    pub fn set_name(&mut self, name: impl Into<SmolStr>) {
        let name = name.into();
        match &mut self.kind {
            NodeKind::Device(device) => device.set_friendly_name(name),
            _ => self.name = name,
        }
    }

    #[must_use]
    pub fn value(&self) -> NodeValue {
        match &self.kind {
            NodeKind::Capability(capability) => capability.value(),
            _ => self.value.clone(),
        }
    }

    #[must_use]
    pub fn display_value(&self) -> SmolStr {
        match &self.kind {
            NodeKind::Capability(capability) => capability.display(),
            _ => SmolStr::new(self.value.to_string()),
        }
    }

    /// Apply a value; capability nodes may hand the value back as rejected.
    pub fn set_value(&mut self, value: NodeValue) -> Result<(), NodeValue> {
        match &mut self.kind {
            NodeKind::Capability(capability) => capability.set_value(value),
            _ => {
                self.value = value;
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn type_info(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Device(device) => Some(device.device_type().type_info()),
            NodeKind::Capability(capability) => capability.type_info(),
            NodeKind::Root | NodeKind::Plain => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[must_use]
    pub fn as_device(&self) -> Option<&Device> {
        match &self.kind {
            NodeKind::Device(device) => Some(device),
            _ => None,
        }
    }

    pub fn as_device_mut(&mut self) -> Option<&mut Device> {
        match &mut self.kind {
            NodeKind::Device(device) => Some(device),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_capability(&self) -> bool {
        matches!(self.kind, NodeKind::Capability(_))
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Position within the parent's children.
    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn child_at(&self, row: usize) -> Option<NodeId> {
        self.children.get(row).copied()
    }

    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Owner of every node in one tree.
#[derive(Debug)]
pub struct NodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeArena {
    #[must_use]
    pub fn new() -> Self {
        let mut arena = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        };
        arena.root = arena.alloc(Node::new("", NodeKind::Root));
        arena
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn child_count(&self, id: NodeId) -> usize {
        self.get(id).map_or(0, Node::child_count)
    }

    #[must_use]
    pub fn child_at(&self, id: NodeId, row: usize) -> Option<NodeId> {
        self.get(id)?.child_at(row)
    }

    /// Insert `node` as the `pos`-th child of `parent`; later siblings shift down.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        pos: usize,
        mut node: Node,
    ) -> Result<NodeId, TreeError> {
        let rows = self.get(parent).ok_or(TreeError::StaleAddress)?.child_count();
        if pos > rows {
            return Err(TreeError::OutOfRangeMutation {
                position: pos,
                count: 1,
                rows,
            });
        }
        node.parent = Some(parent);
        node.row = pos;
        let id = self.alloc(node);
        if let Some(parent_node) = self.get_mut(parent) {
            parent_node.children.insert(pos, id);
        }
        self.renumber(parent, pos + 1);
        Ok(id)
    }

    /// Detach and drop the `pos`-th child of `parent` together with its subtree.
    ///
    /// Returns the detached node (its own child list emptied) so callers can
    /// inspect what was removed.
    pub fn remove_child(&mut self, parent: NodeId, pos: usize) -> Result<Node, TreeError> {
        let parent_node = self.get_mut(parent).ok_or(TreeError::StaleAddress)?;
        let rows = parent_node.child_count();
        if pos >= rows {
            return Err(TreeError::OutOfRangeMutation {
                position: pos,
                count: 1,
                rows,
            });
        }
        let id = parent_node.children.remove(pos);
        self.renumber(parent, pos);
        let mut node = self.release(id).ok_or(TreeError::StaleAddress)?;
        let mut pending = std::mem::take(&mut node.children);
        while let Some(child) = pending.pop() {
            if let Some(mut released) = self.release(child) {
                pending.append(&mut released.children);
            }
        }
        node.parent = None;
        Ok(node)
    }

    fn renumber(&mut self, parent: NodeId, from: usize) {
        let Some(parent_node) = self.get(parent) else {
            return;
        };
        let tail: Vec<NodeId> = parent_node.children.iter().skip(from).copied().collect();
        for (offset, child) in tail.into_iter().enumerate() {
            if let Some(node) = self.get_mut(child) {
                node.row = from + offset;
            }
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn release(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(name: &str) -> Node {
        Node::new(name, NodeKind::Plain)
    }

    fn names(arena: &NodeArena, parent: NodeId) -> Vec<String> {
        arena
            .get(parent)
            .unwrap()
            .children()
            .iter()
            .map(|id| arena.get(*id).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn insert_shifts_later_rows() {
        let mut arena = NodeArena::new();
        let root = arena.root();
        let a = arena.insert_child(root, 0, plain("a")).unwrap();
        let c = arena.insert_child(root, 1, plain("c")).unwrap();
        let b = arena.insert_child(root, 1, plain("b")).unwrap();
        assert_eq!(names(&arena, root), ["a", "b", "c"]);
        assert_eq!(arena.get(a).unwrap().row(), 0);
        assert_eq!(arena.get(b).unwrap().row(), 1);
        assert_eq!(arena.get(c).unwrap().row(), 2);
        assert_eq!(arena.get(c).unwrap().parent(), Some(root));
    }

    #[test]
    fn insert_past_end_is_rejected() {
        let mut arena = NodeArena::new();
        let root = arena.root();
        let err = arena.insert_child(root, 1, plain("x")).unwrap_err();
        assert_eq!(
            err,
            TreeError::OutOfRangeMutation {
                position: 1,
                count: 1,
                rows: 0
            }
        );
    }

    #[test]
    fn remove_out_of_range_fails_without_mutation() {
        let mut arena = NodeArena::new();
        let root = arena.root();
        arena.insert_child(root, 0, plain("a")).unwrap();
        assert!(arena.remove_child(root, 1).is_err());
        assert_eq!(arena.child_count(root), 1);
    }

    #[test]
    fn removed_ids_go_stale_with_their_subtree() {
        let mut arena = NodeArena::new();
        let root = arena.root();
        let a = arena.insert_child(root, 0, plain("a")).unwrap();
        let leaf = arena.insert_child(a, 0, plain("leaf")).unwrap();
        let b = arena.insert_child(root, 1, plain("b")).unwrap();

        let removed = arena.remove_child(root, 0).unwrap();
        assert_eq!(removed.name(), "a");
        assert!(!arena.contains(a));
        assert!(!arena.contains(leaf));
        assert_eq!(arena.get(b).unwrap().row(), 0);
        assert_eq!(arena.len(), 2);

        // Reused slot must not answer to the old handle.
        let reused = arena.insert_child(root, 0, plain("c")).unwrap();
        assert_eq!(reused.index(), leaf.index());
        assert_ne!(reused, leaf);
        assert!(!arena.contains(leaf));
        assert_eq!(arena.get(reused).unwrap().name(), "c");
    }
}
