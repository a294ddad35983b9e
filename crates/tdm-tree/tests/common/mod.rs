#![allow(dead_code)]

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use smol_str::SmolStr;
use tdm_tree::{
    CapabilityRegistry, DeviceField, DeviceTree, DeviceType, EventLog, MemoryStore, ModelIndex,
    PersistenceBridge, SettingsStore, TreeError,
};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{stamp}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn empty_tree() -> DeviceTree {
    tree_with_store(MemoryStore::new())
}

pub fn tree_with_store(store: impl SettingsStore + 'static) -> DeviceTree {
    DeviceTree::new(
        CapabilityRegistry::default_registry(),
        PersistenceBridge::new(store),
    )
    .expect("tree")
}

/// Tree with an attached event log.
pub fn observed_tree() -> (DeviceTree, EventLog) {
    let mut tree = empty_tree();
    let log = EventLog::new();
    tree.subscribe(log.clone());
    (tree, log)
}

pub fn add(tree: &mut DeviceTree, topic: &str, caps: &[&str]) -> ModelIndex {
    tree.add_device(DeviceType::Tasmota, topic, caps)
        .expect("add device")
}

pub fn stored(tree: &DeviceTree, id: &str, field: DeviceField) -> Option<SmolStr> {
    tree.store().get(id, field).expect("store get")
}

pub fn stored_ids(tree: &DeviceTree) -> Vec<SmolStr> {
    tree.store().device_ids().expect("store ids")
}

/// Switches for [`FlakyStore`], shared with the test after the store moves into a tree.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub set: Rc<Cell<bool>>,
    /// Number of upcoming `remove` calls that fail.
    pub remove: Rc<Cell<u32>>,
    pub flush: Rc<Cell<bool>>,
}

/// Memory store whose operations fail on demand.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    faults: Faults,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> (Self, Faults) {
        let faults = Faults::default();
        (
            Self {
                inner,
                faults: faults.clone(),
            },
            faults,
        )
    }
}

fn disk_full() -> TreeError {
    TreeError::PersistenceWriteFailure("disk full".into())
}

impl SettingsStore for FlakyStore {
    fn device_ids(&self) -> Result<Vec<SmolStr>, TreeError> {
        self.inner.device_ids()
    }

    fn get(&self, id: &str, field: DeviceField) -> Result<Option<SmolStr>, TreeError> {
        self.inner.get(id, field)
    }

    fn set(&mut self, id: &str, field: DeviceField, value: &str) -> Result<(), TreeError> {
        if self.faults.set.get() {
            return Err(disk_full());
        }
        self.inner.set(id, field, value)
    }

    fn remove(&mut self, id: &str) -> Result<(), TreeError> {
        let pending = self.faults.remove.get();
        if pending > 0 {
            self.faults.remove.set(pending - 1);
            return Err(disk_full());
        }
        self.inner.remove(id)
    }

    fn flush(&mut self) -> Result<(), TreeError> {
        if self.faults.flush.get() {
            return Err(disk_full());
        }
        self.inner.flush()
    }
}

/// Walk every node and check `parent.child_at(row) == node`.
pub fn assert_row_invariant(tree: &DeviceTree) {
    let arena = tree.arena();
    let mut pending = vec![arena.root()];
    while let Some(id) = pending.pop() {
        let node = arena.get(id).expect("live node");
        for (row, child) in node.children().iter().enumerate() {
            let child_node = arena.get(*child).expect("live child");
            assert_eq!(child_node.row(), row);
            assert_eq!(child_node.parent(), Some(id));
            assert_eq!(arena.child_at(id, child_node.row()), Some(*child));
            pending.push(*child);
        }
    }
}
