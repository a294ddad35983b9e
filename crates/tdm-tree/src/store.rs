//! Durable per-device records and the bridge the tree writes through.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::warn;

use crate::error::TreeError;

/// Persisted fields of a device record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceField {
    FullTopic,
    FriendlyName,
}

impl DeviceField {
    pub const ALL: [Self; 2] = [Self::FullTopic, Self::FriendlyName];

    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::FullTopic => "full_topic",
            Self::FriendlyName => "friendly_name",
        }
    }
}

/// Key-value settings backend, grouped by device id.
pub trait SettingsStore {
    fn device_ids(&self) -> Result<Vec<SmolStr>, TreeError>;
    fn get(&self, id: &str, field: DeviceField) -> Result<Option<SmolStr>, TreeError>;
    fn set(&mut self, id: &str, field: DeviceField, value: &str) -> Result<(), TreeError>;
    /// Removing an unknown id is not an error.
    fn remove(&mut self, id: &str) -> Result<(), TreeError>;
    fn flush(&mut self) -> Result<(), TreeError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_topic: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<SmolStr>,
}

impl DeviceRecord {
    #[must_use]
    pub fn field(&self, field: DeviceField) -> Option<&SmolStr> {
        match field {
            DeviceField::FullTopic => self.full_topic.as_ref(),
            DeviceField::FriendlyName => self.friendly_name.as_ref(),
        }
    }

    fn set_field(&mut self, field: DeviceField, value: &str) {
        let value = Some(SmolStr::new(value));
        match field {
            DeviceField::FullTopic => self.full_topic = value,
            DeviceField::FriendlyName => self.friendly_name = value,
        }
    }
}

/// In-memory store, used by tests and as a scratch backend.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: IndexMap<SmolStr, DeviceRecord>,
    flushes: usize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_record(mut self, id: &str, record: DeviceRecord) -> Self {
        self.records.insert(SmolStr::new(id), record);
        self
    }

    #[must_use]
    pub fn record(&self, id: &str) -> Option<&DeviceRecord> {
        self.records.get(id)
    }

    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl SettingsStore for MemoryStore {
    fn device_ids(&self) -> Result<Vec<SmolStr>, TreeError> {
        Ok(self.records.keys().cloned().collect())
    }

    fn get(&self, id: &str, field: DeviceField) -> Result<Option<SmolStr>, TreeError> {
        Ok(self
            .records
            .get(id)
            .and_then(|record| record.field(field))
            .cloned())
    }

    fn set(&mut self, id: &str, field: DeviceField, value: &str) -> Result<(), TreeError> {
        self.records
            .entry(SmolStr::new(id))
            .or_default()
            .set_field(field, value);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<(), TreeError> {
        self.records.shift_remove(id);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TreeError> {
        self.flushes += 1;
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreToml {
    #[serde(default)]
    devices: IndexMap<SmolStr, DeviceRecord>,
}

/// TOML file store: `[devices.<id>]` tables, rewritten on every flush.
#[derive(Debug, Clone)]
pub struct TomlFileStore {
    path: PathBuf,
    records: IndexMap<SmolStr, DeviceRecord>,
}

impl TomlFileStore {
    /// Open the store; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TreeError> {
        let path = path.into();
        let records = if path.is_file() {
            let text = fs::read_to_string(&path).map_err(|err| {
                TreeError::persistence(format!("read {}: {err}", path.display()))
            })?;
            let raw: StoreToml = toml::from_str(&text).map_err(|err| {
                TreeError::persistence(format!("parse {}: {err}", path.display()))
            })?;
            raw.devices
        } else {
            IndexMap::new()
        };
        Ok(Self { path, records })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(path: &Path, text: &str) -> Result<(), TreeError> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|err| {
                TreeError::persistence(format!("create {}: {err}", dir.display()))
            })?;
        }
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, text)
            .map_err(|err| TreeError::persistence(format!("write {}: {err}", tmp.display())))?;
        fs::rename(&tmp, path)
            .map_err(|err| TreeError::persistence(format!("rename {}: {err}", path.display())))
    }
}

impl SettingsStore for TomlFileStore {
    fn device_ids(&self) -> Result<Vec<SmolStr>, TreeError> {
        Ok(self.records.keys().cloned().collect())
    }

    fn get(&self, id: &str, field: DeviceField) -> Result<Option<SmolStr>, TreeError> {
        Ok(self
            .records
            .get(id)
            .and_then(|record| record.field(field))
            .cloned())
    }

    fn set(&mut self, id: &str, field: DeviceField, value: &str) -> Result<(), TreeError> {
        self.records
            .entry(SmolStr::new(id))
            .or_default()
            .set_field(field, value);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<(), TreeError> {
        self.records.shift_remove(id);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TreeError> {
        let raw = StoreToml {
            devices: self.records.clone(),
        };
        let text = toml::to_string(&raw)
            .map_err(|err| TreeError::persistence(format!("encode store: {err}")))?;
        Self::write_atomic(&self.path, &text)
    }
}

/// Write-through adapter between the device tree and a [`SettingsStore`].
///
/// Every write is followed by a flush; there is no write-behind buffering.
pub struct PersistenceBridge {
    store: Box<dyn SettingsStore>,
}

impl std::fmt::Debug for PersistenceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceBridge").finish_non_exhaustive()
    }
}

impl PersistenceBridge {
    #[must_use]
    pub fn new(store: impl SettingsStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    #[must_use]
    pub fn from_boxed(store: Box<dyn SettingsStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &dyn SettingsStore {
        self.store.as_ref()
    }

    /// Every stored device with its record, in store order.
    pub fn load_records(&self) -> Result<Vec<(SmolStr, DeviceRecord)>, TreeError> {
        let mut records = Vec::new();
        for id in self.store.device_ids()? {
            let mut record = DeviceRecord::default();
            for field in DeviceField::ALL {
                if let Some(value) = self.store.get(&id, field)? {
                    if !value.trim().is_empty() {
                        record.set_field(field, &value);
                    }
                }
            }
            records.push((id, record));
        }
        Ok(records)
    }

    pub fn write_field(
        &mut self,
        id: &str,
        field: DeviceField,
        value: &str,
    ) -> Result<(), TreeError> {
        self.store.set(id, field, value)?;
        self.store.flush()
    }

    pub fn write_record(&mut self, id: &str, record: &DeviceRecord) -> Result<(), TreeError> {
        for field in DeviceField::ALL {
            if let Some(value) = record.field(field) {
                self.store.set(id, field, value)?;
            }
        }
        self.store.flush()
    }

    /// Re-key a record: write `record` under `new_id`, then delete `old_id`.
    ///
    /// Not atomic across a crash between the two steps. A failed delete
    /// undoes the copy so the store keeps exactly one record; a failed flush
    /// also puts the old record back before the error is returned.
    pub fn rename(
        &mut self,
        old_id: &str,
        new_id: &str,
        record: &DeviceRecord,
    ) -> Result<(), TreeError> {
        let previous = self.stored_fields(old_id)?;
        for field in DeviceField::ALL {
            if let Some(value) = record.field(field) {
                if let Err(err) = self.store.set(new_id, field, value) {
                    self.undo_copy(new_id);
                    return Err(err);
                }
            }
        }
        if let Err(err) = self.store.remove(old_id) {
            self.undo_copy(new_id);
            return Err(err);
        }
        if let Err(err) = self.store.flush() {
            self.restore(old_id, &previous);
            self.undo_copy(new_id);
            if let Err(retry) = self.store.flush() {
                warn!("could not flush restored record '{old_id}': {retry}");
            }
            return Err(err);
        }
        Ok(())
    }

    pub fn purge(&mut self, id: &str) -> Result<(), TreeError> {
        self.store.remove(id)?;
        self.store.flush()
    }

    fn stored_fields(&self, id: &str) -> Result<Vec<(DeviceField, SmolStr)>, TreeError> {
        let mut fields = Vec::new();
        for field in DeviceField::ALL {
            if let Some(value) = self.store.get(id, field)? {
                fields.push((field, value));
            }
        }
        Ok(fields)
    }

    fn restore(&mut self, id: &str, fields: &[(DeviceField, SmolStr)]) {
        for (field, value) in fields {
            if let Err(err) = self.store.set(id, *field, value) {
                warn!("could not restore '{id}' after failed rename: {err}");
            }
        }
    }

    fn undo_copy(&mut self, new_id: &str) {
        if let Err(err) = self.store.remove(new_id) {
            warn!("could not undo partial rename to '{new_id}': {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("tdm-tree-{prefix}-{stamp}"));
        fs::create_dir_all(&dir).expect("create temp directory");
        dir
    }

    fn record(full_topic: &str, friendly_name: &str) -> DeviceRecord {
        DeviceRecord {
            full_topic: Some(full_topic.into()),
            friendly_name: Some(friendly_name.into()),
        }
    }

    #[test]
    fn file_store_round_trips_through_flush() {
        let dir = temp_dir("store");
        let path = dir.join("devices.toml");
        let mut store = TomlFileStore::open(&path).expect("open missing file");
        assert!(store.device_ids().unwrap().is_empty());
        store
            .set("plug-1", DeviceField::FullTopic, "%prefix%/%topic%/")
            .unwrap();
        store
            .set("plug-1", DeviceField::FriendlyName, "Desk lamp")
            .unwrap();
        store.flush().unwrap();

        let reopened = TomlFileStore::open(&path).expect("reopen");
        assert_eq!(reopened.device_ids().unwrap(), vec![SmolStr::new("plug-1")]);
        assert_eq!(
            reopened.get("plug-1", DeviceField::FriendlyName).unwrap(),
            Some("Desk lamp".into())
        );
        assert!(!path.with_extension("toml.tmp").exists());
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn file_store_reports_unparsable_file() {
        let dir = temp_dir("broken");
        let path = dir.join("devices.toml");
        fs::write(&path, "devices = [").unwrap();
        let err = TomlFileStore::open(&path).unwrap_err();
        assert!(matches!(err, TreeError::PersistenceWriteFailure(_)));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn bridge_rename_copies_then_deletes() {
        let store = MemoryStore::new().with_record("dev1", record("a/%topic%/", "Lamp"));
        let mut bridge = PersistenceBridge::new(store);
        bridge
            .rename("dev1", "dev2", &record("a/%topic%/", "Lamp"))
            .unwrap();
        let records = bridge.load_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0.as_str(), "dev2");
        assert_eq!(records[0].1, record("a/%topic%/", "Lamp"));
    }

    struct FailingFlush(MemoryStore);

    impl SettingsStore for FailingFlush {
        fn device_ids(&self) -> Result<Vec<SmolStr>, TreeError> {
            self.0.device_ids()
        }

        fn get(&self, id: &str, field: DeviceField) -> Result<Option<SmolStr>, TreeError> {
            self.0.get(id, field)
        }

        fn set(&mut self, id: &str, field: DeviceField, value: &str) -> Result<(), TreeError> {
            self.0.set(id, field, value)
        }

        fn remove(&mut self, id: &str) -> Result<(), TreeError> {
            self.0.remove(id)
        }

        fn flush(&mut self) -> Result<(), TreeError> {
            Err(TreeError::PersistenceWriteFailure("read-only".into()))
        }
    }

    #[test]
    fn bridge_rename_restores_old_record_when_flush_fails() {
        let store = MemoryStore::new().with_record("dev1", record("a/%topic%/", "Lamp"));
        let mut bridge = PersistenceBridge::new(FailingFlush(store));
        let err = bridge
            .rename("dev1", "dev2", &record("b/%topic%/", "Desk"))
            .unwrap_err();
        assert!(matches!(err, TreeError::PersistenceWriteFailure(_)));
        let records = bridge.load_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0.as_str(), "dev1");
        assert_eq!(records[0].1, record("a/%topic%/", "Lamp"));
    }

    #[test]
    fn blank_fields_load_as_unset() {
        let store = MemoryStore::new().with_record(
            "dev1",
            DeviceRecord {
                full_topic: None,
                friendly_name: Some("".into()),
            },
        );
        let bridge = PersistenceBridge::new(store);
        let records = bridge.load_records().unwrap();
        assert_eq!(records[0].1, DeviceRecord::default());
    }
}
