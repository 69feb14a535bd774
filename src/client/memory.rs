//! In-process registry
//!
//! Holds device records in memory and can be saved to or loaded from a JSON
//! snapshot. Used by the `device-sync` binary for offline work and as the
//! backing store of the test mock.

use super::{
    ControlCommand, ControlDescriptor, ControlResponse, DeviceAttribute, DeviceRecord,
    DeviceTypeInfo, GraphicPair, MiscFlag, ReadContext, RefId, RegistryClient, StatusPair,
};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::debug;

/// Stored form of one device record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredDevice {
    pub name: String,
    pub address: String,
    pub type_string: String,
    pub location: String,
    pub location2: String,
    pub interface: String,
    pub attention: Option<String>,
    pub value: f64,
    pub display_string: Option<String>,
    pub last_change: DateTime<Utc>,
    pub misc: BTreeSet<MiscFlag>,
    pub status_support: bool,
    pub type_info: Option<DeviceTypeInfo>,
    pub status_pairs: Vec<StatusPair>,
    pub graphic_pairs: Vec<GraphicPair>,
    pub extra_data: BTreeMap<String, serde_json::Value>,
}

impl Default for StoredDevice {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: String::new(),
            type_string: String::new(),
            location: String::new(),
            location2: String::new(),
            interface: String::new(),
            attention: None,
            value: -1.0,
            display_string: None,
            last_change: DateTime::<Utc>::default(),
            misc: BTreeSet::new(),
            status_support: false,
            type_info: None,
            status_pairs: Vec::new(),
            graphic_pairs: Vec::new(),
            extra_data: BTreeMap::new(),
        }
    }
}

impl StoredDevice {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_pair(mut self, pair: StatusPair) -> Self {
        self.status_pairs.push(pair);
        self
    }

    fn attribute(&self, attribute: DeviceAttribute) -> Option<String> {
        match attribute {
            DeviceAttribute::Name => Some(self.name.clone()),
            DeviceAttribute::Address => Some(self.address.clone()),
            DeviceAttribute::TypeString => Some(self.type_string.clone()),
            DeviceAttribute::Location => Some(self.location.clone()),
            DeviceAttribute::Location2 => Some(self.location2.clone()),
            DeviceAttribute::Interface => Some(self.interface.clone()),
            DeviceAttribute::Attention => self.attention.clone(),
        }
    }

    fn set_attribute(&mut self, attribute: DeviceAttribute, value: Option<String>) {
        let text = value.clone().unwrap_or_default();
        match attribute {
            DeviceAttribute::Name => self.name = text,
            DeviceAttribute::Address => self.address = text,
            DeviceAttribute::TypeString => self.type_string = text,
            DeviceAttribute::Location => self.location = text,
            DeviceAttribute::Location2 => self.location2 = text,
            DeviceAttribute::Interface => self.interface = text,
            DeviceAttribute::Attention => self.attention = value.filter(|v| !v.is_empty()),
        }
    }

    fn status_for(&self, value: f64) -> Option<&StatusPair> {
        self.status_pairs.iter().find(|p| p.value.contains(value))
    }
}

/// Serializable registry contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub devices: BTreeMap<RefId, StoredDevice>,
    /// Values whose write failed, kept for a later replay
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pending: BTreeMap<RefId, f64>,
}

impl RegistrySnapshot {
    pub fn with_device(mut self, ref_id: RefId, device: StoredDevice) -> Self {
        self.devices.insert(ref_id, device);
        self
    }

    pub fn with_pending(mut self, ref_id: RefId, value: f64) -> Self {
        self.pending.insert(ref_id, value);
        self
    }
}

/// Registry that keeps every record in process memory
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: RwLock<RegistrySnapshot>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Load a JSON snapshot. A missing file yields an empty registry.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let snapshot: RegistrySnapshot = serde_json::from_str(&content)?;
                debug!(
                    "Loaded registry snapshot with {} devices from {}",
                    snapshot.devices.len(),
                    path.display()
                );
                Ok(Self::from_snapshot(snapshot))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the current contents as pretty JSON
    pub async fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot().await;
        let content = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.state.read().await.clone()
    }

    /// Copy of one stored device
    pub async fn device(&self, ref_id: RefId) -> Option<StoredDevice> {
        self.state.read().await.devices.get(&ref_id).cloned()
    }

    /// Insert or replace a device record
    pub async fn insert_device(&self, ref_id: RefId, device: StoredDevice) {
        self.state.write().await.devices.insert(ref_id, device);
    }

    /// Drop a record, as an operator deleting the device would
    pub async fn remove_device(&self, ref_id: RefId) -> Option<StoredDevice> {
        let mut state = self.state.write().await;
        state.pending.remove(&ref_id);
        state.devices.remove(&ref_id)
    }

    pub async fn pending_values(&self) -> BTreeMap<RefId, f64> {
        self.state.read().await.pending.clone()
    }

    /// Store or clear the pending value of a device
    pub async fn set_pending(&self, ref_id: RefId, value: Option<f64>) {
        let mut state = self.state.write().await;
        match value {
            Some(value) => {
                state.pending.insert(ref_id, value);
            }
            None => {
                state.pending.remove(&ref_id);
            }
        }
    }

    async fn read_device<T>(&self, ref_id: RefId, f: impl FnOnce(&StoredDevice) -> T) -> Result<T> {
        let state = self.state.read().await;
        state
            .devices
            .get(&ref_id)
            .map(f)
            .ok_or_else(|| SyncError::not_found(format!("device {ref_id}")))
    }

    async fn write_device<T>(
        &self,
        ref_id: RefId,
        f: impl FnOnce(&mut StoredDevice) -> T,
    ) -> Result<T> {
        let mut state = self.state.write().await;
        state
            .devices
            .get_mut(&ref_id)
            .map(f)
            .ok_or_else(|| SyncError::not_found(format!("device {ref_id}")))
    }
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    async fn get_device(&self, ref_id: RefId) -> Result<Option<DeviceRecord>> {
        let state = self.state.read().await;
        Ok(state
            .devices
            .contains_key(&ref_id)
            .then(|| DeviceRecord::new(ref_id)))
    }

    async fn new_device(&self, name: &str) -> Result<DeviceRecord> {
        let mut state = self.state.write().await;
        let ref_id = state.devices.keys().next_back().map_or(1, |last| last + 1);
        state.devices.insert(ref_id, StoredDevice::named(name));
        debug!("Allocated device {} for '{}'", ref_id, name);
        Ok(DeviceRecord::new(ref_id))
    }

    async fn get_attribute(
        &self,
        record: &DeviceRecord,
        attribute: DeviceAttribute,
        _context: ReadContext,
    ) -> Result<Option<String>> {
        self.read_device(record.ref_id(), |d| d.attribute(attribute))
            .await
    }

    async fn set_attribute(
        &self,
        record: &DeviceRecord,
        attribute: DeviceAttribute,
        value: Option<String>,
        _context: ReadContext,
    ) -> Result<()> {
        self.write_device(record.ref_id(), |d| d.set_attribute(attribute, value))
            .await
    }

    async fn get_last_change(&self, record: &DeviceRecord) -> Result<DateTime<Utc>> {
        self.read_device(record.ref_id(), |d| d.last_change).await
    }

    async fn get_value(&self, ref_id: RefId) -> Result<f64> {
        self.read_device(ref_id, |d| d.value).await
    }

    async fn set_value_direct(&self, ref_id: RefId, value: f64, _trigger: bool) -> Result<()> {
        self.write_device(ref_id, |d| {
            if d.value != value {
                d.last_change = Utc::now();
            }
            d.value = value;
        })
        .await
    }

    async fn send_control(&self, command: &ControlCommand) -> Result<ControlResponse> {
        let ref_id = command.descriptor.ref_id;
        self.write_device(ref_id, |d| {
            if !command.descriptor.matches(command.value) {
                return ControlResponse::AllFailed;
            }
            if d.value != command.value {
                d.last_change = Utc::now();
            }
            d.value = command.value;
            d.display_string = Some(command.descriptor.label.clone());
            ControlResponse::AllSuccess
        })
        .await
    }

    async fn control_descriptors(&self, ref_id: RefId) -> Result<Vec<ControlDescriptor>> {
        self.read_device(ref_id, |d| {
            d.status_pairs
                .iter()
                .map(|p| ControlDescriptor::from_pair(ref_id, p))
                .collect()
        })
        .await
    }

    async fn lookup_control(
        &self,
        ref_id: RefId,
        value: f64,
    ) -> Result<Option<ControlDescriptor>> {
        self.read_device(ref_id, |d| {
            d.status_for(value)
                .map(|p| ControlDescriptor::from_pair(ref_id, p))
        })
        .await
    }

    async fn control_status(&self, ref_id: RefId) -> Result<Option<String>> {
        self.read_device(ref_id, |d| d.status_for(d.value).map(|p| p.status.clone()))
            .await
    }

    async fn get_display_string(&self, ref_id: RefId) -> Result<Option<String>> {
        self.read_device(ref_id, |d| d.display_string.clone()).await
    }

    async fn set_display_string(
        &self,
        ref_id: RefId,
        value: Option<String>,
        _reset: bool,
    ) -> Result<()> {
        self.write_device(ref_id, |d| d.display_string = value).await
    }

    async fn misc_check(&self, record: &DeviceRecord, flag: MiscFlag) -> Result<bool> {
        self.read_device(record.ref_id(), |d| d.misc.contains(&flag))
            .await
    }

    async fn misc_set(&self, record: &DeviceRecord, flag: MiscFlag) -> Result<()> {
        self.write_device(record.ref_id(), |d| {
            d.misc.insert(flag);
        })
        .await
    }

    async fn misc_clear(&self, record: &DeviceRecord, flag: MiscFlag) -> Result<()> {
        self.write_device(record.ref_id(), |d| {
            d.misc.remove(&flag);
        })
        .await
    }

    async fn set_device_type_info(
        &self,
        record: &DeviceRecord,
        info: DeviceTypeInfo,
    ) -> Result<()> {
        self.write_device(record.ref_id(), |d| d.type_info = Some(info))
            .await
    }

    async fn set_status_support(&self, record: &DeviceRecord, supported: bool) -> Result<()> {
        self.write_device(record.ref_id(), |d| d.status_support = supported)
            .await
    }

    async fn add_status_pair(&self, ref_id: RefId, pair: StatusPair) -> Result<()> {
        self.write_device(ref_id, |d| d.status_pairs.push(pair)).await
    }

    async fn add_graphic_pair(&self, ref_id: RefId, pair: GraphicPair) -> Result<()> {
        self.write_device(ref_id, |d| d.graphic_pairs.push(pair)).await
    }

    async fn extra_data(
        &self,
        record: &DeviceRecord,
    ) -> Result<BTreeMap<String, serde_json::Value>> {
        self.read_device(record.ref_id(), |d| d.extra_data.clone())
            .await
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ControlUse;

    fn lamp() -> StoredDevice {
        StoredDevice::named("Lamp")
            .with_pair(StatusPair::single(0.0, "Off", ControlUse::Off))
            .with_pair(StatusPair::single(100.0, "On", ControlUse::On))
    }

    #[tokio::test]
    async fn test_new_device_allocates_next_ref() {
        let registry =
            InMemoryRegistry::from_snapshot(RegistrySnapshot::default().with_device(41, lamp()));
        let record = registry.new_device("Fan").await.unwrap();

        assert_eq!(record.ref_id(), 42);
        assert_eq!(registry.device(42).await.unwrap().name, "Fan");
    }

    #[tokio::test]
    async fn test_control_sets_value_and_display_string() {
        let registry =
            InMemoryRegistry::from_snapshot(RegistrySnapshot::default().with_device(1, lamp()));
        let descriptor = registry.lookup_control(1, 100.0).await.unwrap().unwrap();

        let response = registry.send_control(&descriptor.command(100.0)).await.unwrap();

        assert_eq!(response, ControlResponse::AllSuccess);
        let stored = registry.device(1).await.unwrap();
        assert_eq!(stored.value, 100.0);
        assert_eq!(stored.display_string.as_deref(), Some("On"));
        assert_eq!(registry.control_status(1).await.unwrap().as_deref(), Some("On"));
    }

    #[tokio::test]
    async fn test_unknown_device_is_not_found() {
        let registry = InMemoryRegistry::new();

        assert!(registry.get_device(5).await.unwrap().is_none());
        assert!(matches!(
            registry.get_value(5).await,
            Err(SyncError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_attention_clears_flag() {
        let registry =
            InMemoryRegistry::from_snapshot(RegistrySnapshot::default().with_device(1, lamp()));
        let record = DeviceRecord::new(1);

        registry
            .set_attribute(
                &record,
                DeviceAttribute::Attention,
                Some("broken".to_string()),
                ReadContext::Full,
            )
            .await
            .unwrap();
        registry
            .set_attribute(
                &record,
                DeviceAttribute::Attention,
                Some(String::new()),
                ReadContext::Full,
            )
            .await
            .unwrap();

        assert_eq!(registry.device(1).await.unwrap().attention, None);
    }

    #[tokio::test]
    async fn test_snapshot_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let registry =
            InMemoryRegistry::from_snapshot(RegistrySnapshot::default().with_device(3, lamp()));
        registry.set_pending(3, Some(100.0)).await;

        registry.save(&path).await.unwrap();
        let loaded = InMemoryRegistry::load(&path).await.unwrap();

        assert_eq!(loaded.snapshot().await, registry.snapshot().await);
        assert_eq!(loaded.pending_values().await.get(&3), Some(&100.0));
    }

    #[tokio::test]
    async fn test_pending_values_follow_devices() {
        let registry = InMemoryRegistry::from_snapshot(
            RegistrySnapshot::default()
                .with_device(1, lamp())
                .with_device(2, lamp())
                .with_pending(1, 0.0)
                .with_pending(2, 100.0),
        );

        registry.set_pending(1, None).await;
        registry.remove_device(2).await;

        assert!(registry.pending_values().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = InMemoryRegistry::load(&dir.path().join("absent.json"))
            .await
            .unwrap();

        assert!(loaded.snapshot().await.devices.is_empty());
    }
}
