//! Mock implementations for testing
//!
//! [`MockRegistry`] wraps an [`InMemoryRegistry`], records every call made
//! against it and can be told to fail calls to simulate a registry that has
//! gone away.

use crate::client::{
    ControlCommand, ControlDescriptor, ControlResponse, DeviceAttribute, DeviceRecord,
    DeviceTypeInfo, GraphicPair, InMemoryRegistry, MiscFlag, ReadContext, RefId, RegistryClient,
    RegistrySnapshot, StatusPair, StoredDevice,
};
use crate::error::{Result, SyncError};
use crate::utils::safe_mutex_lock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// One recorded registry call
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryCall {
    GetDevice(RefId),
    NewDevice(String),
    GetAttribute(RefId, DeviceAttribute, ReadContext),
    SetAttribute(RefId, DeviceAttribute, Option<String>, ReadContext),
    GetLastChange(RefId),
    GetValue(RefId),
    SetValueDirect(RefId, f64, bool),
    SendControl(ControlCommand),
    ControlDescriptors(RefId),
    LookupControl(RefId, f64),
    ControlStatus(RefId),
    GetDisplayString(RefId),
    SetDisplayString(RefId, Option<String>, bool),
    MiscCheck(RefId, MiscFlag),
    MiscSet(RefId, MiscFlag),
    MiscClear(RefId, MiscFlag),
    SetDeviceTypeInfo(RefId, DeviceTypeInfo),
    SetStatusSupport(RefId, bool),
    AddStatusPair(RefId, StatusPair),
    AddGraphicPair(RefId, GraphicPair),
    ExtraData(RefId),
    HealthCheck,
}

impl RegistryCall {
    /// Whether the call changes registry state
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            RegistryCall::NewDevice(_)
                | RegistryCall::SetAttribute(..)
                | RegistryCall::SetValueDirect(..)
                | RegistryCall::SendControl(_)
                | RegistryCall::SetDisplayString(..)
                | RegistryCall::MiscSet(..)
                | RegistryCall::MiscClear(..)
                | RegistryCall::SetDeviceTypeInfo(..)
                | RegistryCall::SetStatusSupport(..)
                | RegistryCall::AddStatusPair(..)
                | RegistryCall::AddGraphicPair(..)
        )
    }
}

#[derive(Debug, Default)]
struct FaultPlan {
    fail_all: bool,
    fail_writes: bool,
    fail_next_writes: usize,
    unhealthy: bool,
}

/// Recording registry for tests
#[derive(Debug, Default)]
pub struct MockRegistry {
    inner: InMemoryRegistry,
    calls: Mutex<Vec<RegistryCall>>,
    faults: Mutex<FaultPlan>,
}

impl MockRegistry {
    /// Create new mock registry with no devices
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        Self {
            inner: InMemoryRegistry::from_snapshot(snapshot),
            ..Self::default()
        }
    }

    /// Mock registry holding a single device
    pub fn with_device(ref_id: RefId, device: StoredDevice) -> Self {
        Self::from_snapshot(RegistrySnapshot::default().with_device(ref_id, device))
    }

    /// Backing store, for inspecting or seeding state without recording
    pub fn inner(&self) -> &InMemoryRegistry {
        &self.inner
    }

    pub async fn device(&self, ref_id: RefId) -> Option<StoredDevice> {
        self.inner.device(ref_id).await
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<RegistryCall> {
        safe_mutex_lock(&self.calls, "mock calls")
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Calls that change registry state
    pub fn write_calls(&self) -> Vec<RegistryCall> {
        self.calls().into_iter().filter(|c| c.is_write()).collect()
    }

    pub fn count(&self, predicate: impl Fn(&RegistryCall) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut calls) = safe_mutex_lock(&self.calls, "mock calls") {
            calls.clear();
        }
    }

    /// Fail every call, reads included
    pub fn fail_all(&self, fail: bool) {
        self.with_faults(|f| f.fail_all = fail);
    }

    /// Fail every state-changing call
    pub fn fail_writes(&self, fail: bool) {
        self.with_faults(|f| f.fail_writes = fail);
    }

    /// Fail the next `count` state-changing calls, then recover
    pub fn fail_next_writes(&self, count: usize) {
        self.with_faults(|f| f.fail_next_writes = count);
    }

    /// Make `health_check` report the registry as down
    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.with_faults(|f| f.unhealthy = unhealthy);
    }

    fn with_faults(&self, f: impl FnOnce(&mut FaultPlan)) {
        if let Ok(mut faults) = safe_mutex_lock(&self.faults, "mock faults") {
            f(&mut faults);
        }
    }

    /// Record a call and decide whether it should fail
    fn record(&self, call: RegistryCall) -> Result<()> {
        let is_write = call.is_write();
        let description = format!("{call:?}");
        if let Ok(mut calls) = safe_mutex_lock(&self.calls, "mock calls") {
            calls.push(call);
        }

        let mut faults = safe_mutex_lock(&self.faults, "mock faults")?;
        let fail = faults.fail_all
            || (is_write && faults.fail_writes)
            || (is_write && faults.fail_next_writes > 0);
        if is_write && faults.fail_next_writes > 0 {
            faults.fail_next_writes -= 1;
        }

        if fail {
            Err(SyncError::connection(format!(
                "injected registry failure on {description}"
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    async fn get_device(&self, ref_id: RefId) -> Result<Option<DeviceRecord>> {
        self.record(RegistryCall::GetDevice(ref_id))?;
        self.inner.get_device(ref_id).await
    }

    async fn new_device(&self, name: &str) -> Result<DeviceRecord> {
        self.record(RegistryCall::NewDevice(name.to_string()))?;
        self.inner.new_device(name).await
    }

    async fn get_attribute(
        &self,
        record: &DeviceRecord,
        attribute: DeviceAttribute,
        context: ReadContext,
    ) -> Result<Option<String>> {
        self.record(RegistryCall::GetAttribute(record.ref_id(), attribute, context))?;
        self.inner.get_attribute(record, attribute, context).await
    }

    async fn set_attribute(
        &self,
        record: &DeviceRecord,
        attribute: DeviceAttribute,
        value: Option<String>,
        context: ReadContext,
    ) -> Result<()> {
        self.record(RegistryCall::SetAttribute(
            record.ref_id(),
            attribute,
            value.clone(),
            context,
        ))?;
        self.inner
            .set_attribute(record, attribute, value, context)
            .await
    }

    async fn get_last_change(&self, record: &DeviceRecord) -> Result<DateTime<Utc>> {
        self.record(RegistryCall::GetLastChange(record.ref_id()))?;
        self.inner.get_last_change(record).await
    }

    async fn get_value(&self, ref_id: RefId) -> Result<f64> {
        self.record(RegistryCall::GetValue(ref_id))?;
        self.inner.get_value(ref_id).await
    }

    async fn set_value_direct(&self, ref_id: RefId, value: f64, trigger: bool) -> Result<()> {
        self.record(RegistryCall::SetValueDirect(ref_id, value, trigger))?;
        self.inner.set_value_direct(ref_id, value, trigger).await
    }

    async fn send_control(&self, command: &ControlCommand) -> Result<ControlResponse> {
        self.record(RegistryCall::SendControl(command.clone()))?;
        self.inner.send_control(command).await
    }

    async fn control_descriptors(&self, ref_id: RefId) -> Result<Vec<ControlDescriptor>> {
        self.record(RegistryCall::ControlDescriptors(ref_id))?;
        self.inner.control_descriptors(ref_id).await
    }

    async fn lookup_control(
        &self,
        ref_id: RefId,
        value: f64,
    ) -> Result<Option<ControlDescriptor>> {
        self.record(RegistryCall::LookupControl(ref_id, value))?;
        self.inner.lookup_control(ref_id, value).await
    }

    async fn control_status(&self, ref_id: RefId) -> Result<Option<String>> {
        self.record(RegistryCall::ControlStatus(ref_id))?;
        self.inner.control_status(ref_id).await
    }

    async fn get_display_string(&self, ref_id: RefId) -> Result<Option<String>> {
        self.record(RegistryCall::GetDisplayString(ref_id))?;
        self.inner.get_display_string(ref_id).await
    }

    async fn set_display_string(
        &self,
        ref_id: RefId,
        value: Option<String>,
        reset: bool,
    ) -> Result<()> {
        self.record(RegistryCall::SetDisplayString(ref_id, value.clone(), reset))?;
        self.inner.set_display_string(ref_id, value, reset).await
    }

    async fn misc_check(&self, record: &DeviceRecord, flag: MiscFlag) -> Result<bool> {
        self.record(RegistryCall::MiscCheck(record.ref_id(), flag))?;
        self.inner.misc_check(record, flag).await
    }

    async fn misc_set(&self, record: &DeviceRecord, flag: MiscFlag) -> Result<()> {
        self.record(RegistryCall::MiscSet(record.ref_id(), flag))?;
        self.inner.misc_set(record, flag).await
    }

    async fn misc_clear(&self, record: &DeviceRecord, flag: MiscFlag) -> Result<()> {
        self.record(RegistryCall::MiscClear(record.ref_id(), flag))?;
        self.inner.misc_clear(record, flag).await
    }

    async fn set_device_type_info(
        &self,
        record: &DeviceRecord,
        info: DeviceTypeInfo,
    ) -> Result<()> {
        self.record(RegistryCall::SetDeviceTypeInfo(record.ref_id(), info))?;
        self.inner.set_device_type_info(record, info).await
    }

    async fn set_status_support(&self, record: &DeviceRecord, supported: bool) -> Result<()> {
        self.record(RegistryCall::SetStatusSupport(record.ref_id(), supported))?;
        self.inner.set_status_support(record, supported).await
    }

    async fn add_status_pair(&self, ref_id: RefId, pair: StatusPair) -> Result<()> {
        self.record(RegistryCall::AddStatusPair(ref_id, pair.clone()))?;
        self.inner.add_status_pair(ref_id, pair).await
    }

    async fn add_graphic_pair(&self, ref_id: RefId, pair: GraphicPair) -> Result<()> {
        self.record(RegistryCall::AddGraphicPair(ref_id, pair.clone()))?;
        self.inner.add_graphic_pair(ref_id, pair).await
    }

    async fn extra_data(
        &self,
        record: &DeviceRecord,
    ) -> Result<BTreeMap<String, serde_json::Value>> {
        self.record(RegistryCall::ExtraData(record.ref_id()))?;
        self.inner.extra_data(record).await
    }

    async fn health_check(&self) -> Result<bool> {
        self.record(RegistryCall::HealthCheck)?;
        let unhealthy = safe_mutex_lock(&self.faults, "mock faults")?.unhealthy;
        Ok(!unhealthy)
    }
}
