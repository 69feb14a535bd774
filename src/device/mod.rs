//! Device adapter
//!
//! [`DeviceAdapter`] mirrors one registry device. Attribute reads go through
//! the read-mode switch in [`attributes`], value writes go through
//! [`DeviceAdapter::set_value`], and failed writes are parked for
//! [`DeviceAdapter::reconcile`].
//!
//! An adapter whose record could not be resolved is inert: getters return
//! empty defaults and value writes send nothing.

pub mod attributes;
pub mod control_table;
pub mod interface;
pub mod presentation;
pub mod set;
pub mod value;
pub mod write_protocol;

pub use control_table::StatusControlTable;
pub use interface::InterfaceClaim;
pub use set::{DeviceSet, InterfaceSyncReport, ReconcileReport, SharedAdapter};
pub use value::ValueState;
pub use write_protocol::{WriteOutcome, WriteProtocol};

use crate::client::{
    ControlDescriptor, ControlUse, DeviceAttribute, DeviceRecord, DeviceTypeInfo, GraphicPair,
    MiscFlag, PairValue, RefId, RegistryClient, StatusPair,
};
use crate::config::{ReplayPolicy, SyncConfig};
use crate::error::Result;
use crate::log_structured_error;
use crate::subscription::{SubscriptionRegistry, ValueChangeEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-adapter settings taken from [`SyncConfig`]
#[derive(Debug, Clone, PartialEq)]
struct AdapterSettings {
    owner: String,
    default_device_type: String,
    replay_policy: ReplayPolicy,
}

impl From<&SyncConfig> for AdapterSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            owner: config.owner.clone(),
            default_device_type: config.default_device_type.clone(),
            replay_policy: config.replay_policy,
        }
    }
}

/// Cached view of one registry device
pub struct DeviceAdapter {
    registry: Arc<dyn RegistryClient>,
    ref_id: RefId,
    record: Option<DeviceRecord>,
    settings: AdapterSettings,
    full_update: bool,
    name: String,
    value: ValueState,
    error: String,
    display_string: Option<String>,
    control_table: Option<StatusControlTable>,
    notifier: Option<Arc<SubscriptionRegistry>>,
}

impl std::fmt::Debug for DeviceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceAdapter")
            .field("ref_id", &self.ref_id)
            .field("name", &self.name)
            .field("inert", &self.record.is_none())
            .field("full_update", &self.full_update)
            .field("value", &self.value)
            .field("error", &self.error)
            .finish()
    }
}

impl DeviceAdapter {
    fn with_parts(
        registry: Arc<dyn RegistryClient>,
        ref_id: RefId,
        record: Option<DeviceRecord>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            registry,
            ref_id,
            record,
            settings: AdapterSettings::from(config),
            full_update: config.full_update,
            name: String::new(),
            value: ValueState::default(),
            error: String::new(),
            display_string: None,
            control_table: None,
            notifier: None,
        }
    }

    /// Resolve `ref_id` in the registry. An unknown id yields an inert adapter.
    pub async fn load(
        registry: Arc<dyn RegistryClient>,
        ref_id: RefId,
        config: &SyncConfig,
    ) -> Result<Self> {
        let record = registry.get_device(ref_id).await?;
        if record.is_none() {
            warn!(ref_id, "Device doesn't exist in the registry, adapter is inert");
        }
        let mut adapter = Self::with_parts(registry, ref_id, record, config);
        adapter.name = adapter.read_attribute(DeviceAttribute::Name).await?;
        Ok(adapter)
    }

    /// Wrap an already resolved record
    pub fn from_record(
        registry: Arc<dyn RegistryClient>,
        record: DeviceRecord,
        config: &SyncConfig,
    ) -> Self {
        let ref_id = record.ref_id();
        Self::with_parts(registry, ref_id, Some(record), config)
    }

    /// Create a new registry device owned by `config.owner`
    pub async fn create(
        registry: Arc<dyn RegistryClient>,
        config: &SyncConfig,
        name: &str,
    ) -> Result<Self> {
        let record = registry.new_device(name).await?;
        registry
            .set_device_type_info(&record, DeviceTypeInfo::plug_in())
            .await?;

        let mut adapter = Self::from_record(registry, record.clone(), config);
        adapter.name = name.to_string();
        adapter
            .registry
            .set_status_support(&record, false)
            .await?;
        adapter.registry.misc_set(&record, MiscFlag::ShowValues).await?;
        adapter.registry.misc_set(&record, MiscFlag::NoLog).await?;

        let owner = adapter.settings.owner.clone();
        adapter.set_interface(&owner).await?;
        adapter.set_device_type(&config.default_device_type).await?;
        adapter
            .set_address(&format!("{}{}", config.address_prefix, name))
            .await?;

        info!(ref_id = adapter.ref_id, name, owner = %owner, "Created device");
        Ok(adapter)
    }

    /// Publish value changes to a subscription registry
    pub fn with_notifier(mut self, notifier: Arc<SubscriptionRegistry>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn ref_id(&self) -> RefId {
        self.ref_id
    }

    /// Name as of the last refresh
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.settings.owner
    }

    pub fn record(&self) -> Option<&DeviceRecord> {
        self.record.as_ref()
    }

    /// True once the record is missing. Permanent for this adapter.
    pub fn is_inert(&self) -> bool {
        self.record.is_none()
    }

    pub fn full_update(&self) -> bool {
        self.full_update
    }

    pub fn set_full_update(&mut self, full_update: bool) {
        self.full_update = full_update;
    }

    pub fn cached_value(&self) -> f64 {
        self.value.cached()
    }

    pub fn previous_value(&self) -> f64 {
        self.value.previous()
    }

    pub fn pending_value(&self) -> Option<f64> {
        self.value.pending()
    }

    pub fn value_state(&self) -> &ValueState {
        &self.value
    }

    /// Last error set on this adapter, empty when none
    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn control_table(&self) -> Option<&StatusControlTable> {
        self.control_table.as_ref()
    }

    /// Read the value from the registry. Always registry-authoritative.
    pub async fn get_value(&mut self) -> Result<f64> {
        if self.record.is_none() {
            return Ok(0.0);
        }

        let value = self.registry.get_value(self.ref_id).await?;
        let previous = self.value.cached();
        if self.value.record(value) {
            self.publish(previous, value, "read").await;
        }
        Ok(value)
    }

    /// Write a value using `protocol`.
    ///
    /// Registry failures are not returned: the value is kept as pending and
    /// the outcome is [`WriteOutcome::Deferred`].
    pub async fn set_value(&mut self, value: f64, protocol: WriteProtocol) -> WriteOutcome {
        if self.record.is_none() {
            debug!(ref_id = self.ref_id, value, "Ignoring write to inert device");
            return WriteOutcome::Inert;
        }

        let changed = self.value.differs(value);
        if protocol.deduplicates() && !changed {
            debug!(ref_id = self.ref_id, value, "Value unchanged, skipping write");
            return WriteOutcome::Unchanged;
        }

        match self.dispatch_write(value, protocol, changed).await {
            Ok(()) => {
                let previous = self.value.cached();
                self.value.record(value);
                debug!(ref_id = self.ref_id, value, previous, ?protocol, "Value written");
                if changed {
                    self.publish(previous, value, "write").await;
                }
                WriteOutcome::Written
            }
            Err(e) => {
                self.value.defer(value);
                log_structured_error!(e, "device", "set_value", self.ref_id);
                WriteOutcome::Deferred
            }
        }
    }

    /// Re-arm a pending value saved by an earlier process
    pub fn restore_pending(&mut self, value: f64) {
        if self.record.is_some() {
            self.value.defer(value);
        }
    }

    /// Replay a value whose write failed. Call once connectivity is back.
    ///
    /// Returns `None` when nothing was pending.
    pub async fn reconcile(&mut self) -> Option<WriteOutcome> {
        let pending = self.value.take_pending()?;
        debug!(ref_id = self.ref_id, value = pending, "Replaying pending value");

        let outcome = self.set_value(pending, WriteProtocol::ControlBased).await;
        if self.settings.replay_policy == ReplayPolicy::DiscardAfterAttempt {
            self.value.clear_pending();
        }
        if outcome == WriteOutcome::Deferred {
            warn!(
                ref_id = self.ref_id,
                value = pending,
                policy = ?self.settings.replay_policy,
                "Replay of pending value failed"
            );
        }
        Some(outcome)
    }

    /// Store an error and mirror it into the registry attention flag.
    /// An empty string clears both.
    pub async fn set_error(&mut self, text: impl Into<String>) -> Result<()> {
        self.error = text.into();
        let attention = (!self.error.is_empty()).then(|| self.error.clone());
        self.set_attention(attention).await
    }

    /// Clear attention and error. Used by administrative refresh only.
    pub async fn clear_on_refresh(&mut self) -> Result<()> {
        self.error.clear();
        self.set_attention(None).await
    }

    /// Register a single-value status/control pair, with an optional graphic
    pub async fn add_status_pair(
        &mut self,
        value: f64,
        status: &str,
        control_use: ControlUse,
        graphic: Option<&str>,
    ) -> Result<StatusPair> {
        let pair = StatusPair::single(value, status, control_use);
        self.registry.add_status_pair(self.ref_id, pair.clone()).await?;

        if let Some(graphic) = graphic {
            self.registry
                .add_graphic_pair(
                    self.ref_id,
                    GraphicPair {
                        value: PairValue::Single { value },
                        graphic: graphic.to_string(),
                    },
                )
                .await?;
        }

        if let Some(table) = self.control_table.as_mut() {
            table.push(ControlDescriptor::from_pair(self.ref_id, &pair));
        }
        Ok(pair)
    }

    async fn publish(&self, previous: f64, value: f64, cause: &str) {
        if let Some(notifier) = &self.notifier {
            notifier
                .publish(ValueChangeEvent {
                    ref_id: self.ref_id,
                    previous,
                    value,
                    cause: cause.to_string(),
                })
                .await;
        }
    }
}
