//! Registry client interface and the value types exchanged with it
//!
//! The external registry owns every device record. Adapters only ever talk to
//! it through [`RegistryClient`], which keeps the surface narrow enough that a
//! fake or in-memory registry can stand in for the real controller.

pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use memory::{InMemoryRegistry, RegistrySnapshot, StoredDevice};

/// Registry-assigned device identifier
pub type RefId = i32;

/// Opaque handle to a live device record held by the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceRecord {
    ref_id: RefId,
}

impl DeviceRecord {
    /// Mint a handle. Only registry implementations should need this.
    pub fn new(ref_id: RefId) -> Self {
        Self { ref_id }
    }

    pub fn ref_id(&self) -> RefId {
        self.ref_id
    }
}

/// Context hint passed along with attribute reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadContext {
    /// Registry must answer from its authoritative store
    Full,
    /// Registry may answer from its own cache
    Cached,
}

/// String attributes mirrored by an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceAttribute {
    Name,
    Address,
    TypeString,
    Location,
    Location2,
    Interface,
    Attention,
}

impl DeviceAttribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceAttribute::Name => "name",
            DeviceAttribute::Address => "address",
            DeviceAttribute::TypeString => "type",
            DeviceAttribute::Location => "location",
            DeviceAttribute::Location2 => "location2",
            DeviceAttribute::Interface => "interface",
            DeviceAttribute::Attention => "attention",
        }
    }
}

impl std::fmt::Display for DeviceAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Miscellaneous per-device flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MiscFlag {
    ShowValues,
    NoLog,
    IncludePowerFail,
    Hidden,
}

/// Device API family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceApi {
    NoApi,
    PlugIn,
    Thermostat,
    Media,
    Security,
}

/// Device type classification stored on the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTypeInfo {
    pub api: DeviceApi,
    pub device_type: i32,
}

impl DeviceTypeInfo {
    /// Classification used for devices created by an adapter owner
    pub fn plug_in() -> Self {
        Self {
            api: DeviceApi::Security,
            device_type: DeviceApi::PlugIn as i32,
        }
    }
}

/// Value (or value range) a status/control pair applies to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PairValue {
    Single { value: f64 },
    Range { start: f64, end: f64 },
}

impl PairValue {
    pub fn contains(&self, value: f64) -> bool {
        match *self {
            PairValue::Single { value: v } => v == value,
            PairValue::Range { start, end } => start <= value && value <= end,
        }
    }
}

/// Semantic use of a control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlUse {
    NotSpecified,
    On,
    Off,
    Dim,
    OnAlternate,
    LockLock,
    LockUnlock,
}

/// How the registry UI renders a control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlRender {
    Button,
    Values,
    Slider,
    TextBox,
}

/// Status/control pair registered on a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPair {
    pub value: PairValue,
    pub status: String,
    pub control_use: ControlUse,
    pub render: ControlRender,
    pub include_values: bool,
}

impl StatusPair {
    /// Single-value button pair usable both for status and control
    pub fn single(value: f64, status: impl Into<String>, control_use: ControlUse) -> Self {
        Self {
            value: PairValue::Single { value },
            status: status.into(),
            control_use,
            render: ControlRender::Button,
            include_values: true,
        }
    }
}

/// Graphic shown for a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicPair {
    pub value: PairValue,
    pub graphic: String,
}

/// Control the registry can execute for a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDescriptor {
    pub ref_id: RefId,
    pub value: PairValue,
    pub label: String,
    pub control_use: ControlUse,
}

impl ControlDescriptor {
    pub fn from_pair(ref_id: RefId, pair: &StatusPair) -> Self {
        Self {
            ref_id,
            value: pair.value,
            label: pair.status.clone(),
            control_use: pair.control_use,
        }
    }

    pub fn matches(&self, value: f64) -> bool {
        self.value.contains(value)
    }

    /// Command that drives the device to `value` through this control
    pub fn command(&self, value: f64) -> ControlCommand {
        ControlCommand {
            descriptor: self.clone(),
            value,
        }
    }
}

/// Control descriptor bound to a concrete target value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub descriptor: ControlDescriptor,
    pub value: f64,
}

/// Outcome reported by the control handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlResponse {
    Indeterminate,
    AllSuccess,
    SomeFailed,
    AllFailed,
}

/// Trait for device registry implementations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Resolve a ref id to a live record
    async fn get_device(&self, ref_id: RefId) -> Result<Option<DeviceRecord>>;

    /// Allocate a new device record
    async fn new_device(&self, name: &str) -> Result<DeviceRecord>;

    /// Read a string attribute
    async fn get_attribute(
        &self,
        record: &DeviceRecord,
        attribute: DeviceAttribute,
        context: ReadContext,
    ) -> Result<Option<String>>;

    /// Write a string attribute. `None` clears it.
    async fn set_attribute(
        &self,
        record: &DeviceRecord,
        attribute: DeviceAttribute,
        value: Option<String>,
        context: ReadContext,
    ) -> Result<()>;

    /// Timestamp of the last value change
    async fn get_last_change(&self, record: &DeviceRecord) -> Result<DateTime<Utc>>;

    /// Current device value
    async fn get_value(&self, ref_id: RefId) -> Result<f64>;

    /// Set the value directly, optionally firing registry triggers
    async fn set_value_direct(&self, ref_id: RefId, value: f64, trigger: bool) -> Result<()>;

    /// Execute a control command
    async fn send_control(&self, command: &ControlCommand) -> Result<ControlResponse>;

    /// All controls the device exposes
    async fn control_descriptors(&self, ref_id: RefId) -> Result<Vec<ControlDescriptor>>;

    /// Control matching a single target value
    async fn lookup_control(&self, ref_id: RefId, value: f64)
        -> Result<Option<ControlDescriptor>>;

    /// Status text the control subsystem derives from the current value
    async fn control_status(&self, ref_id: RefId) -> Result<Option<String>>;

    /// Display string shown for the device
    async fn get_display_string(&self, ref_id: RefId) -> Result<Option<String>>;

    /// Set the display string. `None` restores the default.
    async fn set_display_string(
        &self,
        ref_id: RefId,
        value: Option<String>,
        reset: bool,
    ) -> Result<()>;

    async fn misc_check(&self, record: &DeviceRecord, flag: MiscFlag) -> Result<bool>;

    async fn misc_set(&self, record: &DeviceRecord, flag: MiscFlag) -> Result<()>;

    async fn misc_clear(&self, record: &DeviceRecord, flag: MiscFlag) -> Result<()>;

    async fn set_device_type_info(&self, record: &DeviceRecord, info: DeviceTypeInfo)
        -> Result<()>;

    /// Whether the registry may poll the device for status
    async fn set_status_support(&self, record: &DeviceRecord, supported: bool) -> Result<()>;

    async fn add_status_pair(&self, ref_id: RefId, pair: StatusPair) -> Result<()>;

    async fn add_graphic_pair(&self, ref_id: RefId, pair: GraphicPair) -> Result<()>;

    /// Extra metadata pairs attached to the record
    async fn extra_data(
        &self,
        record: &DeviceRecord,
    ) -> Result<BTreeMap<String, serde_json::Value>>;

    /// Connectivity check
    async fn health_check(&self) -> Result<bool>;
}
