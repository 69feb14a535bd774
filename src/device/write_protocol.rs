//! Value write protocols
//!
//! A write either sets the value directly (firing registry triggers), sends a
//! control command mapped from the target value, or does both in that order.

use super::DeviceAdapter;
use crate::client::ControlResponse;
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a value reaches the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteProtocol {
    /// Direct value set. Resets the display string when the value changes.
    DirectSet,
    /// Control command looked up from the device's status/control pairs
    #[default]
    ControlBased,
    /// Direct set followed by a control command
    Both,
}

impl WriteProtocol {
    /// Map the legacy "via direct path" switch
    pub fn from_direct_flag(via_direct_path: bool) -> Self {
        if via_direct_path {
            WriteProtocol::DirectSet
        } else {
            WriteProtocol::ControlBased
        }
    }

    pub fn uses_direct(&self) -> bool {
        matches!(self, WriteProtocol::DirectSet | WriteProtocol::Both)
    }

    pub fn uses_control(&self) -> bool {
        matches!(self, WriteProtocol::ControlBased | WriteProtocol::Both)
    }

    /// Control-only writes are skipped when the value is already cached
    pub fn deduplicates(&self) -> bool {
        !self.uses_direct()
    }
}

impl std::str::FromStr for WriteProtocol {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "direct" | "direct_set" => Ok(WriteProtocol::DirectSet),
            "control" | "control_based" => Ok(WriteProtocol::ControlBased),
            "both" => Ok(WriteProtocol::Both),
            other => Err(SyncError::invalid_input(format!(
                "unknown write protocol '{other}', expected direct, control or both"
            ))),
        }
    }
}

/// What a value write did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOutcome {
    /// Registry accepted the write and the cache now holds the value
    Written,
    /// Value already cached, nothing was sent
    Unchanged,
    /// Registry call failed, the value is pending replay
    Deferred,
    /// Device record is gone, nothing was sent
    Inert,
}

impl DeviceAdapter {
    /// Issue the registry calls for one write.
    /// The cache is not touched here.
    pub(super) async fn dispatch_write(
        &mut self,
        value: f64,
        protocol: WriteProtocol,
        value_changed: bool,
    ) -> Result<()> {
        if protocol.uses_direct() {
            if value_changed {
                // Direct sets bypass the control subsystem that derives the display string
                self.registry
                    .set_display_string(self.ref_id, None, true)
                    .await?;
            }
            self.registry
                .set_value_direct(self.ref_id, value, true)
                .await?;
        }

        if protocol.uses_control() {
            let descriptor = self.control_for(value).await?;
            let response = self
                .registry
                .send_control(&descriptor.command(value))
                .await?;
            debug!(
                ref_id = self.ref_id,
                value,
                control = %descriptor.label,
                ?response,
                "Control sent"
            );
            if response == ControlResponse::AllFailed {
                return Err(SyncError::device_control(format!(
                    "control '{}' for value {} failed on device {}",
                    descriptor.label, value, self.ref_id
                )));
            }
        }

        Ok(())
    }
}
