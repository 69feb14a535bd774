//! Mirrored device attributes and the full/lazy read-mode switch
//!
//! Reads pass [`ReadContext::Full`] only while `full_update` is set, so the
//! registry may answer from its own cache otherwise. Any write that actually
//! changes an attribute turns `full_update` on before the registry call and
//! leaves it on.

use super::DeviceAdapter;
use crate::client::{DeviceAttribute, MiscFlag, ReadContext};
use crate::error::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Timestamp format used for last-change text
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

impl DeviceAdapter {
    /// Context hint for the current read mode
    pub fn context(&self) -> ReadContext {
        if self.full_update {
            ReadContext::Full
        } else {
            ReadContext::Cached
        }
    }

    /// Read an attribute. Empty for an inert adapter.
    pub async fn read_attribute(&self, attribute: DeviceAttribute) -> Result<String> {
        let Some(record) = &self.record else {
            return Ok(String::new());
        };

        let value = self
            .registry
            .get_attribute(record, attribute, self.context())
            .await?;
        Ok(value.unwrap_or_default())
    }

    /// Write an attribute if it differs from the registry's current value.
    /// Returns whether a write was issued.
    pub async fn write_attribute(&mut self, attribute: DeviceAttribute, value: &str) -> Result<bool> {
        if self.record.is_none() {
            return Ok(false);
        }

        let current = self.read_attribute(attribute).await?;
        if current == value {
            return Ok(false);
        }

        // Must be set before the write so echoed reads see committed data
        self.full_update = true;

        if let Some(record) = &self.record {
            self.registry
                .set_attribute(
                    record,
                    attribute,
                    Some(value.to_string()),
                    ReadContext::Full,
                )
                .await?;
        }
        debug!(ref_id = self.ref_id, %attribute, value, "Attribute written");
        Ok(true)
    }

    pub async fn address(&self) -> Result<String> {
        self.read_attribute(DeviceAttribute::Address).await
    }

    pub async fn set_address(&mut self, address: &str) -> Result<bool> {
        self.write_attribute(DeviceAttribute::Address, address).await
    }

    /// Device type string
    pub async fn device_type(&self) -> Result<String> {
        self.read_attribute(DeviceAttribute::TypeString).await
    }

    pub async fn set_device_type(&mut self, device_type: &str) -> Result<bool> {
        self.write_attribute(DeviceAttribute::TypeString, device_type)
            .await
    }

    pub async fn location(&self) -> Result<String> {
        self.read_attribute(DeviceAttribute::Location).await
    }

    pub async fn set_location(&mut self, location: &str) -> Result<bool> {
        self.write_attribute(DeviceAttribute::Location, location).await
    }

    pub async fn location2(&self) -> Result<String> {
        self.read_attribute(DeviceAttribute::Location2).await
    }

    pub async fn set_location2(&mut self, location: &str) -> Result<bool> {
        self.write_attribute(DeviceAttribute::Location2, location)
            .await
    }

    /// Owner of the device's interface field
    pub async fn interface(&self) -> Result<String> {
        self.read_attribute(DeviceAttribute::Interface).await
    }

    /// Only claim/release and creation change the interface owner
    pub(crate) async fn set_interface(&mut self, owner: &str) -> Result<bool> {
        self.write_attribute(DeviceAttribute::Interface, owner).await
    }

    /// Attention text, `None` when the flag is clear
    pub async fn attention(&self) -> Result<Option<String>> {
        let Some(record) = &self.record else {
            return Ok(None);
        };

        let attention = self
            .registry
            .get_attribute(record, DeviceAttribute::Attention, self.context())
            .await?;
        Ok(attention.filter(|text| !text.is_empty()))
    }

    /// Pass attention through to the registry unconditionally. `None` clears it.
    pub(crate) async fn set_attention(&mut self, attention: Option<String>) -> Result<()> {
        let Some(record) = &self.record else {
            return Ok(());
        };

        self.registry
            .set_attribute(record, DeviceAttribute::Attention, attention, ReadContext::Full)
            .await
    }

    /// Time of the last value change. Always read from the registry.
    pub async fn last_change(&self) -> Result<Option<DateTime<Utc>>> {
        match &self.record {
            Some(record) => Ok(Some(self.registry.get_last_change(record).await?)),
            None => Ok(None),
        }
    }

    /// Last change as display text, empty for an inert adapter
    pub async fn last_change_text(&self) -> Result<String> {
        Ok(self
            .last_change()
            .await?
            .map(|ts| format_timestamp(&ts))
            .unwrap_or_default())
    }

    /// Whether the registry restores this device after a power failure
    pub async fn power_fail_recovery(&self) -> Result<bool> {
        match &self.record {
            Some(record) => {
                self.registry
                    .misc_check(record, MiscFlag::IncludePowerFail)
                    .await
            }
            None => Ok(false),
        }
    }

    pub async fn set_power_fail_recovery(&mut self, enabled: bool) -> Result<()> {
        let Some(record) = &self.record else {
            return Ok(());
        };

        if enabled {
            self.registry
                .misc_set(record, MiscFlag::IncludePowerFail)
                .await
        } else {
            self.registry
                .misc_clear(record, MiscFlag::IncludePowerFail)
                .await
        }
    }

    /// Text shown for the device.
    ///
    /// Falls back to the last string set through this adapter, then the
    /// status of the matching control, then the cached value.
    pub async fn display_string(&mut self) -> Result<String> {
        if self.record.is_none() {
            return Ok(non_empty(self.display_string.clone()).unwrap_or_else(|| "0".to_string()));
        }

        if let Some(text) = non_empty(self.registry.get_display_string(self.ref_id).await?) {
            return Ok(text);
        }

        if let Some(text) = non_empty(self.display_string.clone()) {
            return Ok(text);
        }

        if let Some(text) = non_empty(self.registry.control_status(self.ref_id).await?) {
            return Ok(text);
        }

        Ok(self.get_value().await?.to_string())
    }

    /// Set the display string, `None` restores the registry default
    pub async fn set_display_string(&mut self, text: Option<String>) -> Result<()> {
        self.display_string = text.clone();
        if self.record.is_none() {
            return Ok(());
        }
        self.registry
            .set_display_string(self.ref_id, text, true)
            .await
    }

    /// Re-read name and type authoritatively.
    ///
    /// `full_update` is forced to `force` for the duration of the call and
    /// restored afterwards, even when the call fails.
    pub async fn refresh(&mut self, force: bool, reset_errors: bool) -> Result<()> {
        let ambient = self.full_update;
        self.full_update = force;

        let result = self.refresh_inner().await;

        self.full_update = ambient;
        result?;

        if reset_errors {
            self.clear_on_refresh().await?;
        }

        info!(
            ref_id = self.ref_id,
            name = %self.name,
            force,
            reset_errors,
            "Device refreshed"
        );
        Ok(())
    }

    async fn refresh_inner(&mut self) -> Result<()> {
        self.name = self.read_attribute(DeviceAttribute::Name).await?;
        let default = self.settings.default_device_type.clone();
        self.check_type(&default).await?;
        Ok(())
    }

    /// Set the type to `default` when it is empty and the device is unowned
    /// or owned by this adapter's owner
    pub async fn check_type(&mut self, default: &str) -> Result<bool> {
        let interface = self.interface().await?;
        if !self.device_type().await?.is_empty() {
            return Ok(false);
        }
        if !interface.is_empty() && interface != self.settings.owner {
            return Ok(false);
        }
        self.set_device_type(default).await
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.is_empty())
}
