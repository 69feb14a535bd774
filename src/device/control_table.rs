//! Per-adapter table mapping target values to control descriptors
//!
//! Built from the registry once, on the first control-based write, and kept
//! for the life of the adapter that owns it.

use super::DeviceAdapter;
use crate::client::{ControlDescriptor, PairValue, RefId, RegistryClient};
use crate::error::{Result, SyncError};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct StatusControlTable {
    descriptors: Vec<ControlDescriptor>,
    /// Resolved lookups keyed by `f64::to_bits` of the target value
    resolved: HashMap<u64, ControlDescriptor>,
}

impl StatusControlTable {
    pub async fn build(registry: &dyn RegistryClient, ref_id: RefId) -> Result<Self> {
        let descriptors = registry.control_descriptors(ref_id).await?;
        debug!(
            ref_id,
            count = descriptors.len(),
            "Built status/control table"
        );
        Ok(Self::from_descriptors(descriptors))
    }

    pub fn from_descriptors(descriptors: Vec<ControlDescriptor>) -> Self {
        Self {
            descriptors,
            resolved: HashMap::new(),
        }
    }

    /// Control for `value`. Single-value pairs win over ranges.
    pub fn find(&mut self, value: f64) -> Option<ControlDescriptor> {
        if let Some(hit) = self.resolved.get(&value.to_bits()) {
            return Some(hit.clone());
        }

        let found = self
            .descriptors
            .iter()
            .find(|d| matches!(d.value, PairValue::Single { .. }) && d.matches(value))
            .or_else(|| self.descriptors.iter().find(|d| d.matches(value)))
            .cloned()?;

        self.resolved.insert(value.to_bits(), found.clone());
        Some(found)
    }

    /// Memoize a descriptor the registry resolved outside the table
    pub fn remember(&mut self, value: f64, descriptor: ControlDescriptor) {
        self.resolved.insert(value.to_bits(), descriptor);
    }

    /// Add a descriptor. Memoized lookups it covers are dropped so they
    /// resolve again against the extended table.
    pub fn push(&mut self, descriptor: ControlDescriptor) {
        self.resolved
            .retain(|bits, _| !descriptor.matches(f64::from_bits(*bits)));
        self.descriptors.push(descriptor);
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl DeviceAdapter {
    /// Control descriptor for a target value, building the table on first use
    pub(super) async fn control_for(&mut self, value: f64) -> Result<ControlDescriptor> {
        let table = match self.control_table.take() {
            Some(table) => table,
            None => StatusControlTable::build(self.registry.as_ref(), self.ref_id).await?,
        };
        let table = self.control_table.insert(table);

        if let Some(descriptor) = table.find(value) {
            return Ok(descriptor);
        }

        match self.registry.lookup_control(self.ref_id, value).await? {
            Some(descriptor) => {
                table.remember(value, descriptor.clone());
                Ok(descriptor)
            }
            None => Err(SyncError::device_control(format!(
                "no control for value {} on device {}",
                value, self.ref_id
            ))),
        }
    }
}
