//! Owned collection of adapters
//!
//! Each adapter sits behind its own mutex, so the coupled value state of one
//! device is only ever mutated by one task at a time. The set owns the
//! adapters and therefore their control tables; removing an adapter drops
//! its table with it.

use super::{DeviceAdapter, InterfaceClaim, WriteOutcome};
use crate::client::{RefId, RegistryClient};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::log_structured_error;
use crate::subscription::SubscriptionRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub type SharedAdapter = Arc<Mutex<DeviceAdapter>>;

/// Result of replaying pending values across the set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub replayed: Vec<RefId>,
    pub still_failing: Vec<RefId>,
}

impl ReconcileReport {
    pub fn attempted(&self) -> usize {
        self.replayed.len() + self.still_failing.len()
    }
}

/// Result of an interface sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSyncReport {
    pub claimed: Vec<RefId>,
    pub released: Vec<RefId>,
    pub failed: Vec<RefId>,
}

pub struct DeviceSet {
    registry: Arc<dyn RegistryClient>,
    config: SyncConfig,
    notifier: Option<Arc<SubscriptionRegistry>>,
    devices: RwLock<BTreeMap<RefId, SharedAdapter>>,
}

impl std::fmt::Debug for DeviceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSet")
            .field("owner", &self.config.owner)
            .finish_non_exhaustive()
    }
}

impl DeviceSet {
    pub fn new(registry: Arc<dyn RegistryClient>, config: SyncConfig) -> Self {
        Self {
            registry,
            config,
            notifier: None,
            devices: RwLock::new(BTreeMap::new()),
        }
    }

    /// Attach a subscription registry to every adapter loaded from now on
    pub fn with_notifier(mut self, notifier: Arc<SubscriptionRegistry>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn wrap(&self, adapter: DeviceAdapter) -> SharedAdapter {
        let adapter = match &self.notifier {
            Some(notifier) => adapter.with_notifier(notifier.clone()),
            None => adapter,
        };
        Arc::new(Mutex::new(adapter))
    }

    /// Adapter for `ref_id`, loading it on first use
    pub async fn get_or_load(&self, ref_id: RefId) -> Result<SharedAdapter> {
        if let Some(adapter) = self.get(ref_id).await {
            return Ok(adapter);
        }

        let adapter = DeviceAdapter::load(self.registry.clone(), ref_id, &self.config).await?;
        let mut devices = self.devices.write().await;
        // Another task may have loaded it meanwhile
        let entry = devices
            .entry(ref_id)
            .or_insert_with(|| self.wrap(adapter))
            .clone();
        Ok(entry)
    }

    /// Add an adapter, replacing any previous one for the same device
    pub async fn insert(&self, adapter: DeviceAdapter) -> SharedAdapter {
        let ref_id = adapter.ref_id();
        let shared = self.wrap(adapter);
        self.devices.write().await.insert(ref_id, shared.clone());
        shared
    }

    /// Create a registry device and add its adapter
    pub async fn create(&self, name: &str) -> Result<SharedAdapter> {
        let adapter = DeviceAdapter::create(self.registry.clone(), &self.config, name).await?;
        Ok(self.insert(adapter).await)
    }

    pub async fn remove(&self, ref_id: RefId) -> Option<SharedAdapter> {
        let removed = self.devices.write().await.remove(&ref_id);
        if removed.is_some() {
            if let Some(notifier) = &self.notifier {
                notifier.remove_device(ref_id).await;
            }
            debug!(ref_id, "Adapter removed");
        }
        removed
    }

    pub async fn get(&self, ref_id: RefId) -> Option<SharedAdapter> {
        self.devices.read().await.get(&ref_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    pub async fn ref_ids(&self) -> Vec<RefId> {
        self.devices.read().await.keys().copied().collect()
    }

    async fn adapters(&self) -> Vec<(RefId, SharedAdapter)> {
        self.devices
            .read()
            .await
            .iter()
            .map(|(id, adapter)| (*id, adapter.clone()))
            .collect()
    }

    /// Replay the pending value of every adapter that has one
    pub async fn reconcile_all(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for (ref_id, adapter) in self.adapters().await {
            let outcome = adapter.lock().await.reconcile().await;
            match outcome {
                None => {}
                Some(WriteOutcome::Deferred) => report.still_failing.push(ref_id),
                Some(_) => report.replayed.push(ref_id),
            }
        }

        if report.attempted() > 0 {
            info!(
                replayed = report.replayed.len(),
                still_failing = report.still_failing.len(),
                "Replayed pending values"
            );
        }
        report
    }

    /// Probe the registry and replay pending values once it answers
    pub async fn on_reconnect(&self) -> Result<ReconcileReport> {
        if !self.registry.health_check().await? {
            return Err(SyncError::connection(
                "registry health check failed, pending values kept",
            ));
        }
        Ok(self.reconcile_all().await)
    }

    /// Claim the interface of every adapter in `wanted` for the configured
    /// owner and release it on the others.
    pub async fn sync_interfaces(&self, wanted: &BTreeSet<RefId>) -> InterfaceSyncReport {
        let mut report = InterfaceSyncReport::default();

        for (ref_id, adapter) in self.adapters().await {
            let result = adapter
                .lock()
                .await
                .claim_for_owner(wanted.contains(&ref_id))
                .await;
            match result {
                Ok(InterfaceClaim::Claimed) => report.claimed.push(ref_id),
                Ok(InterfaceClaim::Released) => report.released.push(ref_id),
                Ok(InterfaceClaim::Unchanged) => {}
                Err(e) => {
                    log_structured_error!(e, "device_set", "sync_interfaces", ref_id);
                    report.failed.push(ref_id);
                }
            }
        }

        if !report.failed.is_empty() {
            warn!(failed = report.failed.len(), "Interface sync incomplete");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StoredDevice;
    use crate::mock::MockRegistry;

    #[tokio::test]
    async fn test_get_or_load_reuses_adapter() {
        let mock = Arc::new(MockRegistry::with_device(1, StoredDevice::named("A")));
        let set = DeviceSet::new(mock.clone(), SyncConfig::default());

        let first = set.get_or_load(1).await.unwrap();
        let second = set.get_or_load(1).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(set.len().await, 1);
        assert_eq!(
            mock.count(|c| matches!(c, crate::mock::RegistryCall::GetDevice(1))),
            1
        );
    }

    #[tokio::test]
    async fn test_remove_drops_subscriptions() {
        let mock = Arc::new(MockRegistry::with_device(1, StoredDevice::named("A")));
        let notifier = Arc::new(SubscriptionRegistry::new());
        let set = DeviceSet::new(mock, SyncConfig::default()).with_notifier(notifier.clone());
        set.get_or_load(1).await.unwrap();
        notifier.subscribe(1, 1).await;

        assert!(set.remove(1).await.is_some());
        assert!(set.is_empty().await);
        assert!(notifier.subscribers_of(1).await.is_empty());
    }

    #[tokio::test]
    async fn test_unhealthy_registry_keeps_pending() {
        let mock = Arc::new(MockRegistry::with_device(1, StoredDevice::named("A")));
        let set = DeviceSet::new(mock.clone(), SyncConfig::default());
        let adapter = set.get_or_load(1).await.unwrap();
        mock.fail_writes(true);
        adapter
            .lock()
            .await
            .set_value(4.0, crate::device::WriteProtocol::DirectSet)
            .await;
        mock.set_unhealthy(true);

        assert!(matches!(
            set.on_reconnect().await,
            Err(SyncError::Connection(_))
        ));
        assert_eq!(adapter.lock().await.pending_value(), Some(4.0));
    }
}
