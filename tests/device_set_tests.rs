//! Device set tests: shared adapters, bulk replay and interface sync

use pretty_assertions::assert_eq;
use registry_device_sync::client::{RegistrySnapshot, StoredDevice};
use registry_device_sync::device::InterfaceSyncReport;
use registry_device_sync::mock::{MockRegistry, RegistryCall};
use registry_device_sync::{DeviceSet, SubscriptionRegistry, WriteOutcome, WriteProtocol};
use rstest::{fixture, rstest};
use std::collections::BTreeSet;
use std::sync::Arc;

mod common;
use common::{dimmer, test_config};

fn owned_by(owner: &str) -> StoredDevice {
    StoredDevice {
        interface: owner.to_string(),
        ..dimmer()
    }
}

/// 1 unowned, 2 owned by us, 3 owned by another integration
#[fixture]
fn mock() -> Arc<MockRegistry> {
    Arc::new(MockRegistry::from_snapshot(
        RegistrySnapshot::default()
            .with_device(1, owned_by(""))
            .with_device(2, owned_by("MyApp"))
            .with_device(3, owned_by("OtherApp")),
    ))
}

async fn load_all(set: &DeviceSet) {
    for ref_id in [1, 2, 3] {
        set.get_or_load(ref_id).await.unwrap();
    }
}

#[rstest]
#[tokio::test]
async fn test_sync_interfaces(mock: Arc<MockRegistry>) {
    let set = DeviceSet::new(mock.clone(), test_config());
    load_all(&set).await;

    let wanted: BTreeSet<_> = [1, 3].into_iter().collect();
    let report = set.sync_interfaces(&wanted).await;

    assert_eq!(
        report,
        InterfaceSyncReport {
            claimed: vec![1],
            released: vec![2],
            failed: vec![],
        }
    );
    assert_eq!(mock.device(1).await.unwrap().interface, "MyApp");
    assert_eq!(mock.device(2).await.unwrap().interface, "");
    assert_eq!(mock.device(3).await.unwrap().interface, "OtherApp");

    // Second pass changes nothing
    assert_eq!(set.sync_interfaces(&wanted).await, InterfaceSyncReport::default());
}

#[rstest]
#[tokio::test]
async fn test_sync_interfaces_reports_failures(mock: Arc<MockRegistry>) {
    let set = DeviceSet::new(mock.clone(), test_config());
    load_all(&set).await;
    mock.fail_all(true);

    let report = set.sync_interfaces(&BTreeSet::new()).await;

    assert_eq!(report.failed, vec![1, 2, 3]);
}

#[rstest]
#[tokio::test]
async fn test_reconcile_all_after_outage(mock: Arc<MockRegistry>) {
    let set = DeviceSet::new(mock.clone(), test_config());
    load_all(&set).await;

    mock.fail_writes(true);
    for ref_id in [1, 2] {
        let adapter = set.get(ref_id).await.unwrap();
        let outcome = adapter
            .lock()
            .await
            .set_value(100.0, WriteProtocol::ControlBased)
            .await;
        assert_eq!(outcome, WriteOutcome::Deferred);
    }
    mock.fail_writes(false);

    let report = set.on_reconnect().await.unwrap();

    assert_eq!(report.replayed, vec![1, 2]);
    assert!(report.still_failing.is_empty());
    assert_eq!(mock.device(1).await.unwrap().value, 100.0);
    assert_eq!(mock.device(2).await.unwrap().value, 100.0);
    assert_eq!(mock.count(|c| matches!(c, RegistryCall::HealthCheck)), 1);

    // Nothing left to replay
    assert_eq!(set.reconcile_all().await.attempted(), 0);
}

#[rstest]
#[tokio::test]
async fn test_concurrent_writers_share_one_adapter(mock: Arc<MockRegistry>) {
    let set = Arc::new(DeviceSet::new(mock.clone(), test_config()));

    let mut handles = Vec::new();
    for value in [0.0, 100.0, 50.0, 25.0] {
        let set = set.clone();
        handles.push(tokio::spawn(async move {
            let adapter = set.get_or_load(2).await.unwrap();
            let mut adapter = adapter.lock().await;
            adapter.set_value(value, WriteProtocol::ControlBased).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), WriteOutcome::Written);
    }

    assert_eq!(set.len().await, 1);
    let adapter = set.get(2).await.unwrap();
    let adapter = adapter.lock().await;
    assert_eq!(
        mock.device(2).await.unwrap().value,
        adapter.cached_value()
    );
    assert_eq!(
        mock.count(|c| matches!(c, RegistryCall::ControlDescriptors(2))),
        1
    );
}

#[rstest]
#[tokio::test]
async fn test_create_and_remove(mock: Arc<MockRegistry>) {
    let notifier = Arc::new(SubscriptionRegistry::new());
    let set = DeviceSet::new(mock.clone(), test_config()).with_notifier(notifier.clone());

    let created = set.create("Garage").await.unwrap();
    let ref_id = created.lock().await.ref_id();
    notifier.subscribe(1, ref_id).await;

    assert_eq!(ref_id, 4);
    assert_eq!(set.ref_ids().await, vec![4]);
    assert_eq!(mock.device(4).await.unwrap().interface, "MyApp");

    assert!(set.remove(ref_id).await.is_some());
    assert!(set.remove(ref_id).await.is_none());
    assert!(notifier.publishers_of(1).await.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_loaded_adapters_publish(mock: Arc<MockRegistry>) {
    let notifier = Arc::new(SubscriptionRegistry::new());
    let mut rx = notifier.receiver();
    notifier.subscribe(3, 1).await;
    let set = DeviceSet::new(mock, test_config()).with_notifier(notifier);

    let adapter = set.get_or_load(1).await.unwrap();
    adapter
        .lock()
        .await
        .set_value(0.0, WriteProtocol::DirectSet)
        .await;

    let notification = rx.recv().await.unwrap();
    assert_eq!(notification.subscriber, 3);
    assert_eq!(notification.event.ref_id, 1);
    assert_eq!(notification.event.value, 0.0);
}
