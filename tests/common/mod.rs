//! Common test fixtures

#![allow(dead_code)]

use registry_device_sync::client::{ControlUse, PairValue, StatusPair, StoredDevice};
use registry_device_sync::mock::MockRegistry;
use registry_device_sync::{DeviceAdapter, RefId, SyncConfig};
use std::sync::Arc;

/// Ref id used by the single-device scenarios
pub const DEVICE_REF: RefId = 42;

/// Live dimmer with no attention, no owner and the value unset
pub fn dimmer() -> StoredDevice {
    StoredDevice::named("Hall Dimmer")
        .with_pair(StatusPair::single(0.0, "Off", ControlUse::Off))
        .with_pair(StatusPair {
            value: PairValue::Range {
                start: 1.0,
                end: 99.0,
            },
            status: "Dim".to_string(),
            control_use: ControlUse::Dim,
            render: registry_device_sync::client::ControlRender::Slider,
            include_values: true,
        })
        .with_pair(StatusPair::single(100.0, "On", ControlUse::On))
}

pub fn mock_with(ref_id: RefId, device: StoredDevice) -> Arc<MockRegistry> {
    Arc::new(MockRegistry::with_device(ref_id, device))
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        owner: "MyApp".to_string(),
        ..SyncConfig::default()
    }
}

/// Adapter for `DEVICE_REF` with the call log cleared after loading
pub async fn loaded(mock: &Arc<MockRegistry>, config: &SyncConfig) -> DeviceAdapter {
    let adapter = DeviceAdapter::load(mock.clone(), DEVICE_REF, config)
        .await
        .expect("device should load");
    mock.clear_calls();
    adapter
}
