//! Device state synchronization against an external home-automation registry
//!
//! A [`DeviceAdapter`] mirrors one registry device: it reads attributes through
//! a full/lazy read-mode switch, tracks the device value with one step of
//! history, and writes values back through a direct-set, control-based or
//! combined write protocol. Failed writes are kept and replayed later.
//!
//! # Features
//!
//! - Registry access through the async [`RegistryClient`] trait
//! - In-memory registry with JSON snapshots
//! - Idempotent interface claim and release
//! - Error text mirrored into the registry attention flag
//! - Device-to-device value subscriptions
//! - TOML/env configuration and `tracing` logging

// Core modules
pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod subscription;
pub mod utils;

// Test support modules - available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

// Re-export main types for convenience
pub use client::{InMemoryRegistry, RefId, RegistryClient};
pub use config::{ReplayPolicy, SyncConfig};
pub use device::{
    DeviceAdapter, DeviceSet, InterfaceClaim, SharedAdapter, WriteOutcome, WriteProtocol,
};
pub use error::{Result, SyncError};
pub use subscription::{Notification, SubscriptionRegistry, ValueChangeEvent};
