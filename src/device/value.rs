//! Cached device value with one step of history and a pending slot

use serde::{Deserialize, Serialize};

/// Value the adapter believes the registry holds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueState {
    cached: f64,
    previous: f64,
    pending: Option<f64>,
}

impl Default for ValueState {
    fn default() -> Self {
        Self {
            cached: Self::UNKNOWN,
            previous: Self::UNKNOWN,
            pending: None,
        }
    }
}

impl ValueState {
    /// Sentinel for a value that has never been read or written
    pub const UNKNOWN: f64 = -1.0;

    pub fn cached(&self) -> f64 {
        self.cached
    }

    pub fn previous(&self) -> f64 {
        self.previous
    }

    pub fn pending(&self) -> Option<f64> {
        self.pending
    }

    /// Whether `value` differs from the cached value
    pub fn differs(&self, value: f64) -> bool {
        self.cached != value
    }

    /// The only mutation point for the cached value.
    /// Returns true when the value changed.
    pub(crate) fn record(&mut self, value: f64) -> bool {
        self.previous = self.cached;
        self.cached = value;
        self.previous != value
    }

    /// Keep a value whose write failed for a later replay
    pub(crate) fn defer(&mut self, value: f64) {
        self.pending = Some(value);
    }

    pub(crate) fn take_pending(&mut self) -> Option<f64> {
        self.pending.take()
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending = None;
    }
}
