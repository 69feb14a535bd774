//! Error handling helper functions
//!
//! Safe alternatives to unwrap() and small parsing helpers

use crate::error::{Result, SyncError};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Safely acquire a mutex lock, recovering from poisoned state if necessary
pub fn safe_mutex_lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> Result<MutexGuard<'a, T>> {
    match mutex.lock() {
        Ok(guard) => Ok(guard),
        Err(poisoned) => {
            warn!(
                "Mutex poisoned in {}, recovering with potentially inconsistent state",
                context
            );
            Ok(poisoned.into_inner())
        }
    }
}

/// Parse a boolean switch as written in environment variables
pub fn parse_bool_flag<S: AsRef<str>>(value: S, context: &str) -> Result<bool> {
    match value.as_ref().trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(SyncError::invalid_input(format!(
            "Failed to parse {context} - {other}: expected a boolean"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_mutex_lock() {
        let mutex = Mutex::new(5);
        let guard = safe_mutex_lock(&mutex, "test").unwrap();
        assert_eq!(*guard, 5);
    }

    #[test]
    fn test_safe_mutex_lock_recovers_poisoned() {
        let mutex = std::sync::Arc::new(Mutex::new(1));
        let clone = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(mutex.is_poisoned());
        assert_eq!(*safe_mutex_lock(&mutex, "poisoned").unwrap(), 1);
    }

    #[test]
    fn test_parse_bool_flag() {
        assert!(parse_bool_flag("TRUE", "flag").unwrap());
        assert!(parse_bool_flag("on", "flag").unwrap());
        assert!(!parse_bool_flag("0", "flag").unwrap());
        assert!(parse_bool_flag("maybe", "flag").is_err());
    }
}
