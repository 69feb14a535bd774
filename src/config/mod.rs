//! Configuration for device sync adapters

use crate::error::{Result, SyncError};
use crate::utils::parse_bool_flag;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// What `reconcile` does with a pending value whose replay failed again
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPolicy {
    /// Replay once, then forget the value whatever the outcome
    #[default]
    DiscardAfterAttempt,
    /// Keep the value pending until a replay lands
    KeepOnFailure,
}

/// Adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Interface owner name written into claimed devices
    pub owner: String,

    /// Type string given to devices that have none
    pub default_device_type: String,

    /// Prefix for addresses of devices created by this owner
    pub address_prefix: String,

    /// Start adapters in full-update mode
    pub full_update: bool,

    /// Pending value handling after a failed replay
    pub replay_policy: ReplayPolicy,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log to file (path)
    pub file: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            owner: "DeviceSync".to_string(),
            default_device_type: "Virtual".to_string(),
            address_prefix: "AK_".to_string(),
            full_update: false,
            replay_policy: ReplayPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Default config file location (`<config dir>/device-sync/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("device-sync").join("config.toml"))
}

impl SyncConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a TOML file, then let environment variables override it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(owner) = env::var("DEVICE_SYNC_OWNER") {
            self.owner = owner;
        }

        if let Ok(device_type) = env::var("DEVICE_SYNC_DEVICE_TYPE") {
            self.default_device_type = device_type;
        }

        if let Ok(prefix) = env::var("DEVICE_SYNC_ADDRESS_PREFIX") {
            self.address_prefix = prefix;
        }

        if let Ok(full_update) = env::var("DEVICE_SYNC_FULL_UPDATE") {
            self.full_update = parse_bool_flag(&full_update, "DEVICE_SYNC_FULL_UPDATE")
                .map_err(|e| SyncError::config(e.to_string()))?;
        }

        if let Ok(replay) = env::var("DEVICE_SYNC_REPLAY") {
            self.replay_policy = match replay.to_lowercase().as_str() {
                "discard" | "discard_after_attempt" => ReplayPolicy::DiscardAfterAttempt,
                "keep" | "keep_on_failure" => ReplayPolicy::KeepOnFailure,
                _ => {
                    return Err(SyncError::config(format!(
                        "Invalid DEVICE_SYNC_REPLAY: {replay}. Use 'discard' or 'keep'"
                    )));
                }
            };
        }

        if let Ok(level) = env::var("RUST_LOG") {
            self.logging.level = level;
        }

        if let Ok(file) = env::var("DEVICE_SYNC_LOG_FILE") {
            self.logging.file = Some(file);
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            return Err(SyncError::config("Owner cannot be empty"));
        }

        if self.default_device_type.trim().is_empty() {
            return Err(SyncError::config("Default device type cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.owner, "DeviceSync");
        assert_eq!(config.default_device_type, "Virtual");
        assert_eq!(config.address_prefix, "AK_");
        assert!(!config.full_update);
        assert_eq!(config.replay_policy, ReplayPolicy::DiscardAfterAttempt);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_env_overrides() {
        temp_env::with_vars(
            [
                ("DEVICE_SYNC_OWNER", Some("MyApp")),
                ("DEVICE_SYNC_FULL_UPDATE", Some("true")),
                ("DEVICE_SYNC_REPLAY", Some("keep")),
                ("DEVICE_SYNC_DEVICE_TYPE", None),
            ],
            || {
                let config = SyncConfig::from_env().unwrap();
                assert_eq!(config.owner, "MyApp");
                assert!(config.full_update);
                assert_eq!(config.replay_policy, ReplayPolicy::KeepOnFailure);
                assert_eq!(config.default_device_type, "Virtual");
            },
        );
    }

    #[test]
    fn test_invalid_replay_env_is_config_error() {
        temp_env::with_var("DEVICE_SYNC_REPLAY", Some("sometimes"), || {
            let err = SyncConfig::from_env().unwrap_err();
            assert!(matches!(err, SyncError::Config(_)));
        });
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            owner = "MyApp"
            replay_policy = "keep_on_failure"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.owner, "MyApp");
        assert_eq!(config.replay_policy, ReplayPolicy::KeepOnFailure);
        assert_eq!(config.address_prefix, "AK_");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_from_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "owner = \"\"\n").unwrap();

        temp_env::with_var("DEVICE_SYNC_OWNER", None::<&str>, || {
            assert!(matches!(SyncConfig::load(&path), Err(SyncError::Config(_))));
        });
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = SyncConfig {
            owner: "Roundtrip".to_string(),
            ..SyncConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(SyncConfig::from_toml_str(&text).unwrap(), config);
    }
}
