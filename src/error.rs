//! Error types for the device sync adapter
//!
//! This module provides the crate error enum, structured error codes and a
//! small reporter that routes errors into `tracing` by severity.

use crate::client::RefId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error types for device sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Registry unreachable or connection dropped
    #[error("Connection error: {0}")]
    Connection(String),

    /// Registry rejected or failed a call
    #[error("Registry error: {0}")]
    Registry(String),

    /// Control command could not be resolved or was refused
    #[error("Device control error: {0}")]
    DeviceControl(String),

    /// Not found errors (devices, control pairs)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Structured error code for machine-readable error handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Connection errors (1000-1099)
    ConnectionTimeout,
    ConnectionLost,

    // Configuration errors (1200-1299)
    ConfigurationMissing,
    ConfigurationInvalid,

    // Device errors (1300-1399)
    DeviceNotFound,
    DeviceControlFailed,
    RegistryCallFailed,

    // Data errors (1400-1499)
    ParsingFailed,
    InvalidInput,

    // Internal errors (1900-1999)
    InternalError,
}

impl ErrorCode {
    /// Get numeric error code
    pub fn as_number(&self) -> u32 {
        match self {
            ErrorCode::ConnectionTimeout => 1001,
            ErrorCode::ConnectionLost => 1003,

            ErrorCode::ConfigurationMissing => 1201,
            ErrorCode::ConfigurationInvalid => 1202,

            ErrorCode::DeviceNotFound => 1301,
            ErrorCode::DeviceControlFailed => 1303,
            ErrorCode::RegistryCallFailed => 1305,

            ErrorCode::ParsingFailed => 1401,
            ErrorCode::InvalidInput => 1402,

            ErrorCode::InternalError => 1901,
        }
    }

    /// Get error category
    pub fn category(&self) -> &'static str {
        match self.as_number() {
            1000..=1099 => "connection",
            1200..=1299 => "configuration",
            1300..=1399 => "device",
            1400..=1499 => "data",
            1900..=1999 => "internal",
            _ => "unknown",
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Informational, the operation will be retried or can be ignored
    Info,
    /// Warning, degraded but recoverable
    Warning,
    /// Error, the operation failed
    Error,
    /// Critical, the adapter cannot work as configured
    Critical,
}

/// Structured error context with additional metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Error code for machine processing
    pub code: ErrorCode,
    /// Component that generated the error
    pub component: String,
    /// Operation that was being performed
    pub operation: String,
    /// Device the error relates to, if any
    pub ref_id: Option<RefId>,
    /// Additional metadata about the error
    pub metadata: HashMap<String, serde_json::Value>,
    /// Timestamp when error occurred
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    /// Create new error context
    pub fn new(code: ErrorCode, component: &str, operation: &str) -> Self {
        Self {
            code,
            component: component.to_string(),
            operation: operation.to_string(),
            ref_id: None,
            metadata: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Attach the device ref id
    pub fn with_device(mut self, ref_id: RefId) -> Self {
        self.ref_id = Some(ref_id);
        self
    }

    /// Add metadata to error context
    pub fn with_metadata<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl SyncError {
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    pub fn registry<S: Into<String>>(msg: S) -> Self {
        Self::Registry(msg.into())
    }

    pub fn device_control<S: Into<String>>(msg: S) -> Self {
        Self::DeviceControl(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Map to a structured error code
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            SyncError::Connection(_) => ErrorCode::ConnectionLost,
            SyncError::Timeout(_) => ErrorCode::ConnectionTimeout,
            SyncError::Registry(_) => ErrorCode::RegistryCallFailed,
            SyncError::DeviceControl(_) => ErrorCode::DeviceControlFailed,
            SyncError::NotFound(_) => ErrorCode::DeviceNotFound,
            SyncError::Config(_) => ErrorCode::ConfigurationInvalid,
            SyncError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ErrorCode::ConfigurationMissing
            }
            SyncError::Io(_) => ErrorCode::InternalError,
            SyncError::InvalidInput(_) => ErrorCode::InvalidInput,
            SyncError::Json(_) | SyncError::Toml(_) | SyncError::TomlSer(_) => {
                ErrorCode::ParsingFailed
            }
            SyncError::Generic(_) => ErrorCode::InternalError,
        }
    }

    /// Severity used when reporting
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SyncError::Connection(_) | SyncError::Timeout(_) => ErrorSeverity::Warning,
            SyncError::Registry(_) | SyncError::DeviceControl(_) => ErrorSeverity::Warning,
            SyncError::NotFound(_) => ErrorSeverity::Info,
            SyncError::Config(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Whether a later retry of the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Connection(_) | SyncError::Timeout(_) | SyncError::Registry(_)
        )
    }
}

/// Routes errors into `tracing` with their structured context
pub struct ErrorReporter;

impl ErrorReporter {
    /// Log an error at a level derived from its severity
    pub fn log_error(error: &SyncError, context: Option<ErrorContext>) {
        let code = error.to_error_code();
        let (component, operation, ref_id) = match &context {
            Some(ctx) => (ctx.component.as_str(), ctx.operation.as_str(), ctx.ref_id),
            None => ("unknown", "unknown", None),
        };

        match error.severity() {
            ErrorSeverity::Info => tracing::debug!(
                error_code = code.as_number(),
                category = code.category(),
                component,
                operation,
                ref_id,
                "{error}"
            ),
            ErrorSeverity::Warning => tracing::warn!(
                error_code = code.as_number(),
                category = code.category(),
                component,
                operation,
                ref_id,
                retryable = error.is_retryable(),
                "{error}"
            ),
            ErrorSeverity::Error | ErrorSeverity::Critical => tracing::error!(
                error_code = code.as_number(),
                category = code.category(),
                component,
                operation,
                ref_id,
                "{error}"
            ),
        }
    }

    /// Create an error context
    pub fn create_context(code: ErrorCode, component: &str, operation: &str) -> ErrorContext {
        ErrorContext::new(code, component, operation)
    }
}

/// Macro for easy structured error logging
#[macro_export]
macro_rules! log_structured_error {
    ($error:expr, $component:expr, $operation:expr) => {
        $crate::error::ErrorReporter::log_error(
            &$error,
            Some($crate::error::ErrorReporter::create_context(
                $error.to_error_code(),
                $component,
                $operation,
            )),
        )
    };
    ($error:expr, $component:expr, $operation:expr, $ref_id:expr) => {
        $crate::error::ErrorReporter::log_error(
            &$error,
            Some(
                $crate::error::ErrorReporter::create_context(
                    $error.to_error_code(),
                    $component,
                    $operation,
                )
                .with_device($ref_id),
            ),
        )
    };
}
