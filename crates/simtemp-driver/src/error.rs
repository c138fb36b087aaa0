//! Error types for driver operations.
//!
//! This module defines the typed error family raised by the device driver
//! seam. Session code catches these per call and maps them onto the session
//! taxonomy; the timeout kind is kept distinct so that polling loops can tell
//! "no data yet" from a real failure.

use simtemp_core::SessionError;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors that can occur during driver operations.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// No sample became available within the bound.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The device descriptor is not open.
    #[error("Device not open")]
    NotOpen,

    /// The device refused the operation in its current state.
    #[error("Device busy: {operation}")]
    Busy { operation: String },

    /// The device rejected a configuration value.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    /// The driver module or device node is missing.
    #[error("Device unavailable: {message}")]
    Unavailable { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new busy error.
    pub fn busy(operation: impl Into<String>) -> Self {
        Self::Busy {
            operation: operation.into(),
        }
    }

    /// Create a new invalid value error.
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a generic error with custom message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Returns `true` for the "data not yet available" kind.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<DriverError> for SessionError {
    fn from(error: DriverError) -> Self {
        match error {
            DriverError::Timeout { duration_ms } => SessionError::Timeout { duration_ms },
            DriverError::Unavailable { message } => SessionError::Unavailable(message),
            other => SessionError::Device(other.to_string()),
        }
    }
}
