//! Error taxonomy for sensor session operations.
//!
//! Every error carries a message that callers may present verbatim. The
//! variants map onto the four failure kinds the session distinguishes:
//! the device is absent, a read timed out, the device broke a contract, or
//! anything else the device reported. `Busy` and `Io` cover the session's
//! own exclusive-access contract and local file I/O.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The kernel module or device node is not present at all.
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    /// A read did not complete within the requested bound. Retriable.
    #[error("Read timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The device returned data that violates its documented contract.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Any other device-reported failure.
    #[error("Device error: {0}")]
    Device(String),

    /// The operation was refused because a continuous stream holds the device.
    #[error("Device busy: {0} is not allowed while streaming")]
    Busy(&'static str),

    /// A caller-supplied value could not be coerced for a field.
    #[error("Invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Create a timeout error from a millisecond bound.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a protocol violation error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation(message.into())
    }

    /// Create a generic device error.
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device(message.into())
    }

    /// Create an invalid value error.
    pub fn invalid_value(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            value: value.into(),
        }
    }

    /// Returns `true` for the recoverable timeout kind.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
