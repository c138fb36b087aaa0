//! Shared data model for the SimTemp sensor client.
//!
//! This crate holds the value types exchanged between the driver seam and
//! the session layer, the session error taxonomy, device constants, and the
//! threshold alert evaluator.

pub mod alert;
pub mod constants;
pub mod error;
pub mod types;

pub use alert::is_alert;
pub use error::{Result, SessionError};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
