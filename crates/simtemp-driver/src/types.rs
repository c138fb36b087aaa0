//! Descriptive metadata about a driver.

use serde::{Deserialize, Serialize};

/// Static driver metadata shown to the user.
///
/// Contains the driver name, a human readable description and the version
/// reported by the driver itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverInfo {
    /// Driver name (e.g., "SimTempDriver").
    pub name: String,

    /// One-line description.
    pub description: String,

    /// Version string reported by the driver, if it could be read.
    pub version: Option<String>,
}

impl DriverInfo {
    /// Create a new DriverInfo with required fields.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: None,
        }
    }

    /// Set the version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl Default for DriverInfo {
    fn default() -> Self {
        Self::new(
            "SimTempDriver",
            "Simulated temperature sensor driver for Linux.",
        )
    }
}
