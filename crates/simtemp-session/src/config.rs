//! Session and stream configuration.
//!
//! Both structs deserialize with every field optional, so a configuration
//! file only needs to name the values it overrides.

use serde::{Deserialize, Serialize};
use simtemp_core::constants::{
    DEFAULT_JOIN_TIMEOUT_MS, DEFAULT_MODULE_NAME, DEFAULT_MODULES_PATH, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_READ_TIMEOUT_MS, MIN_SAMPLING_PERIOD_MS,
};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`SensorSession`](crate::SensorSession).
///
/// # Examples
///
/// ```
/// use simtemp_session::SessionConfig;
///
/// let config = SessionConfig::default().without_module_check();
/// assert!(!config.check_module);
/// assert_eq!(config.min_sampling_period_ms, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Loaded-modules listing consulted by the availability check.
    pub modules_path: PathBuf,

    /// Module name that must appear in the listing.
    pub module_name: String,

    /// Run the availability check at construction.
    pub check_module: bool,

    /// Sampling period forced for the duration of a one-shot read.
    pub min_sampling_period_ms: u32,

    /// Default bound for one-shot reads.
    pub read_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            modules_path: PathBuf::from(DEFAULT_MODULES_PATH),
            module_name: DEFAULT_MODULE_NAME.to_string(),
            check_module: true,
            min_sampling_period_ms: MIN_SAMPLING_PERIOD_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    /// Skip the loaded-module check (mock and simulated devices).
    pub fn without_module_check(mut self) -> Self {
        self.check_module = false;
        self
    }

    /// Consult a different modules listing.
    pub fn modules_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.modules_path = path.into();
        self
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Configuration for a [`ContinuousWorker`](crate::ContinuousWorker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Upper bound on a single readiness wait.
    pub poll_interval_ms: u64,

    /// How long `stop_stream` waits for a graceful exit before aborting.
    pub join_timeout_ms: u64,

    /// Capacity of the event channel created by the caller.
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            join_timeout_ms: DEFAULT_JOIN_TIMEOUT_MS,
            channel_capacity: 64,
        }
    }
}

impl StreamConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.modules_path, PathBuf::from("/proc/modules"));
        assert_eq!(config.module_name, "simtemp");
        assert!(config.check_module);
        assert_eq!(config.read_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"check_module": false, "read_timeout_ms": 2000}"#).unwrap();
        assert!(!config.check_module);
        assert_eq!(config.read_timeout_ms, 2000);
        assert_eq!(config.module_name, "simtemp");
        assert_eq!(config.min_sampling_period_ms, 5);
    }

    #[test]
    fn test_stream_defaults() {
        let config: StreamConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, StreamConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.join_timeout(), Duration::from_secs(1));
        assert_eq!(config.channel_capacity, 64);
    }
}
