//! Device-level constants shared by the driver seam and the session layer.
//!
//! The sensor exchanges fixed-size binary records over its character device
//! and exposes its configuration as plain text attributes. The values below
//! mirror what the device accepts.
//!
//! # Sample Record Layout
//!
//! ```text
//! offset  size  field
//! 0       8     timestamp_ns  (u64, little-endian, device monotonic clock)
//! 8       4     temp_mC       (i32, little-endian, milli-degrees Celsius)
//! 12      4     flags         (u32, little-endian bitset)
//! ```
//!
//! # Usage
//!
//! ```
//! use simtemp_core::constants::*;
//!
//! assert_eq!(SAMPLE_RECORD_SIZE, 16);
//! assert!((MIN_SAMPLING_PERIOD_MS..=MAX_SAMPLING_PERIOD_MS).contains(&100));
//! ```

// Sample flags

/// Set on the single sample produced by a one-shot measurement.
pub const FLAG_ONESHOT_DONE: u32 = 1 << 0;

/// Set by the device when it detects a threshold crossing.
pub const FLAG_THRESHOLD_EDGE: u32 = 1 << 1;

/// Size in bytes of one packed sample record.
pub const SAMPLE_RECORD_SIZE: usize = 16;

// Sampling period bounds (milliseconds)

/// Fastest sampling period the device supports.
pub const MIN_SAMPLING_PERIOD_MS: u32 = 5;

/// Slowest sampling period the device supports.
pub const MAX_SAMPLING_PERIOD_MS: u32 = 5000;

/// Sampling period the device boots with.
pub const DEFAULT_SAMPLING_PERIOD_MS: u32 = 100;

// Threshold

/// Threshold value that disables local alert comparison.
pub const THRESHOLD_DISABLED: i32 = 0;

/// Largest threshold the configuration surface accepts (150 °C).
pub const MAX_THRESHOLD_MC: i32 = 150_000;

// Timeouts (milliseconds)

/// Default bound for a one-shot read.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Default readiness wait per worker iteration.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default bound for a graceful worker join.
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 1000;

// Module detection

/// Kernel module name that provides the device.
pub const DEFAULT_MODULE_NAME: &str = "simtemp";

/// Listing of loaded kernel modules.
pub const DEFAULT_MODULES_PATH: &str = "/proc/modules";

/// Value shown for any configuration field the device did not report.
pub const UNKNOWN: &str = "unknown";
