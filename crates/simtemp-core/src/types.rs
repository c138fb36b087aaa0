use crate::{
    Result,
    constants::{FLAG_ONESHOT_DONE, FLAG_THRESHOLD_EDGE, SAMPLE_RECORD_SIZE, UNKNOWN},
    error::SessionError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of the device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceState {
    /// No descriptor held.
    Closed,
    /// Descriptor held, device stopped.
    OpenIdle,
    /// Device actively sampling in exactly one operation mode.
    Running,
}

impl DeviceState {
    #[inline]
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, DeviceState::Running)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeviceState::Closed => write!(f, "closed"),
            DeviceState::OpenIdle => write!(f, "open-idle"),
            DeviceState::Running => write!(f, "running"),
        }
    }
}

/// Operation mode of a running device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationMode {
    /// Exactly one sample per start/stop cycle.
    OneShot,
    /// Steady stream at the configured sampling period.
    Continuous,
}

impl OperationMode {
    /// Text accepted and reported by the device attribute.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OperationMode::OneShot => "one-shot",
            OperationMode::Continuous => "continuous",
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationMode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "one-shot" | "oneshot" | "one_shot" => Ok(OperationMode::OneShot),
            "continuous" => Ok(OperationMode::Continuous),
            other => Err(SessionError::invalid_value("operation_mode", other)),
        }
    }
}

/// How the device synthesizes its readings. Opaque to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimulationMode {
    Normal,
    Noisy,
    Ramp,
}

impl SimulationMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SimulationMode::Normal => "normal",
            SimulationMode::Noisy => "noisy",
            SimulationMode::Ramp => "ramp",
        }
    }
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SimulationMode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "normal" => Ok(SimulationMode::Normal),
            "noisy" => Ok(SimulationMode::Noisy),
            "ramp" => Ok(SimulationMode::Ramp),
            other => Err(SessionError::invalid_value("simulation_mode", other)),
        }
    }
}

/// A single temperature reading as produced by the device.
///
/// Samples are immutable values; whoever receives one owns it.
///
/// # Examples
///
/// ```
/// use simtemp_core::{Sample, constants::FLAG_ONESHOT_DONE};
///
/// let sample = Sample::new(1_000, 25_125, FLAG_ONESHOT_DONE);
/// assert!(sample.is_oneshot_done());
/// assert!(!sample.has_threshold_edge());
/// assert_eq!(sample.temp_celsius(), 25.125);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    /// Device monotonic clock, nanoseconds.
    pub timestamp_ns: u64,
    /// Temperature in milli-degrees Celsius.
    #[serde(rename = "temp_mC")]
    pub temp_mc: i32,
    /// Flag bitset, see [`crate::constants`].
    pub flags: u32,
}

impl Sample {
    #[must_use]
    pub const fn new(timestamp_ns: u64, temp_mc: i32, flags: u32) -> Self {
        Self {
            timestamp_ns,
            temp_mc,
            flags,
        }
    }

    /// Decode one packed little-endian device record.
    #[must_use]
    pub fn from_le_bytes(record: [u8; SAMPLE_RECORD_SIZE]) -> Self {
        let mut ts = [0u8; 8];
        let mut temp = [0u8; 4];
        let mut flags = [0u8; 4];
        ts.copy_from_slice(&record[0..8]);
        temp.copy_from_slice(&record[8..12]);
        flags.copy_from_slice(&record[12..16]);

        Self {
            timestamp_ns: u64::from_le_bytes(ts),
            temp_mc: i32::from_le_bytes(temp),
            flags: u32::from_le_bytes(flags),
        }
    }

    /// Encode into the packed device record layout.
    #[must_use]
    pub fn to_le_bytes(&self) -> [u8; SAMPLE_RECORD_SIZE] {
        let mut record = [0u8; SAMPLE_RECORD_SIZE];
        record[0..8].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        record[8..12].copy_from_slice(&self.temp_mc.to_le_bytes());
        record[12..16].copy_from_slice(&self.flags.to_le_bytes());
        record
    }

    #[inline]
    #[must_use]
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag == flag
    }

    #[inline]
    #[must_use]
    pub fn is_oneshot_done(&self) -> bool {
        self.has_flag(FLAG_ONESHOT_DONE)
    }

    #[inline]
    #[must_use]
    pub fn has_threshold_edge(&self) -> bool {
        self.has_flag(FLAG_THRESHOLD_EDGE)
    }

    /// Temperature in degrees Celsius.
    #[must_use]
    pub fn temp_celsius(&self) -> f64 {
        f64::from(self.temp_mc) / 1000.0
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:.3} °C @ {} ns (flags 0x{:04X})",
            self.temp_celsius(),
            self.timestamp_ns,
            self.flags
        )
    }
}

/// Opaque counters snapshot reported by the device.
///
/// The session never interprets these values; they are parsed from the
/// device's `key=value` text and handed to the caller as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub counters: BTreeMap<String, u64>,
}

impl Statistics {
    /// Parse whitespace or newline separated `key=value` pairs.
    ///
    /// Tokens that are not `key=value` with an unsigned integer value are
    /// skipped.
    ///
    /// ```
    /// use simtemp_core::Statistics;
    ///
    /// let stats = Statistics::parse("updates=42 alerts=3\nlast_error=0");
    /// assert_eq!(stats.get("updates"), Some(42));
    /// assert_eq!(stats.get("alerts"), Some(3));
    /// ```
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let counters = text
            .split_whitespace()
            .filter_map(|token| {
                let (key, value) = token.split_once('=')?;
                let value = value.parse().ok()?;
                Some((key.to_string(), value))
            })
            .collect();
        Self { counters }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<u64> {
        self.counters.get(key).copied()
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.counters {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        Ok(())
    }
}

/// Point-in-time snapshot of the device configuration.
///
/// Rebuilt on every query and never cached. Any field the device could not
/// report is `None` (or `"unknown"` for the text fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub name: String,
    pub version: String,
    pub state: Option<DeviceState>,
    pub operation_mode: Option<OperationMode>,
    pub simulation_mode: Option<SimulationMode>,
    pub threshold_mc: Option<i32>,
    pub sampling_period_ms: Option<u32>,
}

impl DriverConfig {
    /// A snapshot where nothing could be read.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN.to_string(),
            version: UNKNOWN.to_string(),
            state: None,
            operation_mode: None,
            simulation_mode: None,
            threshold_mc: None,
            sampling_period_ms: None,
        }
    }

    /// Flatten into ordered `(key, value)` pairs for presentation.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        fn or_unknown<T: fmt::Display>(value: Option<T>) -> String {
            value.map_or_else(|| UNKNOWN.to_string(), |v| v.to_string())
        }

        vec![
            ("name", self.name.clone()),
            ("version", self.version.clone()),
            ("state", or_unknown(self.state)),
            ("operation_mode", or_unknown(self.operation_mode)),
            ("simulation_mode", or_unknown(self.simulation_mode)),
            ("threshold_mc", or_unknown(self.threshold_mc)),
            ("sampling_period_ms", or_unknown(self.sampling_period_ms)),
        ]
    }
}
