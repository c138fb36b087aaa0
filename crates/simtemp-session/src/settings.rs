//! Settings protocol: textual field updates applied in a fixed order.
//!
//! Callers hand over raw `(key, value)` text pairs, as typed into a form or
//! given on a command line. Each recognised key is coerced to its typed value
//! and written through the matching driver setter. A failure on one field
//! never prevents the remaining fields from being attempted.

use simtemp_core::{DriverConfig, OperationMode, Result, SessionError, SimulationMode};
use simtemp_driver::SensorDriver;
use std::collections::BTreeMap;
use std::fmt;

/// A configuration field the session knows how to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingKey {
    OperationMode,
    SimulationMode,
    SamplingPeriodMs,
    ThresholdMc,
}

impl SettingKey {
    /// Order in which fields are written. The operation mode goes first so
    /// that later writes land on a device already in the requested mode.
    pub const APPLY_ORDER: [SettingKey; 4] = [
        SettingKey::OperationMode,
        SettingKey::SimulationMode,
        SettingKey::SamplingPeriodMs,
        SettingKey::ThresholdMc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::OperationMode => "operation_mode",
            SettingKey::SimulationMode => "simulation_mode",
            SettingKey::SamplingPeriodMs => "sampling_period_ms",
            SettingKey::ThresholdMc => "threshold_mc",
        }
    }

    /// Resolve a key, accepting the device attribute names as aliases.
    pub fn parse(key: &str) -> Option<Self> {
        match key.trim() {
            "operation_mode" => Some(SettingKey::OperationMode),
            "simulation_mode" | "mode" => Some(SettingKey::SimulationMode),
            "sampling_period_ms" | "sampling_ms" => Some(SettingKey::SamplingPeriodMs),
            "threshold_mc" | "threshold_mC" => Some(SettingKey::ThresholdMc),
            _ => None,
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A coerced field value, ready to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Setting {
    OperationMode(OperationMode),
    SimulationMode(SimulationMode),
    SamplingPeriodMs(u32),
    ThresholdMc(i32),
}

impl Setting {
    /// Coerce raw text for `key`.
    pub(crate) fn coerce(key: SettingKey, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        Ok(match key {
            SettingKey::OperationMode => Setting::OperationMode(raw.parse()?),
            SettingKey::SimulationMode => Setting::SimulationMode(raw.parse()?),
            SettingKey::SamplingPeriodMs => Setting::SamplingPeriodMs(
                raw.parse()
                    .map_err(|_| SessionError::invalid_value("sampling_period_ms", raw))?,
            ),
            SettingKey::ThresholdMc => Setting::ThresholdMc(
                raw.parse()
                    .map_err(|_| SessionError::invalid_value("threshold_mc", raw))?,
            ),
        })
    }

    /// Write through the matching driver setter.
    pub(crate) fn write<D: SensorDriver>(self, driver: &mut D) -> simtemp_driver::Result<()> {
        match self {
            Setting::OperationMode(mode) => driver.set_operation_mode(mode),
            Setting::SimulationMode(mode) => driver.set_simulation_mode(mode),
            Setting::SamplingPeriodMs(period) => driver.set_sampling_period_ms(period),
            Setting::ThresholdMc(threshold) => driver.set_threshold_mc(threshold),
        }
    }
}

/// Raw field updates keyed by name.
///
/// # Examples
///
/// ```
/// use simtemp_session::{SettingKey, SettingsUpdate};
///
/// let update = SettingsUpdate::new()
///     .with("threshold_mc", "45000")
///     .with("sampling_ms", "200");
///
/// assert_eq!(update.get(SettingKey::ThresholdMc), Some("45000"));
/// assert_eq!(update.get(SettingKey::SamplingPeriodMs), Some("200"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    fields: BTreeMap<String, String>,
}

impl SettingsUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, replacing any earlier value for the same key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Raw value for `key`, looked up by canonical name or alias.
    ///
    /// The canonical name wins when both it and an alias are present.
    pub fn get(&self, key: SettingKey) -> Option<&str> {
        self.selected(key).map(|(_, value)| value)
    }

    fn selected(&self, key: SettingKey) -> Option<(&str, &str)> {
        self.fields
            .get_key_value(key.as_str())
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|(name, _)| SettingKey::parse(name) == Some(key))
            })
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Entries that name an already selected field through another alias.
    ///
    /// These are never written.
    ///
    /// ```
    /// use simtemp_session::{SettingKey, SettingsUpdate};
    ///
    /// let update = SettingsUpdate::new()
    ///     .with("threshold_mc", "1000")
    ///     .with("threshold_mC", "2000");
    ///
    /// assert_eq!(update.get(SettingKey::ThresholdMc), Some("1000"));
    /// assert_eq!(
    ///     update.duplicate_keys().collect::<Vec<_>>(),
    ///     vec![("threshold_mC", SettingKey::ThresholdMc)]
    /// );
    /// ```
    pub fn duplicate_keys(&self) -> impl Iterator<Item = (&str, SettingKey)> {
        self.fields.keys().filter_map(move |name| {
            let key = SettingKey::parse(name)?;
            let (selected, _) = self.selected(key)?;
            (selected != name.as_str()).then_some((name.as_str(), key))
        })
    }

    /// Keys that do not name any known field.
    pub fn unknown_keys(&self) -> impl Iterator<Item = &str> {
        self.fields
            .keys()
            .filter(|name| SettingKey::parse(name).is_none())
            .map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for SettingsUpdate
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut update = SettingsUpdate::new();
        for (key, value) in iter {
            update.insert(key, value);
        }
        update
    }
}

/// One field that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub key: String,
    pub message: String,
}

impl FieldError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

/// Outcome of applying a [`SettingsUpdate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsReport {
    /// Configuration re-read after the pass.
    pub config: DriverConfig,

    /// Fields written successfully, in apply order.
    pub applied: Vec<SettingKey>,

    /// Fields that failed, in apply order, followed by duplicate aliases and
    /// unknown keys.
    pub failures: Vec<FieldError>,
}

impl SettingsReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn was_applied(&self, key: SettingKey) -> bool {
        self.applied.contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SettingKey::OperationMode, " continuous ", Setting::OperationMode(OperationMode::Continuous))]
    #[case(SettingKey::SimulationMode, "ramp", Setting::SimulationMode(SimulationMode::Ramp))]
    #[case(SettingKey::SamplingPeriodMs, "250", Setting::SamplingPeriodMs(250))]
    #[case(SettingKey::ThresholdMc, "-5", Setting::ThresholdMc(-5))]
    fn test_coerce_valid(#[case] key: SettingKey, #[case] raw: &str, #[case] expected: Setting) {
        assert_eq!(Setting::coerce(key, raw).unwrap(), expected);
    }

    #[rstest]
    #[case(SettingKey::OperationMode, "bogus")]
    #[case(SettingKey::SimulationMode, "sawtooth")]
    #[case(SettingKey::SamplingPeriodMs, "fast")]
    #[case(SettingKey::SamplingPeriodMs, "-1")]
    #[case(SettingKey::ThresholdMc, "45.5")]
    fn test_coerce_invalid(#[case] key: SettingKey, #[case] raw: &str) {
        let result = Setting::coerce(key, raw);
        assert!(matches!(result, Err(SessionError::InvalidValue { .. })));
    }

    #[test]
    fn test_aliases_resolve() {
        assert_eq!(SettingKey::parse("threshold_mC"), Some(SettingKey::ThresholdMc));
        assert_eq!(SettingKey::parse("mode"), Some(SettingKey::SimulationMode));
        assert_eq!(SettingKey::parse("colour"), None);
    }

    #[test]
    fn test_unknown_keys() {
        let update: SettingsUpdate = [("threshold_mc", "1"), ("colour", "red")]
            .into_iter()
            .collect();
        assert_eq!(update.unknown_keys().collect::<Vec<_>>(), vec!["colour"]);
        assert_eq!(update.len(), 2);
    }

    #[test]
    fn test_canonical_key_wins_over_alias() {
        let update: SettingsUpdate = [("sampling_ms", "50"), ("sampling_period_ms", "200")]
            .into_iter()
            .collect();
        assert_eq!(update.get(SettingKey::SamplingPeriodMs), Some("200"));
        assert_eq!(
            update.duplicate_keys().collect::<Vec<_>>(),
            vec![("sampling_ms", SettingKey::SamplingPeriodMs)]
        );
    }

    #[test]
    fn test_two_aliases_keep_first() {
        let update: SettingsUpdate = [("mode", "ramp"), ("simulation_mode ", "noisy")]
            .into_iter()
            .collect();
        assert_eq!(update.get(SettingKey::SimulationMode), Some("ramp"));
        assert_eq!(
            update.duplicate_keys().collect::<Vec<_>>(),
            vec![("simulation_mode ", SettingKey::SimulationMode)]
        );
    }

    #[test]
    fn test_no_duplicates_for_distinct_fields() {
        let update = SettingsUpdate::new()
            .with("threshold_mc", "1")
            .with("sampling_ms", "100")
            .with("colour", "red");
        assert_eq!(update.duplicate_keys().count(), 0);
    }

    #[test]
    fn test_field_error_display() {
        let error = FieldError::new("operation_mode", "Invalid value");
        assert_eq!(error.to_string(), "operation_mode: Invalid value");
    }
}
