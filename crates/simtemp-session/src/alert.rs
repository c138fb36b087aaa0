//! Caller-side alert indicator.
//!
//! Keeps the cached threshold that [`is_alert`] compares against, and turns
//! per-sample alert evaluations into indicator transitions.

use crate::settings::{SettingKey, SettingsReport};
use simtemp_core::constants::THRESHOLD_DISABLED;
use simtemp_core::{DriverConfig, Sample, is_alert};
use tracing::debug;

/// Threshold shadow plus the current indicator state.
///
/// # Examples
///
/// ```
/// use simtemp_core::Sample;
/// use simtemp_session::AlertTracker;
///
/// let mut tracker = AlertTracker::new(30_000);
///
/// assert_eq!(tracker.observe(&Sample::new(0, 31_000, 0)), Some(true));
/// assert_eq!(tracker.observe(&Sample::new(1, 32_000, 0)), None);
/// assert_eq!(tracker.observe(&Sample::new(2, 20_000, 0)), Some(false));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertTracker {
    threshold_mc: i32,
    active: bool,
}

impl AlertTracker {
    pub fn new(threshold_mc: i32) -> Self {
        Self {
            threshold_mc,
            active: false,
        }
    }

    /// Seed from a configuration snapshot. An unreadable threshold disables
    /// the comparison.
    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(config.threshold_mc.unwrap_or(THRESHOLD_DISABLED))
    }

    pub fn threshold_mc(&self) -> i32 {
        self.threshold_mc
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Re-sync the cached threshold from a snapshot, if it could be read.
    pub fn sync_from_config(&mut self, config: &DriverConfig) {
        if let Some(threshold) = config.threshold_mc {
            self.threshold_mc = threshold;
        }
    }

    /// Follow a settings pass. Only a successful threshold write moves the
    /// cached value.
    pub fn record_settings(&mut self, report: &SettingsReport) {
        if report.was_applied(SettingKey::ThresholdMc) {
            self.sync_from_config(&report.config);
            debug!(threshold_mc = self.threshold_mc, "Alert threshold updated");
        }
    }

    /// Evaluate `sample`. Returns the new indicator value when it changes.
    pub fn observe(&mut self, sample: &Sample) -> Option<bool> {
        let alert = is_alert(sample, self.threshold_mc);
        if alert == self.active {
            return None;
        }
        self.active = alert;
        Some(alert)
    }

    /// Clear the indicator without touching the threshold.
    pub fn reset(&mut self) {
        self.active = false;
    }
}
