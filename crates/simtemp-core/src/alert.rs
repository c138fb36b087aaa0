//! Threshold alert evaluation.
//!
//! An alert is raised when the device itself flagged a threshold edge, or
//! when the reading meets a locally cached threshold. The cached value is a
//! best-effort shadow of the device register and may briefly lag a write.

use crate::constants::THRESHOLD_DISABLED;
use crate::types::Sample;

/// Decide whether `sample` should raise an alert.
///
/// A `cached_threshold_mc` of zero (or below) disables the local comparison;
/// the device edge flag is honored regardless.
///
/// # Examples
///
/// ```
/// use simtemp_core::{Sample, is_alert, constants::FLAG_THRESHOLD_EDGE};
///
/// assert!(is_alert(&Sample::new(0, 30_000, 0), 25_000));
/// assert!(!is_alert(&Sample::new(0, 30_000, 0), 0));
/// assert!(is_alert(&Sample::new(0, 10_000, FLAG_THRESHOLD_EDGE), 0));
/// ```
#[inline]
#[must_use]
pub fn is_alert(sample: &Sample, cached_threshold_mc: i32) -> bool {
    sample.has_threshold_edge()
        || (cached_threshold_mc > THRESHOLD_DISABLED && sample.temp_mc >= cached_threshold_mc)
}
