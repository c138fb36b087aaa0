//! Property-based tests for threshold alert evaluation.
//!
//! These tests use proptest to check the alert truth table over the full
//! range of temperatures, flag sets and thresholds.

use proptest::prelude::*;
use simtemp_core::constants::{FLAG_ONESHOT_DONE, FLAG_THRESHOLD_EDGE};
use simtemp_core::{Sample, is_alert};

/// Strategy for arbitrary flag sets without the edge bit.
fn flags_without_edge() -> impl Strategy<Value = u32> {
    any::<u32>().prop_map(|f| f & !FLAG_THRESHOLD_EDGE)
}

proptest! {
    /// Property: the device edge flag always raises an alert.
    #[test]
    fn prop_edge_flag_always_alerts(
        temp_mc in any::<i32>(),
        flags in any::<u32>(),
        threshold in any::<i32>(),
    ) {
        let sample = Sample::new(0, temp_mc, flags | FLAG_THRESHOLD_EDGE);
        prop_assert!(is_alert(&sample, threshold));
    }

    /// Property: a positive threshold alerts exactly when it is reached.
    #[test]
    fn prop_positive_threshold_compares(
        temp_mc in any::<i32>(),
        flags in flags_without_edge(),
        threshold in 1i32..=i32::MAX,
    ) {
        let sample = Sample::new(0, temp_mc, flags);
        prop_assert_eq!(is_alert(&sample, threshold), temp_mc >= threshold);
    }

    /// Property: a zero or negative threshold never alerts without the edge flag.
    #[test]
    fn prop_disabled_threshold_never_alerts(
        temp_mc in any::<i32>(),
        flags in flags_without_edge(),
        threshold in i32::MIN..=0i32,
    ) {
        let sample = Sample::new(0, temp_mc, flags);
        prop_assert!(!is_alert(&sample, threshold));
    }

    /// Property: the one-shot flag has no bearing on alerting.
    #[test]
    fn prop_oneshot_flag_is_irrelevant(
        temp_mc in any::<i32>(),
        threshold in any::<i32>(),
    ) {
        let plain = Sample::new(0, temp_mc, 0);
        let done = Sample::new(0, temp_mc, FLAG_ONESHOT_DONE);
        prop_assert_eq!(is_alert(&plain, threshold), is_alert(&done, threshold));
    }
}
