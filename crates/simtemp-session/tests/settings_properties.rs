//! Property-based tests for the settings protocol.
//!
//! Arbitrary mixes of valid and invalid field values are applied to a mock
//! device; the returned configuration must reflect exactly the fields that
//! succeeded and every failing field must be reported once.

mod common;

use proptest::prelude::*;
use simtemp_core::constants::{MAX_SAMPLING_PERIOD_MS, MIN_SAMPLING_PERIOD_MS};
use simtemp_core::{OperationMode, SimulationMode};
use simtemp_session::{SettingKey, SettingsUpdate};
use std::time::Duration;

fn mode_text() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("one-shot".to_string()),
        Just("continuous".to_string()),
        "[a-z]{1,8}",
    ]
}

fn simulation_text() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("normal".to_string()),
        Just("noisy".to_string()),
        Just("ramp".to_string()),
        "[a-z]{1,8}",
    ]
}

fn number_text() -> impl Strategy<Value = String> {
    prop_oneof![
        (-1_000i64..200_000).prop_map(|n| n.to_string()),
        "[a-z]{1,4}",
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: the snapshot reflects the succeeding subset and the failure
    /// list names each failing field once.
    #[test]
    fn prop_report_matches_outcome(
        operation in proptest::option::of(mode_text()),
        simulation in proptest::option::of(simulation_text()),
        period in proptest::option::of(number_text()),
        threshold in proptest::option::of(number_text()),
    ) {
        let (session, _handle) = common::mock_session();
        let mut update = SettingsUpdate::new();
        let fields = [
            (SettingKey::OperationMode, &operation),
            (SettingKey::SimulationMode, &simulation),
            (SettingKey::SamplingPeriodMs, &period),
            (SettingKey::ThresholdMc, &threshold),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                update.insert(key.as_str(), value.clone());
            }
        }

        let report = runtime().block_on(session.apply_settings(&update)).unwrap();

        let expect_mode = operation.as_deref().and_then(|v| v.parse::<OperationMode>().ok());
        let expect_sim = simulation.as_deref().and_then(|v| v.parse::<SimulationMode>().ok());
        let expect_period = period
            .as_deref()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|p| (MIN_SAMPLING_PERIOD_MS..=MAX_SAMPLING_PERIOD_MS).contains(p));
        let expect_threshold = threshold
            .as_deref()
            .and_then(|v| v.parse::<i32>().ok())
            .filter(|t| (0..=150_000).contains(t));

        let expected_failures = [
            operation.is_some() && expect_mode.is_none(),
            simulation.is_some() && expect_sim.is_none(),
            period.is_some() && expect_period.is_none(),
            threshold.is_some() && expect_threshold.is_none(),
        ]
        .into_iter()
        .filter(|failed| *failed)
        .count();
        prop_assert_eq!(report.failures.len(), expected_failures);

        if let Some(mode) = expect_mode {
            prop_assert_eq!(report.config.operation_mode, Some(mode));
        }
        if let Some(mode) = expect_sim {
            prop_assert_eq!(report.config.simulation_mode, Some(mode));
        }
        prop_assert_eq!(report.config.sampling_period_ms, Some(expect_period.unwrap_or(100)));
        prop_assert_eq!(report.config.threshold_mc, Some(expect_threshold.unwrap_or(0)));
    }

    /// Property: a one-shot read leaves mode and period as it found them.
    #[test]
    fn prop_read_once_preserves_configuration(
        continuous in any::<bool>(),
        period in MIN_SAMPLING_PERIOD_MS..=MAX_SAMPLING_PERIOD_MS,
    ) {
        let (session, handle) = common::mock_session();
        let mode = if continuous { OperationMode::Continuous } else { OperationMode::OneShot };

        let rt = runtime();
        rt.block_on(async {
            session.set_operation_mode(mode).await.unwrap();
            session.set_sampling_period_ms(period).await.unwrap();
            session.read_once(Duration::from_millis(500)).await.unwrap();
        });

        prop_assert_eq!(handle.operation_mode(), mode);
        prop_assert_eq!(handle.sampling_period_ms(), period);
    }
}
