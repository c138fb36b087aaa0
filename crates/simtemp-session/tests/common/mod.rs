//! Common helpers for session integration tests.

#![allow(dead_code)]

use simtemp_core::Sample;
use simtemp_driver::mock::{MockDriver, MockDriverHandle};
use simtemp_session::{SensorSession, SessionConfig, StreamConfig, StreamEvent};
use std::time::Duration;
use tokio::sync::mpsc;

/// Session over a fresh mock device, with the module check disabled.
pub fn mock_session() -> (SensorSession<MockDriver>, MockDriverHandle) {
    let (driver, handle) = MockDriver::new().unwrap();
    let session =
        SensorSession::new(driver, SessionConfig::default().without_module_check()).unwrap();
    (session, handle)
}

/// Stream configuration with short intervals for fast tests.
pub fn fast_stream_config() -> StreamConfig {
    StreamConfig {
        poll_interval_ms: 20,
        join_timeout_ms: 200,
        channel_capacity: 32,
    }
}

/// Receive the next sample event, failing on errors or a 2 s stall.
pub async fn next_sample(rx: &mut mpsc::Receiver<StreamEvent>) -> Sample {
    match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(StreamEvent::Sample(sample))) => sample,
        other => panic!("expected a sample event, got {other:?}"),
    }
}
