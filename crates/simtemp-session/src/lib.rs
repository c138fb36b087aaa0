//! Session layer for the simulated temperature sensor.
//!
//! This crate owns the device lifecycle on behalf of a caller such as a CLI
//! or GUI:
//!
//! - [`SensorSession`]: opens the device on demand, runs mode-preserving
//!   one-shot reads, applies settings with per-field failure reporting.
//! - [`ContinuousWorker`]: readiness-driven polling task that streams
//!   samples over a channel while holding the session's stream lease.
//! - [`AlertTracker`]: caller-side threshold cache and alert indicator.
//! - [`SampleRecorder`]: optional append-only CSV sink.
//!
//! # Example
//!
//! ```no_run
//! use simtemp_driver::mock::MockDriver;
//! use simtemp_session::{AlertTracker, SensorSession, SessionConfig, SettingsUpdate};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> simtemp_core::Result<()> {
//!     let (driver, _handle) = MockDriver::new()?;
//!     let session = SensorSession::new(driver, SessionConfig::default().without_module_check())?;
//!
//!     let report = session
//!         .apply_settings(&SettingsUpdate::new().with("threshold_mc", "30000"))
//!         .await?;
//!     let mut tracker = AlertTracker::from_config(&report.config);
//!
//!     let sample = session.read_once(Duration::from_secs(1)).await?;
//!     if tracker.observe(&sample) == Some(true) {
//!         println!("ALERT at {sample}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod alert;
pub mod config;
pub mod recorder;
pub mod session;
pub mod settings;
pub mod stream;

pub use alert::AlertTracker;
pub use config::{SessionConfig, StreamConfig};
pub use recorder::SampleRecorder;
pub use session::{Restored, SensorSession, StreamLease};
pub use settings::{FieldError, SettingKey, SettingsReport, SettingsUpdate};
pub use stream::{ContinuousWorker, StreamEvent, StreamStats, StreamStatsSnapshot};
