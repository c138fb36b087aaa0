//! Sensor session manager.
//!
//! The [`SensorSession`] owns the driver handle for its whole lifetime and is
//! the only place where device state and operation mode change. It opens the
//! device on demand, runs the mode-preserving one-shot read protocol, applies
//! settings with partial-failure reporting, and hands out the driver to a
//! [`ContinuousWorker`] for streaming.
//!
//! # Exclusive access
//!
//! ```text
//!   caller ──► SensorSession ──┐
//!                              ├──► Arc<Mutex<D>> ──► device
//!   ContinuousWorker (task) ───┘
//!          │
//!          └── holds StreamLease while polling
//! ```
//!
//! While a worker holds the [`StreamLease`], every foreground call that could
//! change device state fails with [`SessionError::Busy`]. Read-only queries
//! stay available; the mutex keeps them from overlapping a worker read.

use crate::config::{SessionConfig, StreamConfig};
use crate::settings::{FieldError, Setting, SettingKey, SettingsReport, SettingsUpdate};
use crate::stream::ContinuousWorker;
use simtemp_core::{
    DeviceState, DriverConfig, OperationMode, Result, Sample, SessionError, SimulationMode,
    Statistics,
};
use simtemp_driver::{DriverInfo, SensorDriver};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Exclusive token held by a polling worker.
///
/// At most one lease exists per session at a time. Dropping it releases the
/// device back to foreground callers.
#[derive(Debug)]
pub struct StreamLease {
    flag: Arc<AtomicBool>,
}

impl StreamLease {
    /// Take the lease if nobody holds it.
    pub(crate) fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        debug!("Stream lease released");
    }
}

/// Result of an operation followed by best-effort restoration.
///
/// `outcome` is the primary result. Errors raised while restoring the
/// previous device configuration never replace it; they are kept in
/// `suppressed` for diagnostics.
#[derive(Debug)]
pub struct Restored<T> {
    pub outcome: Result<T>,
    pub suppressed: Vec<SessionError>,
}

impl<T> Restored<T> {
    fn bare(outcome: Result<T>) -> Self {
        Self {
            outcome,
            suppressed: Vec::new(),
        }
    }

    /// Returns `true` when every restoration step succeeded.
    pub fn is_clean(&self) -> bool {
        self.suppressed.is_empty()
    }

    pub fn into_result(self) -> Result<T> {
        self.outcome
    }
}

#[derive(Debug)]
enum ModuleCheck {
    Loaded,
    Missing,
    Unreadable(io::Error),
}

/// Look for `name` as the first column of the loaded-modules listing.
fn check_module(path: &Path, name: &str) -> ModuleCheck {
    match std::fs::read_to_string(path) {
        Ok(listing) => {
            let loaded = listing
                .lines()
                .any(|line| line.split_whitespace().next() == Some(name));
            if loaded {
                ModuleCheck::Loaded
            } else {
                ModuleCheck::Missing
            }
        }
        Err(e) => ModuleCheck::Unreadable(e),
    }
}

fn module_missing(name: &str) -> SessionError {
    SessionError::Unavailable(format!("kernel module '{name}' is not loaded"))
}

/// Session manager for one temperature sensor.
///
/// # Examples
///
/// ```
/// use simtemp_driver::mock::MockDriver;
/// use simtemp_session::{SensorSession, SessionConfig};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> simtemp_core::Result<()> {
///     let (driver, _handle) = MockDriver::new()?;
///     let session = SensorSession::new(driver, SessionConfig::default().without_module_check())?;
///
///     let sample = session.read_once(Duration::from_secs(1)).await?;
///     assert!(sample.is_oneshot_done());
///
///     session.close().await?;
///     Ok(())
/// }
/// ```
pub struct SensorSession<D: SensorDriver> {
    driver: Arc<Mutex<D>>,
    lease: Arc<AtomicBool>,
    config: SessionConfig,

    /// Set when the modules listing could not be read at construction.
    module_check_deferred: AtomicBool,
}

impl<D: SensorDriver> SensorSession<D> {
    /// Create a session that owns `driver`.
    ///
    /// When the module check is enabled and the modules listing is readable
    /// but does not name the module, fails with [`SessionError::Unavailable`].
    /// An unreadable listing defers the check to the first open.
    pub fn new(driver: D, config: SessionConfig) -> Result<Self> {
        let mut deferred = false;
        if config.check_module {
            match check_module(&config.modules_path, &config.module_name) {
                ModuleCheck::Loaded => debug!(module = %config.module_name, "Kernel module present"),
                ModuleCheck::Missing => return Err(module_missing(&config.module_name)),
                ModuleCheck::Unreadable(e) => {
                    debug!(
                        path = %config.modules_path.display(),
                        "Modules listing unreadable, deferring check: {}", e
                    );
                    deferred = true;
                }
            }
        }

        Ok(Self {
            driver: Arc::new(Mutex::new(driver)),
            lease: Arc::new(AtomicBool::new(false)),
            config,
            module_check_deferred: AtomicBool::new(deferred),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns `true` while a worker holds the stream lease.
    pub fn is_streaming(&self) -> bool {
        self.lease.load(Ordering::Acquire)
    }

    /// Create a worker that streams from this session's device.
    pub fn worker(&self, config: StreamConfig) -> ContinuousWorker<D> {
        ContinuousWorker::new(Arc::clone(&self.driver), Arc::clone(&self.lease), config)
    }

    /// Lock the driver for an operation that may change device state.
    async fn lock_exclusive(&self, operation: &'static str) -> Result<MutexGuard<'_, D>> {
        let driver = self.driver.lock().await;
        if self.is_streaming() {
            debug!(operation, "Refused while streaming");
            return Err(SessionError::Busy(operation));
        }
        Ok(driver)
    }

    /// Open the device unless it already is.
    fn ensure_open(&self, driver: &mut D) -> Result<()> {
        if driver.is_open() {
            return Ok(());
        }

        if self.module_check_deferred.load(Ordering::Acquire) {
            match check_module(&self.config.modules_path, &self.config.module_name) {
                ModuleCheck::Missing => return Err(module_missing(&self.config.module_name)),
                ModuleCheck::Loaded => self.module_check_deferred.store(false, Ordering::Release),
                ModuleCheck::Unreadable(_) => {}
            }
        }

        driver.open()?;
        info!("Device opened");
        Ok(())
    }

    /// Open the device. No-op when already open.
    pub async fn open(&self) -> Result<()> {
        let mut driver = self.driver.lock().await;
        self.ensure_open(&mut driver)
    }

    /// Stop and release the device. No-op when already closed.
    pub async fn close(&self) -> Result<()> {
        let mut driver = self.lock_exclusive("close").await?;
        if !driver.is_open() {
            return Ok(());
        }

        if let Err(e) = driver.stop() {
            warn!("Failed to stop device before close: {}", e);
        }
        driver.close()?;
        info!("Device closed");
        Ok(())
    }

    /// Take a single reading without disturbing the device configuration.
    ///
    /// See [`read_once_detailed`](Self::read_once_detailed) for the protocol.
    pub async fn read_once(&self, timeout: Duration) -> Result<Sample> {
        self.read_once_detailed(timeout).await.into_result()
    }

    /// Take a single reading and report restoration failures separately.
    ///
    /// The device is stopped, switched to one-shot mode at the minimum
    /// sampling period, started and read once. Afterwards the previous period
    /// and mode are restored, and the device is restarted if it was streaming.
    /// The sample must carry the one-shot-complete flag.
    pub async fn read_once_detailed(&self, timeout: Duration) -> Restored<Sample> {
        let mut driver = match self.lock_exclusive("read_once").await {
            Ok(driver) => driver,
            Err(e) => return Restored::bare(Err(e)),
        };
        if let Err(e) = self.ensure_open(&mut driver) {
            return Restored::bare(Err(e));
        }
        let driver = &mut *driver;

        let previous_mode = driver.get_operation_mode().ok();
        let was_running = driver.get_state().is_ok_and(DeviceState::is_running);
        let previous_period = driver.get_sampling_period_ms().ok();
        let min_period = self.config.min_sampling_period_ms;
        debug!(
            ?previous_mode,
            was_running,
            ?previous_period,
            "Starting one-shot read"
        );

        let mut period_changed = false;
        let outcome = async {
            driver.stop()?;
            if let Some(period) = previous_period
                && period != min_period
            {
                driver.set_sampling_period_ms(min_period)?;
                period_changed = true;
            }
            driver.set_operation_mode(OperationMode::OneShot)?;
            driver.start()?;
            driver.read_sample(timeout).await
        }
        .await
        .map_err(SessionError::from);

        let mut suppressed = Vec::new();
        let mut restore = |step: &'static str, result: simtemp_driver::Result<()>| {
            if let Err(e) = result {
                warn!(step, "Restoration failed after one-shot read: {}", e);
                suppressed.push(SessionError::from(e));
            }
        };

        restore("stop", driver.stop());
        if period_changed && let Some(period) = previous_period {
            restore("sampling period", driver.set_sampling_period_ms(period));
        }
        if let Some(mode) = previous_mode {
            restore("operation mode", driver.set_operation_mode(mode));
        }
        if was_running && previous_mode == Some(OperationMode::Continuous) {
            restore("restart", driver.start());
        }

        let outcome = outcome.and_then(|sample| {
            if sample.is_oneshot_done() {
                debug!(temp_mc = sample.temp_mc, "One-shot read complete");
                Ok(sample)
            } else {
                Err(SessionError::protocol(format!(
                    "one-shot sample missing DONE flag (flags=0x{:x})",
                    sample.flags
                )))
            }
        });

        Restored {
            outcome,
            suppressed,
        }
    }

    /// Stop the device if running, apply settings, then start it in continuous mode.
    ///
    /// Does not spawn a worker; pair with [`ContinuousWorker::start_stream`].
    pub async fn start_continuous(&self, update: &SettingsUpdate) -> Result<SettingsReport> {
        let mut driver = self.lock_exclusive("start_continuous").await?;
        self.ensure_open(&mut driver)?;
        if driver.get_state().is_ok_and(DeviceState::is_running) {
            driver.stop()?;
        }

        let report = self.apply_locked(&mut driver, update)?;
        driver.set_operation_mode(OperationMode::Continuous)?;
        driver.start()?;
        info!(
            period_ms = ?report.config.sampling_period_ms,
            "Continuous sampling started"
        );
        Ok(report)
    }

    /// Stop the device if it is open.
    pub async fn stop(&self) -> Result<()> {
        let mut driver = self.lock_exclusive("stop").await?;
        if driver.is_open() {
            driver.stop()?;
            debug!("Device stopped");
        }
        Ok(())
    }

    /// Apply every field in `update`, collecting failures instead of aborting.
    pub async fn apply_settings(&self, update: &SettingsUpdate) -> Result<SettingsReport> {
        let mut driver = self.lock_exclusive("apply_settings").await?;
        self.apply_locked(&mut driver, update)
    }

    fn apply_locked(&self, driver: &mut D, update: &SettingsUpdate) -> Result<SettingsReport> {
        self.ensure_open(driver)?;

        let mut applied = Vec::new();
        let mut failures = Vec::new();

        for key in SettingKey::APPLY_ORDER {
            let Some(raw) = update.get(key) else {
                continue;
            };
            let written = Setting::coerce(key, raw)
                .and_then(|setting| setting.write(driver).map_err(SessionError::from));
            match written {
                Ok(()) => {
                    debug!(key = %key, value = raw, "Setting applied");
                    applied.push(key);
                }
                Err(e) => {
                    warn!(key = %key, value = raw, "Setting rejected: {}", e);
                    failures.push(FieldError::new(key.as_str(), e.to_string()));
                }
            }
        }

        for (name, key) in update.duplicate_keys() {
            warn!(key = name, "Setting ignored, duplicate of {}", key);
            failures.push(FieldError::new(name, format!("duplicate of {key}")));
        }

        for key in update.unknown_keys() {
            failures.push(FieldError::new(key, "unknown setting"));
        }

        Ok(SettingsReport {
            config: Self::snapshot(driver),
            applied,
            failures,
        })
    }

    /// Current device configuration. Fields that cannot be read are `None`.
    pub async fn driver_config(&self) -> DriverConfig {
        let mut driver = self.driver.lock().await;
        if let Err(e) = self.ensure_open(&mut driver) {
            warn!("Reading configuration of a device that failed to open: {}", e);
        }
        Self::snapshot(&driver)
    }

    fn snapshot(driver: &D) -> DriverConfig {
        let unknown = DriverConfig::unknown();
        DriverConfig {
            name: driver.get_name().unwrap_or(unknown.name),
            version: driver.get_driver_version().unwrap_or(unknown.version),
            state: driver.get_state().ok(),
            operation_mode: driver.get_operation_mode().ok(),
            simulation_mode: driver.get_simulation_mode().ok(),
            threshold_mc: driver.get_threshold_mc().ok(),
            sampling_period_ms: driver.get_sampling_period_ms().ok(),
        }
    }

    /// Driver statistics counters.
    pub async fn stats(&self) -> Result<Statistics> {
        let mut driver = self.driver.lock().await;
        self.ensure_open(&mut driver)?;
        Ok(driver.read_stats()?)
    }

    /// Static driver metadata with the version the driver reports.
    pub async fn info(&self) -> DriverInfo {
        let driver = self.driver.lock().await;
        let info = DriverInfo::default();
        match driver.get_driver_version() {
            Ok(version) => info.with_version(version),
            Err(e) => {
                debug!("Driver version unavailable: {}", e);
                info
            }
        }
    }

    pub async fn set_operation_mode(&self, mode: OperationMode) -> Result<()> {
        let mut driver = self.lock_exclusive("set_operation_mode").await?;
        self.ensure_open(&mut driver)?;
        Ok(driver.set_operation_mode(mode)?)
    }

    pub async fn set_simulation_mode(&self, mode: SimulationMode) -> Result<()> {
        let mut driver = self.lock_exclusive("set_simulation_mode").await?;
        self.ensure_open(&mut driver)?;
        Ok(driver.set_simulation_mode(mode)?)
    }

    pub async fn set_sampling_period_ms(&self, period_ms: u32) -> Result<()> {
        let mut driver = self.lock_exclusive("set_sampling_period_ms").await?;
        self.ensure_open(&mut driver)?;
        Ok(driver.set_sampling_period_ms(period_ms)?)
    }

    pub async fn set_threshold_mc(&self, threshold_mc: i32) -> Result<()> {
        let mut driver = self.lock_exclusive("set_threshold_mc").await?;
        self.ensure_open(&mut driver)?;
        Ok(driver.set_threshold_mc(threshold_mc)?)
    }

    /// Capture `limit` samples in continuous mode, then stop the device.
    ///
    /// Each sample must arrive within `timeout`. The device is stopped on
    /// every exit path.
    pub async fn stream(&self, limit: usize, timeout: Duration) -> Result<Vec<Sample>> {
        let mut driver = self.lock_exclusive("stream").await?;
        self.ensure_open(&mut driver)?;
        let driver = &mut *driver;

        let captured = async {
            if driver.get_state().is_ok_and(DeviceState::is_running) {
                driver.stop()?;
            }
            driver.set_operation_mode(OperationMode::Continuous)?;
            driver.start()?;

            let mut samples = Vec::with_capacity(limit);
            while samples.len() < limit {
                samples.push(driver.read_sample(timeout).await?);
            }
            Ok::<_, simtemp_driver::DriverError>(samples)
        }
        .await;

        if let Err(e) = driver.stop() {
            warn!("Failed to stop device after capture: {}", e);
        }

        let samples = captured?;
        debug!(count = samples.len(), "Bounded capture complete");
        Ok(samples)
    }
}

impl<D: SensorDriver> std::fmt::Debug for SensorSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSession")
            .field("config", &self.config)
            .field("streaming", &self.is_streaming())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simtemp_core::constants::FLAG_THRESHOLD_EDGE;
    use simtemp_driver::DriverError;
    use simtemp_driver::mock::{MockDriver, MockDriverHandle, MockOp};
    use std::io::Write;

    fn session() -> (SensorSession<MockDriver>, MockDriverHandle) {
        let (driver, handle) = MockDriver::new().unwrap();
        let session =
            SensorSession::new(driver, SessionConfig::default().without_module_check()).unwrap();
        (session, handle)
    }

    fn modules_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_new_fails_when_module_missing() {
        let file = modules_file("snd_hda 1234 0 - Live 0x0\n");
        let (driver, _handle) = MockDriver::new().unwrap();
        let result = SensorSession::new(driver, SessionConfig::default().modules_path(file.path()));
        assert!(matches!(result, Err(SessionError::Unavailable(_))));
    }

    #[test]
    fn test_new_ignores_prefix_matches() {
        let file = modules_file("simtemp_extra 1 0 - Live 0x0\n");
        let (driver, _handle) = MockDriver::new().unwrap();
        let result = SensorSession::new(driver, SessionConfig::default().modules_path(file.path()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_new_succeeds_when_module_loaded() {
        let file = modules_file("snd 1 0 - Live 0x0\nsimtemp 16384 0 - Live 0x0\n");
        let (driver, handle) = MockDriver::new().unwrap();
        let session =
            SensorSession::new(driver, SessionConfig::default().modules_path(file.path())).unwrap();

        session.open().await.unwrap();
        assert_eq!(handle.state(), DeviceState::OpenIdle);
    }

    #[tokio::test]
    async fn test_unreadable_listing_defers_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modules");
        let (driver, _handle) = MockDriver::new().unwrap();
        let session =
            SensorSession::new(driver, SessionConfig::default().modules_path(&path)).unwrap();

        // The listing appears before the first open, without the module.
        std::fs::write(&path, "other 1 0 - Live 0x0\n").unwrap();
        let result = session.open().await;
        assert!(matches!(result, Err(SessionError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_open_and_close_are_idempotent() {
        let (session, handle) = session();
        session.open().await.unwrap();
        session.open().await.unwrap();
        assert_eq!(handle.call_count(MockOp::Open), 1);

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(handle.state(), DeviceState::Closed);
    }

    #[tokio::test]
    async fn test_read_once_restores_continuous_stream() {
        let (session, handle) = session();
        session
            .set_operation_mode(OperationMode::Continuous)
            .await
            .unwrap();
        session.set_sampling_period_ms(250).await.unwrap();
        {
            let mut driver = session.driver.lock().await;
            driver.start().unwrap();
        }

        let sample = session.read_once(Duration::from_millis(200)).await.unwrap();
        assert!(sample.is_oneshot_done());
        assert_eq!(handle.operation_mode(), OperationMode::Continuous);
        assert_eq!(handle.sampling_period_ms(), 250);
        assert!(handle.is_running());
    }

    #[tokio::test]
    async fn test_read_once_skips_period_change_at_minimum() {
        let (session, handle) = session();
        session.set_sampling_period_ms(5).await.unwrap();
        handle.clear_calls();

        session.read_once(Duration::from_millis(200)).await.unwrap();
        assert_eq!(handle.call_count(MockOp::SetSamplingPeriod), 0);
    }

    #[tokio::test]
    async fn test_read_once_missing_flag_is_protocol_violation() {
        let (session, handle) = session();
        handle.set_oneshot_reading(30_000, FLAG_THRESHOLD_EDGE);

        let result = session.read_once(Duration::from_millis(200)).await;
        assert!(matches!(result, Err(SessionError::ProtocolViolation(_))));
        assert_eq!(handle.operation_mode(), OperationMode::OneShot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_once_timeout_restores_configuration() {
        let (session, handle) = session();
        session.set_sampling_period_ms(400).await.unwrap();
        handle.stall_oneshot(true);

        let result = session.read_once(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(SessionError::Timeout { duration_ms: 50 })));
        assert_eq!(handle.sampling_period_ms(), 400);
        assert!(!handle.is_running());
    }

    async fn start_streaming_at(session: &SensorSession<MockDriver>, period_ms: u32) {
        session
            .set_operation_mode(OperationMode::Continuous)
            .await
            .unwrap();
        session.set_sampling_period_ms(period_ms).await.unwrap();
        let mut driver = session.driver.lock().await;
        driver.start().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_once_timeout_restores_continuous_mode() {
        let (session, handle) = session();
        start_streaming_at(&session, 300).await;
        handle.stall_oneshot(true);

        let result = session.read_once(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(SessionError::Timeout { duration_ms: 20 })));
        assert_eq!(handle.operation_mode(), OperationMode::Continuous);
        assert_eq!(handle.sampling_period_ms(), 300);
        assert!(handle.is_running());
    }

    #[tokio::test]
    async fn test_read_once_protocol_violation_restores_continuous_mode() {
        let (session, handle) = session();
        start_streaming_at(&session, 300).await;
        handle.set_oneshot_reading(30_000, FLAG_THRESHOLD_EDGE);

        let result = session.read_once(Duration::from_millis(200)).await;
        assert!(matches!(result, Err(SessionError::ProtocolViolation(_))));
        assert_eq!(handle.operation_mode(), OperationMode::Continuous);
        assert_eq!(handle.sampling_period_ms(), 300);
        assert!(handle.is_running());
    }

    #[tokio::test]
    async fn test_restoration_failure_is_suppressed() {
        let (session, handle) = session();
        // The second period write is the one restoring the old value.
        handle.fail_nth(MockOp::SetSamplingPeriod, 2, DriverError::other("EIO"));

        let restored = session.read_once_detailed(Duration::from_millis(200)).await;
        assert!(restored.outcome.is_ok());
        assert_eq!(restored.suppressed.len(), 1);
        assert!(matches!(restored.suppressed[0], SessionError::Device(_)));
        assert_eq!(handle.sampling_period_ms(), 5);
    }

    #[tokio::test]
    async fn test_main_error_wins_over_restore_error() {
        let (session, handle) = session();
        handle.fail_next(MockOp::SetOperationMode, DriverError::other("EIO"));
        handle.fail_nth(MockOp::Stop, 2, DriverError::other("stop failed"));

        let restored = session.read_once_detailed(Duration::from_millis(200)).await;
        assert!(matches!(restored.outcome, Err(SessionError::Device(ref m)) if m == "EIO"));
        assert_eq!(restored.suppressed.len(), 1);
        assert_eq!(handle.sampling_period_ms(), 100);
    }

    #[tokio::test]
    async fn test_apply_settings_partial_failure() {
        let (session, handle) = session();
        let update = SettingsUpdate::new()
            .with("threshold_mc", "500")
            .with("operation_mode", "bogus");

        let report = session.apply_settings(&update).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "operation_mode");
        assert_eq!(report.config.threshold_mc, Some(500));
        assert!(report.was_applied(SettingKey::ThresholdMc));
        assert_eq!(handle.threshold_mc(), 500);
    }

    #[tokio::test]
    async fn test_apply_settings_reports_unknown_keys_last() {
        let (session, _handle) = session();
        let update = SettingsUpdate::new()
            .with("colour", "red")
            .with("sampling_period_ms", "1");

        let report = session.apply_settings(&update).await.unwrap();
        let keys: Vec<_> = report.failures.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["sampling_period_ms", "colour"]);
    }

    #[tokio::test]
    async fn test_apply_settings_writes_in_fixed_order() {
        let (session, handle) = session();
        session.open().await.unwrap();
        handle.clear_calls();

        let update = SettingsUpdate::new()
            .with("threshold_mc", "1000")
            .with("sampling_period_ms", "50")
            .with("simulation_mode", "noisy")
            .with("operation_mode", "continuous");
        session.apply_settings(&update).await.unwrap();

        let writes: Vec<_> = handle
            .calls()
            .into_iter()
            .filter(|op| op.is_mutating())
            .collect();
        assert_eq!(
            writes,
            vec![
                MockOp::SetOperationMode,
                MockOp::SetSimulationMode,
                MockOp::SetSamplingPeriod,
                MockOp::SetThreshold,
            ]
        );
    }

    #[tokio::test]
    async fn test_driver_config_degrades_per_field() {
        let (session, handle) = session();
        handle.fail_always(MockOp::GetThreshold, "attribute missing");
        handle.fail_always(MockOp::GetVersion, "attribute missing");

        let config = session.driver_config().await;
        assert_eq!(config.threshold_mc, None);
        assert_eq!(config.version, "unknown");
        assert_eq!(config.sampling_period_ms, Some(100));
        assert_eq!(config.state, Some(DeviceState::OpenIdle));
    }

    #[tokio::test]
    async fn test_start_continuous_applies_then_starts() {
        let (session, handle) = session();
        let update = SettingsUpdate::new().with("sampling_period_ms", "20");

        let report = session.start_continuous(&update).await.unwrap();
        assert!(report.is_ok());
        assert_eq!(handle.operation_mode(), OperationMode::Continuous);
        assert_eq!(handle.sampling_period_ms(), 20);
        assert_eq!(handle.state(), DeviceState::Running);

        session.stop().await.unwrap();
        assert_eq!(handle.state(), DeviceState::OpenIdle);
    }

    #[tokio::test]
    async fn test_start_continuous_on_running_device() {
        let (session, handle) = session();
        session.start_continuous(&SettingsUpdate::new()).await.unwrap();
        assert!(handle.is_running());

        let update = SettingsUpdate::new()
            .with("operation_mode", "continuous")
            .with("sampling_period_ms", "20");
        let report = session.start_continuous(&update).await.unwrap();

        assert!(report.is_ok(), "unexpected failures: {:?}", report.failures);
        assert!(report.was_applied(SettingKey::OperationMode));
        assert!(report.was_applied(SettingKey::SamplingPeriodMs));
        assert_eq!(handle.operation_mode(), OperationMode::Continuous);
        assert_eq!(handle.sampling_period_ms(), 20);
        assert!(handle.is_running());
    }

    #[tokio::test]
    async fn test_apply_settings_reports_duplicate_alias() {
        let (session, handle) = session();
        let update = SettingsUpdate::new()
            .with("threshold_mc", "1000")
            .with("threshold_mC", "2000")
            .with("colour", "red");

        let report = session.apply_settings(&update).await.unwrap();
        assert_eq!(handle.threshold_mc(), 1000);
        assert_eq!(report.applied, vec![SettingKey::ThresholdMc]);

        let keys: Vec<_> = report.failures.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["threshold_mC", "colour"]);
        assert_eq!(report.failures[0].message, "duplicate of threshold_mc");
    }

    #[tokio::test]
    async fn test_stop_on_closed_device_is_noop() {
        let (session, handle) = session();
        session.stop().await.unwrap();
        assert_eq!(handle.call_count(MockOp::Stop), 0);
    }

    #[tokio::test]
    async fn test_stream_captures_limit_and_stops() {
        let (session, handle) = session();
        for temp in [20_000, 20_100, 20_200] {
            handle.push_reading(temp, 0);
        }

        let samples = session.stream(3, Duration::from_millis(100)).await.unwrap();
        let temps: Vec<_> = samples.iter().map(|s| s.temp_mc).collect();
        assert_eq!(temps, vec![20_000, 20_100, 20_200]);
        assert!(!handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_timeout_still_stops() {
        let (session, handle) = session();
        let result = session.stream(1, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(SessionError::Timeout { .. })));
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_info_reports_driver_version() {
        let (session, handle) = session();
        handle.set_version("1.4.2");
        let info = session.info().await;
        assert_eq!(info.name, "SimTempDriver");
        assert_eq!(info.version.as_deref(), Some("1.4.2"));
    }

    #[tokio::test]
    async fn test_stats_pass_through() {
        let (session, handle) = session();
        session.open().await.unwrap();
        handle.push_reading(20_000, 0);
        let stats = session.stats().await.unwrap();
        assert_eq!(stats.get("updates"), Some(1));
    }

    #[test]
    fn test_lease_is_exclusive() {
        let flag = Arc::new(AtomicBool::new(false));
        let lease = StreamLease::acquire(&flag).unwrap();
        assert!(StreamLease::acquire(&flag).is_none());
        drop(lease);
        assert!(StreamLease::acquire(&flag).is_some());
    }
}
