//! Mock sensor driver implementation for testing and development.
//!
//! This module provides a scriptable in-process device that follows the same
//! state machine as the real driver: configuration writes are validated,
//! the operation mode cannot change while running, and a one-shot start
//! produces exactly one flagged sample and then stops by itself.
//!
//! Pending samples are mirrored on a Unix socket pair, one byte per record,
//! so [`SensorDriver::fileno`] returns a real descriptor that a reactor can
//! poll for readiness.

use crate::{DriverError, Result, traits::SensorDriver};
use simtemp_core::constants::{
    DEFAULT_SAMPLING_PERIOD_MS, FLAG_ONESHOT_DONE, MAX_SAMPLING_PERIOD_MS,
    MAX_THRESHOLD_MC, MIN_SAMPLING_PERIOD_MS, SAMPLE_RECORD_SIZE,
};
use simtemp_core::{DeviceState, OperationMode, Sample, SimulationMode, Statistics};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Records the device buffers before the oldest unread one is overwritten.
pub const RECORD_CAPACITY: usize = 64;

/// Driver operations, used for fault injection and call inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Open,
    Close,
    Start,
    Stop,
    GetState,
    GetOperationMode,
    SetOperationMode,
    GetSimulationMode,
    SetSimulationMode,
    GetSamplingPeriod,
    SetSamplingPeriod,
    GetThreshold,
    SetThreshold,
    ReadSample,
    Fileno,
    ReadStats,
    GetVersion,
    GetName,
}

impl MockOp {
    /// Returns `true` for operations that change device state or configuration.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            MockOp::Open
                | MockOp::Close
                | MockOp::Start
                | MockOp::Stop
                | MockOp::SetOperationMode
                | MockOp::SetSimulationMode
                | MockOp::SetSamplingPeriod
                | MockOp::SetThreshold
        )
    }
}

/// Fault that fires on a later call of `op`.
#[derive(Debug)]
struct ScheduledFault {
    op: MockOp,
    remaining: usize,
    error: Option<DriverError>,
}

#[derive(Debug)]
struct MockState {
    name: String,
    version: String,
    open: bool,
    running: bool,
    operation_mode: OperationMode,
    simulation_mode: SimulationMode,
    sampling_period_ms: u32,
    threshold_mc: i32,

    /// Packed records waiting to be read, oldest first.
    records: VecDeque<[u8; SAMPLE_RECORD_SIZE]>,

    oneshot_temp_mc: i32,
    oneshot_flags: u32,
    oneshot_stall: bool,

    faults: HashMap<MockOp, VecDeque<DriverError>>,
    scheduled_faults: Vec<ScheduledFault>,
    persistent_faults: HashMap<MockOp, String>,

    calls: Vec<MockOp>,
    history: Vec<DeviceState>,

    produced: u64,
    delivered: u64,
    alerts: u64,
    overruns: u64,
}

impl MockState {
    fn device_state(&self) -> DeviceState {
        match (self.open, self.running) {
            (false, _) => DeviceState::Closed,
            (true, false) => DeviceState::OpenIdle,
            (true, true) => DeviceState::Running,
        }
    }

    fn record_transition(&mut self) {
        let current = self.device_state();
        if self.history.last() != Some(&current) {
            debug!(state = %current, "Mock device state changed");
            self.history.push(current);
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<MockState>,
    notify: Notify,
    epoch: Instant,

    /// Polled by the reader; holds one unread byte per pending record.
    device_end: UnixStream,

    /// Written once per enqueued record.
    signal_end: UnixStream,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_ns(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Queue a record and make the descriptor readable.
    ///
    /// A full buffer drops its oldest record along with that record's
    /// readiness byte.
    fn enqueue(&self, state: &mut MockState, sample: Sample) {
        if state.records.len() >= RECORD_CAPACITY {
            state.records.pop_front();
            self.consume_signal();
            state.overruns += 1;
            trace!(overruns = state.overruns, "Record buffer full, oldest dropped");
        }

        state.records.push_back(sample.to_le_bytes());
        state.produced += 1;
        if sample.has_threshold_edge() {
            state.alerts += 1;
        }

        if let Err(e) = (&self.signal_end).write_all(&[1]) {
            debug!("Failed to signal readiness: {}", e);
        }
        self.notify.notify_one();
    }

    /// Pop the oldest record and consume its readiness byte.
    fn dequeue(&self, state: &mut MockState) -> Option<Sample> {
        let record = state.records.pop_front()?;
        self.consume_signal();
        state.delivered += 1;
        Some(Sample::from_le_bytes(record))
    }

    fn consume_signal(&self) {
        let mut byte = [0u8; 1];
        if let Err(e) = (&self.device_end).read(&mut byte)
            && e.kind() != ErrorKind::WouldBlock
        {
            debug!("Failed to consume readiness byte: {}", e);
        }
    }

    fn drain(&self, state: &mut MockState) {
        state.records.clear();
        let mut buf = [0u8; 256];
        while matches!((&self.device_end).read(&mut buf), Ok(n) if n > 0) {}
    }
}

/// Mock temperature sensor driver for testing and development.
///
/// Created together with a [`MockDriverHandle`] that scripts the device:
/// pushes samples, injects faults and inspects what the session did.
///
/// # Examples
///
/// ```
/// use simtemp_driver::mock::MockDriver;
/// use simtemp_driver::SensorDriver;
/// use simtemp_core::{OperationMode, constants::FLAG_ONESHOT_DONE};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> simtemp_driver::Result<()> {
///     let (mut driver, _handle) = MockDriver::new()?;
///
///     driver.open()?;
///     driver.set_operation_mode(OperationMode::OneShot)?;
///     driver.start()?;
///
///     let sample = driver.read_sample(Duration::from_millis(100)).await?;
///     assert!(sample.has_flag(FLAG_ONESHOT_DONE));
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockDriver {
    shared: Arc<Shared>,
}

impl MockDriver {
    /// Create a new closed mock driver with default configuration.
    ///
    /// Fails only if the readiness socket pair cannot be created.
    pub fn new() -> Result<(Self, MockDriverHandle)> {
        let (device_end, signal_end) = UnixStream::pair()?;
        device_end.set_nonblocking(true)?;
        signal_end.set_nonblocking(true)?;

        let state = MockState {
            name: "simtemp".to_string(),
            version: "0.1.0-mock".to_string(),
            open: false,
            running: false,
            operation_mode: OperationMode::OneShot,
            simulation_mode: SimulationMode::Normal,
            sampling_period_ms: DEFAULT_SAMPLING_PERIOD_MS,
            threshold_mc: 0,
            records: VecDeque::new(),
            oneshot_temp_mc: 25_000,
            oneshot_flags: FLAG_ONESHOT_DONE,
            oneshot_stall: false,
            faults: HashMap::new(),
            scheduled_faults: Vec::new(),
            persistent_faults: HashMap::new(),
            calls: Vec::new(),
            history: vec![DeviceState::Closed],
            produced: 0,
            delivered: 0,
            alerts: 0,
            overruns: 0,
        };

        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            notify: Notify::new(),
            epoch: Instant::now(),
            device_end,
            signal_end,
        });

        Ok((
            Self {
                shared: Arc::clone(&shared),
            },
            MockDriverHandle { shared },
        ))
    }

    /// Record the call, apply injected faults and check the open state.
    fn enter(&self, op: MockOp, needs_open: bool) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.shared.lock();
        state.calls.push(op);
        trace!(?op, "Mock driver call");

        if let Some(message) = state.persistent_faults.get(&op) {
            return Err(DriverError::other(message.clone()));
        }

        let mut fired = None;
        for fault in state.scheduled_faults.iter_mut().filter(|f| f.op == op) {
            fault.remaining = fault.remaining.saturating_sub(1);
            if fault.remaining == 0 && fired.is_none() {
                fired = fault.error.take();
            }
        }
        state.scheduled_faults.retain(|f| f.error.is_some());
        if let Some(error) = fired {
            return Err(error);
        }

        if let Some(error) = state.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        if needs_open && !state.open {
            return Err(DriverError::NotOpen);
        }
        Ok(state)
    }

    /// Non-blocking take of the next pending sample.
    fn try_take(&self) -> Option<Sample> {
        let mut state = self.shared.lock();
        let sample = self.shared.dequeue(&mut state)?;

        // A one-shot measurement stops the device once it has been read.
        if state.running && state.operation_mode == OperationMode::OneShot {
            state.running = false;
            state.record_transition();
        }
        Some(sample)
    }
}

impl SensorDriver for MockDriver {
    fn open(&mut self) -> Result<()> {
        let mut state = self.enter(MockOp::Open, false)?;
        state.open = true;
        state.record_transition();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.enter(MockOp::Close, false)?;
        if state.open {
            state.open = false;
            state.running = false;
            self.shared.drain(&mut state);
            state.record_transition();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    fn start(&mut self) -> Result<()> {
        let mut state = self.enter(MockOp::Start, true)?;
        if state.running {
            return Ok(());
        }
        state.running = true;
        state.record_transition();

        if state.operation_mode == OperationMode::OneShot && !state.oneshot_stall {
            let sample = Sample::new(
                self.shared.now_ns(),
                state.oneshot_temp_mc,
                state.oneshot_flags,
            );
            self.shared.enqueue(&mut state, sample);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = self.enter(MockOp::Stop, true)?;
        state.running = false;
        state.record_transition();
        Ok(())
    }

    fn get_state(&self) -> Result<DeviceState> {
        let state = self.enter(MockOp::GetState, false)?;
        Ok(state.device_state())
    }

    fn get_operation_mode(&self) -> Result<OperationMode> {
        Ok(self.enter(MockOp::GetOperationMode, true)?.operation_mode)
    }

    fn set_operation_mode(&mut self, mode: OperationMode) -> Result<()> {
        let mut state = self.enter(MockOp::SetOperationMode, true)?;
        if state.running {
            return Err(DriverError::busy("operation mode cannot change while running"));
        }
        state.operation_mode = mode;
        Ok(())
    }

    fn get_simulation_mode(&self) -> Result<SimulationMode> {
        Ok(self.enter(MockOp::GetSimulationMode, true)?.simulation_mode)
    }

    fn set_simulation_mode(&mut self, mode: SimulationMode) -> Result<()> {
        self.enter(MockOp::SetSimulationMode, true)?.simulation_mode = mode;
        Ok(())
    }

    fn get_sampling_period_ms(&self) -> Result<u32> {
        Ok(self.enter(MockOp::GetSamplingPeriod, true)?.sampling_period_ms)
    }

    fn set_sampling_period_ms(&mut self, period_ms: u32) -> Result<()> {
        let mut state = self.enter(MockOp::SetSamplingPeriod, true)?;
        if !(MIN_SAMPLING_PERIOD_MS..=MAX_SAMPLING_PERIOD_MS).contains(&period_ms) {
            return Err(DriverError::invalid_value(
                "sampling_ms",
                format!(
                    "{period_ms} outside {MIN_SAMPLING_PERIOD_MS}..={MAX_SAMPLING_PERIOD_MS}"
                ),
            ));
        }
        state.sampling_period_ms = period_ms;
        Ok(())
    }

    fn get_threshold_mc(&self) -> Result<i32> {
        Ok(self.enter(MockOp::GetThreshold, true)?.threshold_mc)
    }

    fn set_threshold_mc(&mut self, threshold_mc: i32) -> Result<()> {
        let mut state = self.enter(MockOp::SetThreshold, true)?;
        if !(0..=MAX_THRESHOLD_MC).contains(&threshold_mc) {
            return Err(DriverError::invalid_value(
                "threshold_mC",
                format!("{threshold_mc} outside 0..={MAX_THRESHOLD_MC}"),
            ));
        }
        state.threshold_mc = threshold_mc;
        Ok(())
    }

    async fn read_sample(&mut self, timeout: Duration) -> Result<Sample> {
        drop(self.enter(MockOp::ReadSample, true)?);

        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(sample) = self.try_take() {
                return Ok(sample);
            }
            if timeout.is_zero() {
                return Err(DriverError::timeout(timeout_ms));
            }
            if tokio::time::timeout_at(deadline, self.shared.notify.notified())
                .await
                .is_err()
            {
                return Err(DriverError::timeout(timeout_ms));
            }
        }
    }

    fn fileno(&self) -> Result<RawFd> {
        drop(self.enter(MockOp::Fileno, true)?);
        Ok(self.shared.device_end.as_raw_fd())
    }

    fn read_stats(&self) -> Result<Statistics> {
        let state = self.enter(MockOp::ReadStats, true)?;
        let counters = BTreeMap::from([
            ("updates".to_string(), state.produced),
            ("reads".to_string(), state.delivered),
            ("alerts".to_string(), state.alerts),
            ("overruns".to_string(), state.overruns),
        ]);
        Ok(Statistics { counters })
    }

    fn get_driver_version(&self) -> Result<String> {
        Ok(self.enter(MockOp::GetVersion, false)?.version.clone())
    }

    fn get_name(&self) -> Result<String> {
        Ok(self.enter(MockOp::GetName, false)?.name.clone())
    }
}

/// Handle for scripting and inspecting a [`MockDriver`].
///
/// Handles are cheap to clone and may be used from any task. Inspection
/// methods read the device registers directly and never trip injected
/// faults.
///
/// # Examples
///
/// ```
/// use simtemp_driver::mock::{MockDriver, MockOp};
/// use simtemp_driver::{DriverError, SensorDriver};
///
/// let (mut driver, handle) = MockDriver::new().unwrap();
/// handle.fail_next(MockOp::Open, DriverError::other("EIO"));
///
/// assert!(driver.open().is_err());
/// assert!(driver.open().is_ok());
/// assert_eq!(handle.call_count(MockOp::Open), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MockDriverHandle {
    shared: Arc<Shared>,
}

impl MockDriverHandle {
    /// Queue a sample as if the device had just produced it.
    pub fn push_sample(&self, sample: Sample) {
        let mut state = self.shared.lock();
        self.shared.enqueue(&mut state, sample);
    }

    /// Queue a reading stamped with the device clock.
    pub fn push_reading(&self, temp_mc: i32, flags: u32) -> Sample {
        let sample = Sample::new(self.now_ns(), temp_mc, flags);
        self.push_sample(sample);
        sample
    }

    /// Fail the next call of `op` with `error`. Faults queue up in order.
    pub fn fail_next(&self, op: MockOp, error: DriverError) {
        self.shared
            .lock()
            .faults
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Fail the `nth` upcoming call of `op` (1-based), letting earlier ones through.
    pub fn fail_nth(&self, op: MockOp, nth: usize, error: DriverError) {
        self.shared.lock().scheduled_faults.push(ScheduledFault {
            op,
            remaining: nth.max(1),
            error: Some(error),
        });
    }

    /// Fail every call of `op` until [`clear_faults`](Self::clear_faults).
    pub fn fail_always(&self, op: MockOp, message: impl Into<String>) {
        self.shared
            .lock()
            .persistent_faults
            .insert(op, message.into());
    }

    pub fn clear_faults(&self) {
        let mut state = self.shared.lock();
        state.faults.clear();
        state.scheduled_faults.clear();
        state.persistent_faults.clear();
    }

    /// Reading produced by the next one-shot start.
    pub fn set_oneshot_reading(&self, temp_mc: i32, flags: u32) {
        let mut state = self.shared.lock();
        state.oneshot_temp_mc = temp_mc;
        state.oneshot_flags = flags;
    }

    /// When `true`, a one-shot start produces nothing (the read times out).
    pub fn stall_oneshot(&self, stall: bool) {
        self.shared.lock().oneshot_stall = stall;
    }

    pub fn set_version(&self, version: impl Into<String>) {
        self.shared.lock().version = version.into();
    }

    /// All driver calls in order.
    pub fn calls(&self) -> Vec<MockOp> {
        self.shared.lock().calls.clone()
    }

    pub fn call_count(&self, op: MockOp) -> usize {
        self.shared.lock().calls.iter().filter(|c| **c == op).count()
    }

    pub fn clear_calls(&self) {
        self.shared.lock().calls.clear();
    }

    /// Distinct device states visited, starting with `Closed`.
    pub fn history(&self) -> Vec<DeviceState> {
        self.shared.lock().history.clone()
    }

    pub fn state(&self) -> DeviceState {
        self.shared.lock().device_state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    pub fn operation_mode(&self) -> OperationMode {
        self.shared.lock().operation_mode
    }

    pub fn simulation_mode(&self) -> SimulationMode {
        self.shared.lock().simulation_mode
    }

    pub fn sampling_period_ms(&self) -> u32 {
        self.shared.lock().sampling_period_ms
    }

    pub fn threshold_mc(&self) -> i32 {
        self.shared.lock().threshold_mc
    }

    /// Number of samples waiting to be read.
    pub fn pending(&self) -> usize {
        self.shared.lock().records.len()
    }

    /// Current value of the device monotonic clock.
    pub fn now_ns(&self) -> u64 {
        self.shared.now_ns()
    }
}
