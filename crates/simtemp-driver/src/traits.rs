//! Driver handle trait definition.
//!
//! This module defines the contract between the session layer and the
//! low-level temperature sensor driver. The driver itself lives outside this
//! workspace; implementations adapt it (or a mock) to this trait.
//!
//! Configuration accessors are synchronous: they map onto small attribute
//! reads and writes. Only [`SensorDriver::read_sample`] can wait for the
//! device, so it is the one async method. Its future is required to be `Send`
//! so the session can drive it from a spawned Tokio task.

use std::future::Future;
use std::os::fd::RawFd;
use std::time::Duration;

use simtemp_core::{DeviceState, OperationMode, Sample, SimulationMode, Statistics};

use crate::error::Result;

/// Low-level temperature sensor driver.
///
/// # Lifecycle
///
/// ```text
/// open() ──► set_*() ──► start() ──► read_sample()* ──► stop() ──► close()
/// ```
///
/// Every method except [`is_open`](SensorDriver::is_open) and
/// [`close`](SensorDriver::close) may fail with
/// [`DriverError::NotOpen`](crate::DriverError::NotOpen) when called on a
/// closed handle. `close` on a closed handle is a no-op.
///
/// # Reads
///
/// `read_sample(timeout)` returns the next pending sample, waiting at most
/// `timeout`. A zero timeout makes it non-blocking: it returns
/// [`DriverError::Timeout`](crate::DriverError::Timeout) immediately when no
/// sample is pending.
///
/// # Readiness
///
/// [`fileno`](SensorDriver::fileno) exposes a descriptor that polls readable
/// while samples are pending. The descriptor stays owned by the driver;
/// callers may register it with a reactor but must never close it.
pub trait SensorDriver: Send + 'static {
    /// Open the device descriptor.
    fn open(&mut self) -> Result<()>;

    /// Release the device descriptor. No-op when already closed.
    fn close(&mut self) -> Result<()>;

    /// Returns `true` while a descriptor is held.
    fn is_open(&self) -> bool;

    /// Start sampling in the current operation mode.
    fn start(&mut self) -> Result<()>;

    /// Stop sampling. No-op when already stopped.
    fn stop(&mut self) -> Result<()>;

    fn get_state(&self) -> Result<DeviceState>;

    fn get_operation_mode(&self) -> Result<OperationMode>;

    /// Change the operation mode. Devices refuse this while running.
    fn set_operation_mode(&mut self, mode: OperationMode) -> Result<()>;

    fn get_simulation_mode(&self) -> Result<SimulationMode>;

    fn set_simulation_mode(&mut self, mode: SimulationMode) -> Result<()>;

    fn get_sampling_period_ms(&self) -> Result<u32>;

    fn set_sampling_period_ms(&mut self, period_ms: u32) -> Result<()>;

    fn get_threshold_mc(&self) -> Result<i32>;

    fn set_threshold_mc(&mut self, threshold_mc: i32) -> Result<()>;

    /// Read the next sample, waiting at most `timeout`.
    fn read_sample(&mut self, timeout: Duration) -> impl Future<Output = Result<Sample>> + Send;

    /// Descriptor that polls readable while samples are pending.
    fn fileno(&self) -> Result<RawFd>;

    fn read_stats(&self) -> Result<Statistics>;

    fn get_driver_version(&self) -> Result<String>;

    /// Name the driver registered under.
    fn get_name(&self) -> Result<String>;
}
