//! Driver seam for the simulated temperature sensor.
//!
//! This crate defines the [`SensorDriver`] trait that the session layer talks
//! to, the [`DriverError`] family it raises, and (behind the default `mock`
//! feature) an in-process mock device with a background temperature
//! simulator.
//!
//! # Design
//!
//! - **Sync configuration**: attribute reads and writes are plain method calls.
//! - **Async reads**: [`SensorDriver::read_sample`] is the single waiting
//!   operation, written with native `async fn` in traits (Edition 2024 RPITIT).
//! - **Pollable**: [`SensorDriver::fileno`] exposes a descriptor that becomes
//!   readable while samples are pending.
//!
//! # Example
//!
//! ```no_run
//! use simtemp_driver::{Result, SensorDriver};
//! use simtemp_core::{OperationMode, Sample};
//! use std::time::Duration;
//!
//! async fn measure<D: SensorDriver>(driver: &mut D) -> Result<Sample> {
//!     driver.set_operation_mode(OperationMode::OneShot)?;
//!     driver.start()?;
//!     driver.read_sample(Duration::from_secs(1)).await
//! }
//! ```
//!
//! # Error Handling
//!
//! Every fallible call returns [`Result<T>`][error::Result]. Timeouts are a
//! distinct kind so callers can treat "no data yet" differently from a fault.

pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod traits;
pub mod types;

pub use error::{DriverError, Result};
pub use traits::SensorDriver;
pub use types::DriverInfo;
