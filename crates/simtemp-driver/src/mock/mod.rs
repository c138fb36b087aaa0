//! Mock driver implementation for testing and development.
//!
//! This module provides a simulated temperature sensor that can be controlled
//! programmatically without the kernel module being loaded.

pub mod driver;
pub mod simulator;

pub use driver::{MockDriver, MockDriverHandle, MockOp, RECORD_CAPACITY};
pub use simulator::Simulator;
