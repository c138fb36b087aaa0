//! Background temperature synthesis for the mock driver.
//!
//! The simulator ticks once per sampling period. Every tick refreshes the
//! reading used for one-shot measurements; while the device runs in
//! continuous mode the reading is also queued as a sample, with the edge flag
//! set when it crosses a positive threshold upwards.

use super::driver::MockDriverHandle;
use simtemp_core::constants::{FLAG_ONESHOT_DONE, FLAG_THRESHOLD_EDGE, THRESHOLD_DISABLED};
use simtemp_core::{OperationMode, SimulationMode};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

const BASE_TEMP_MC: i32 = 25_000;
const WAVE_AMPLITUDE_MC: f64 = 2_000.0;
const NOISE_SPAN_MC: i32 = 500;
const RAMP_START_MC: i32 = 20_000;
const RAMP_STEP_MC: i32 = 50;
const RAMP_STEPS: u64 = 400;

/// Small xorshift generator; the noise only needs to look irregular.
#[derive(Debug, Clone)]
struct Jitter(u64);

impl Jitter {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform value in `-span..=span`.
    fn offset(&mut self, span: i32) -> i32 {
        let width = u64::from(span.unsigned_abs()) * 2 + 1;
        (self.next() % width) as i32 - span
    }
}

/// Temperature for tick `tick` in simulation mode `mode`.
fn synthesize(mode: SimulationMode, tick: u64, jitter: &mut Jitter) -> i32 {
    let wave = BASE_TEMP_MC + (WAVE_AMPLITUDE_MC * (tick as f64 * 0.05).sin()) as i32;
    match mode {
        SimulationMode::Normal => wave,
        SimulationMode::Noisy => wave + jitter.offset(NOISE_SPAN_MC),
        SimulationMode::Ramp => RAMP_START_MC + (tick % RAMP_STEPS) as i32 * RAMP_STEP_MC,
    }
}

/// Running synthesis task. Aborted on drop.
#[derive(Debug)]
pub struct Simulator {
    task: JoinHandle<()>,
}

impl Simulator {
    /// Spawn the synthesis task for the device behind `handle`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(handle: MockDriverHandle) -> Self {
        let seed = handle.now_ns() | 1;
        let task = tokio::spawn(run(handle, Jitter(seed)));
        debug!("Temperature simulator started");
        Self { task }
    }

    /// Stop synthesizing.
    pub fn stop(self) {
        self.task.abort();
        debug!("Temperature simulator stopped");
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(handle: MockDriverHandle, mut jitter: Jitter) {
    let mut tick = 0u64;
    let mut previous: Option<i32> = None;

    loop {
        let period = u64::from(handle.sampling_period_ms());
        tokio::time::sleep(Duration::from_millis(period)).await;

        let temp_mc = synthesize(handle.simulation_mode(), tick, &mut jitter);
        tick = tick.wrapping_add(1);

        handle.set_oneshot_reading(temp_mc, oneshot_flags(&handle, temp_mc));

        if !(handle.is_running() && handle.operation_mode() == OperationMode::Continuous) {
            previous = None;
            continue;
        }

        let threshold = handle.threshold_mc();
        let crossed = threshold > THRESHOLD_DISABLED
            && previous.is_some_and(|p| p < threshold)
            && temp_mc >= threshold;
        let flags = if crossed { FLAG_THRESHOLD_EDGE } else { 0 };

        let sample = handle.push_reading(temp_mc, flags);
        trace!(temp_mc = sample.temp_mc, flags, "Synthesized sample");
        previous = Some(temp_mc);
    }
}

fn oneshot_flags(handle: &MockDriverHandle, temp_mc: i32) -> u32 {
    let threshold = handle.threshold_mc();
    if threshold > THRESHOLD_DISABLED && temp_mc >= threshold {
        FLAG_ONESHOT_DONE | FLAG_THRESHOLD_EDGE
    } else {
        FLAG_ONESHOT_DONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SensorDriver;
    use crate::mock::MockDriver;

    #[test]
    fn test_ramp_is_monotonic_within_cycle() {
        let mut jitter = Jitter(7);
        let values: Vec<i32> = (0..RAMP_STEPS)
            .map(|t| synthesize(SimulationMode::Ramp, t, &mut jitter))
            .collect();
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(values[0], RAMP_START_MC);
    }

    #[test]
    fn test_noise_stays_within_span() {
        let mut jitter = Jitter(42);
        for _ in 0..1000 {
            let offset = jitter.offset(NOISE_SPAN_MC);
            assert!((-NOISE_SPAN_MC..=NOISE_SPAN_MC).contains(&offset));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_mode_queues_samples() {
        let (mut driver, handle) = MockDriver::new().unwrap();
        driver.open().unwrap();
        driver.set_operation_mode(OperationMode::Continuous).unwrap();
        driver.set_sampling_period_ms(10).unwrap();
        driver.start().unwrap();

        let simulator = Simulator::spawn(handle.clone());
        tokio::time::sleep(Duration::from_millis(55)).await;
        simulator.stop();

        assert!(handle.pending() >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_device_gets_no_samples() {
        let (mut driver, handle) = MockDriver::new().unwrap();
        driver.open().unwrap();
        driver.set_sampling_period_ms(10).unwrap();

        let _simulator = Simulator::spawn(handle.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(handle.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_crossing_sets_edge_flag() {
        let (mut driver, handle) = MockDriver::new().unwrap();
        driver.open().unwrap();
        driver.set_operation_mode(OperationMode::Continuous).unwrap();
        driver.set_simulation_mode(SimulationMode::Ramp).unwrap();
        driver.set_sampling_period_ms(5).unwrap();
        driver.set_threshold_mc(RAMP_START_MC + 10 * RAMP_STEP_MC).unwrap();
        driver.start().unwrap();

        let simulator = Simulator::spawn(handle.clone());
        tokio::time::sleep(Duration::from_millis(5 * 30)).await;
        simulator.stop();

        let mut edges = 0;
        while let Ok(sample) = driver.read_sample(Duration::ZERO).await {
            if sample.has_threshold_edge() {
                edges += 1;
                assert!(sample.temp_mc >= handle.threshold_mc());
            }
        }
        assert_eq!(edges, 1);
    }
}
