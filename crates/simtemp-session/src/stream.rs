//! Continuous streaming worker.
//!
//! The worker registers the driver's readiness descriptor with the Tokio
//! reactor and runs a polling task that forwards every sample to the caller
//! over an mpsc channel.
//!
//! ```text
//!              start_stream                 cancel / fatal error
//!   ┌──────┐ ───────────────► ┌─────────┐ ─────────────────────► ┌──────┐
//!   │ Idle │                  │ Polling │                        │ Idle │
//!   └──────┘                  └─────────┘                        └──────┘
//! ```
//!
//! Each iteration waits for readiness (bounded by the poll interval), then
//! performs non-blocking reads until the queue is empty. A wakeup whose first
//! read already times out is counted as spurious. Any other error is reported
//! once as [`StreamEvent::Error`] and ends the loop. The worker never opens, starts, stops or closes the device.

use crate::config::StreamConfig;
use crate::session::StreamLease;
use serde::Serialize;
use simtemp_core::{Result, Sample, SessionError};
use simtemp_driver::SensorDriver;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Event delivered to the stream consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A sample read from the device, in arrival order.
    Sample(Sample),

    /// A fatal read error. The worker stops after sending this.
    Error(String),
}

/// Counters shared between a worker and its polling task.
#[derive(Debug, Default)]
pub struct StreamStats {
    samples: AtomicU64,
    spurious_wakeups: AtomicU64,
    idle_timeouts: AtomicU64,
    registrations: AtomicU64,
    deregistrations: AtomicU64,
    fatal_errors: AtomicU64,
}

impl StreamStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            samples: self.samples.load(Ordering::Relaxed),
            spurious_wakeups: self.spurious_wakeups.load(Ordering::Relaxed),
            idle_timeouts: self.idle_timeouts.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            deregistrations: self.deregistrations.load(Ordering::Relaxed),
            fatal_errors: self.fatal_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StreamStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStatsSnapshot {
    /// Samples forwarded to the consumer.
    pub samples: u64,
    /// Readable wakeups that yielded no sample.
    pub spurious_wakeups: u64,
    /// Poll intervals that elapsed without readiness.
    pub idle_timeouts: u64,
    pub registrations: u64,
    pub deregistrations: u64,
    pub fatal_errors: u64,
}

/// Borrowed view of the driver's descriptor. Never closes it.
#[derive(Debug)]
struct DeviceFd(RawFd);

impl AsRawFd for DeviceFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// Reactor registration, counted once on drop.
struct Registration {
    fd: AsyncFd<DeviceFd>,
    stats: Arc<StreamStats>,
}

impl Registration {
    fn register(fd: RawFd, stats: Arc<StreamStats>) -> std::io::Result<Self> {
        let fd = AsyncFd::with_interest(DeviceFd(fd), Interest::READABLE)?;
        StreamStats::bump(&stats.registrations);
        Ok(Self { fd, stats })
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        StreamStats::bump(&self.stats.deregistrations);
        debug!(fd = self.fd.get_ref().0, "Readiness descriptor deregistered");
    }
}

struct Polling {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Worker that streams samples from a session's device.
///
/// Created by [`SensorSession::worker`](crate::SensorSession::worker).
///
/// # Examples
///
/// ```no_run
/// use simtemp_driver::mock::MockDriver;
/// use simtemp_session::{SensorSession, SessionConfig, SettingsUpdate, StreamConfig, StreamEvent};
/// use tokio::sync::mpsc;
///
/// #[tokio::main]
/// async fn main() -> simtemp_core::Result<()> {
///     let (driver, _handle) = MockDriver::new()?;
///     let session = SensorSession::new(driver, SessionConfig::default().without_module_check())?;
///     let mut worker = session.worker(StreamConfig::default());
///
///     session.start_continuous(&SettingsUpdate::new()).await?;
///     let (tx, mut rx) = mpsc::channel(64);
///     worker.start_stream(tx).await?;
///
///     if let Some(StreamEvent::Sample(sample)) = rx.recv().await {
///         println!("{sample}");
///     }
///
///     worker.stop_stream().await;
///     session.stop().await?;
///     Ok(())
/// }
/// ```
pub struct ContinuousWorker<D: SensorDriver> {
    driver: Arc<Mutex<D>>,
    lease_flag: Arc<AtomicBool>,
    config: StreamConfig,
    stats: Arc<StreamStats>,
    polling: Option<Polling>,
}

impl<D: SensorDriver> ContinuousWorker<D> {
    pub(crate) fn new(
        driver: Arc<Mutex<D>>,
        lease_flag: Arc<AtomicBool>,
        config: StreamConfig,
    ) -> Self {
        Self {
            driver,
            lease_flag,
            config,
            stats: Arc::new(StreamStats::default()),
            polling: None,
        }
    }

    /// Returns `true` while the polling task is alive.
    pub fn is_polling(&self) -> bool {
        self.polling
            .as_ref()
            .is_some_and(|polling| !polling.task.is_finished())
    }

    pub fn stats(&self) -> StreamStatsSnapshot {
        self.stats.snapshot()
    }

    /// Start polling and forward events to `events`.
    ///
    /// No-op while already polling. Fails with [`SessionError::Busy`] when
    /// another worker holds the stream lease, or with a device error when the
    /// readiness descriptor cannot be obtained or registered.
    pub async fn start_stream(&mut self, events: mpsc::Sender<StreamEvent>) -> Result<()> {
        if self.is_polling() {
            debug!("Stream already polling");
            return Ok(());
        }
        // Reap a task that ended on its own.
        if let Some(finished) = self.polling.take() {
            let _ = finished.task.await;
        }

        let lease = StreamLease::acquire(&self.lease_flag)
            .ok_or(SessionError::Busy("start_stream"))?;

        let fd = self
            .driver
            .lock()
            .await
            .fileno()
            .map_err(|e| SessionError::device(format!("readiness descriptor unavailable: {e}")))?;
        let registration = Registration::register(fd, Arc::clone(&self.stats))
            .map_err(|e| SessionError::device(format!("readiness registration failed: {e}")))?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.driver),
            registration,
            lease,
            events,
            cancel.clone(),
            self.config.poll_interval(),
            Arc::clone(&self.stats),
        ));

        info!(fd, poll_interval_ms = self.config.poll_interval_ms, "Stream started");
        self.polling = Some(Polling { cancel, task });
        Ok(())
    }

    /// Stop polling. No-op when idle.
    ///
    /// Returns only after the polling task has terminated: it is given
    /// `join_timeout` to exit on its own, then aborted and awaited.
    pub async fn stop_stream(&mut self) {
        let Some(Polling { cancel, mut task }) = self.polling.take() else {
            return;
        };
        cancel.cancel();

        match tokio::time::timeout(self.config.join_timeout(), &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Stream task ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    join_timeout_ms = self.config.join_timeout_ms,
                    "Stream task did not exit in time, aborting"
                );
                task.abort();
                let _ = task.await;
            }
        }
        info!("Stream stopped");
    }
}

impl<D: SensorDriver> Drop for ContinuousWorker<D> {
    fn drop(&mut self) {
        if let Some(polling) = self.polling.take() {
            polling.cancel.cancel();
            polling.task.abort();
        }
    }
}

impl<D: SensorDriver> std::fmt::Debug for ContinuousWorker<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuousWorker")
            .field("config", &self.config)
            .field("polling", &self.is_polling())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

async fn poll_loop<D: SensorDriver>(
    driver: Arc<Mutex<D>>,
    registration: Registration,
    _lease: StreamLease,
    events: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    poll_interval: Duration,
    stats: Arc<StreamStats>,
) {
    'poll: loop {
        let ready = tokio::select! {
            biased;
            _ = cancel.cancelled() => break 'poll,
            ready = tokio::time::timeout(poll_interval, registration.fd.readable()) => ready,
        };

        let mut guard = match ready {
            Err(_) => {
                StreamStats::bump(&stats.idle_timeouts);
                continue;
            }
            Ok(Err(e)) => {
                report_fatal(&events, &stats, format!("readiness wait failed: {e}")).await;
                cancel.cancel();
                break;
            }
            Ok(Ok(guard)) => guard,
        };

        // Drain the queue for this wakeup; the first empty read clears readiness.
        let mut forwarded = 0u64;
        loop {
            let read = {
                let mut driver = driver.lock().await;
                driver.read_sample(Duration::ZERO).await
            };

            match read {
                Ok(sample) => {
                    forwarded += 1;
                    StreamStats::bump(&stats.samples);
                    trace!(temp_mc = sample.temp_mc, flags = sample.flags, "Sample forwarded");
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break 'poll,
                        sent = events.send(StreamEvent::Sample(sample)) => sent,
                    };
                    if sent.is_err() {
                        debug!("Event receiver dropped, stopping stream");
                        break 'poll;
                    }
                }
                Err(e) if e.is_timeout() => {
                    guard.clear_ready();
                    if forwarded == 0 {
                        StreamStats::bump(&stats.spurious_wakeups);
                    }
                    break;
                }
                Err(e) => {
                    report_fatal(&events, &stats, e.to_string()).await;
                    cancel.cancel();
                    break 'poll;
                }
            }
        }
    }

    drop(registration);
}

async fn report_fatal(events: &mpsc::Sender<StreamEvent>, stats: &StreamStats, message: String) {
    error!("Stream read failed: {}", message);
    StreamStats::bump(&stats.fatal_errors);
    let _ = events.send(StreamEvent::Error(message)).await;
}
