//! `simtemp` command line client.
//!
//! Drives an in-process simulated sensor through the session layer: one-shot
//! reads, continuous streaming with an alert indicator, and settings updates.

mod cli;
mod config;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Command, ReadArgs, SetArgs, StreamArgs};
use config::CliConfig;
use simtemp_core::{DriverConfig, Sample};
use simtemp_driver::mock::{MockDriver, Simulator};
use simtemp_session::{
    AlertTracker, SampleRecorder, SensorSession, SettingsReport, SettingsUpdate, StreamEvent,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type Session = SensorSession<MockDriver>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let config = CliConfig::load(cli.config.as_deref())?;
    let mut session_config = config.session.clone();
    if !cli.require_module {
        session_config = session_config.without_module_check();
    }

    let (driver, handle) = MockDriver::new().context("failed to create simulated device")?;
    let session = SensorSession::new(driver, session_config)?;
    let simulator = Simulator::spawn(handle);
    debug!(version = simtemp_core::VERSION, "simtemp starting");

    let result = match cli.command {
        Command::Info => info_command(&session).await,
        Command::Read(args) => read_command(&session, args).await,
        Command::Stream(args) => stream_command(&session, &config, args).await,
        Command::Set(args) => set_command(&session, args).await,
    };

    simulator.stop();
    if let Err(e) = session.close().await {
        warn!("Failed to close device: {}", e);
    }
    result
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
    };

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn print_config(config: &DriverConfig) {
    for (key, value) in config.to_pairs() {
        println!("{key:<20} {value}");
    }
}

fn print_failures(report: &SettingsReport) {
    for failure in &report.failures {
        eprintln!("rejected {failure}");
    }
}

fn format_sample(sample: &Sample) -> String {
    format!(
        "{}  {:>8.3} °C  flags=0x{:x}",
        sample.timestamp_ns,
        sample.temp_celsius(),
        sample.flags
    )
}

async fn info_command(session: &Session) -> Result<()> {
    let info = session.info().await;
    println!("{} {}", info.name, info.version.as_deref().unwrap_or("unknown"));
    println!("{}", info.description);
    println!();

    print_config(&session.driver_config().await);

    match session.stats().await {
        Ok(stats) => println!("{:<20} {}", "stats", stats),
        Err(e) => warn!("Statistics unavailable: {}", e),
    }
    Ok(())
}

async fn read_command(session: &Session, args: ReadArgs) -> Result<()> {
    let timeout = args
        .timeout_ms
        .map(std::time::Duration::from_millis)
        .unwrap_or_else(|| session.config().read_timeout());

    let restored = session.read_once_detailed(timeout).await;
    for error in &restored.suppressed {
        warn!("Restoration step failed: {}", error);
    }
    let sample = restored.outcome?;

    let threshold_mc = session.driver_config().await.threshold_mc.unwrap_or(0);
    let alert = simtemp_core::is_alert(&sample, threshold_mc);
    println!(
        "{}{}",
        format_sample(&sample),
        if alert { "  ALERT" } else { "" }
    );

    if let Some(path) = args.record {
        let mut recorder = SampleRecorder::open(&path).await?;
        recorder.record(&sample).await?;
        recorder.flush().await?;
    }
    Ok(())
}

async fn stream_command(session: &Session, config: &CliConfig, args: StreamArgs) -> Result<()> {
    let mut update = SettingsUpdate::new();
    if let Some(period) = args.period_ms {
        update.insert("sampling_period_ms", period.to_string());
    }
    if let Some(mode) = args.mode {
        update.insert("simulation_mode", mode.to_string());
    }
    if let Some(threshold) = args.threshold_mc {
        update.insert("threshold_mc", threshold.to_string());
    }

    let report = session.start_continuous(&update).await?;
    print_failures(&report);
    let mut tracker = AlertTracker::from_config(&report.config);

    let mut recorder = match &args.record {
        Some(path) => Some(SampleRecorder::open(path).await?),
        None => None,
    };

    let mut worker = session.worker(config.stream.clone());
    let (tx, mut rx) = mpsc::channel(config.stream.channel_capacity.max(1));
    worker.start_stream(tx).await?;
    info!(threshold_mc = tracker.threshold_mc(), "Streaming, Ctrl-C to stop");

    let deadline = args
        .duration_ms
        .map(|ms| tokio::time::Instant::now() + std::time::Duration::from_millis(ms));
    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(expired);

    let outcome = loop {
        tokio::select! {
            _ = &mut expired => break Ok(()),
            _ = tokio::signal::ctrl_c() => break Ok(()),
            event = rx.recv() => match event {
                Some(StreamEvent::Sample(sample)) => {
                    let now = chrono::Local::now().format("%H:%M:%S%.3f");
                    let marker = match tracker.observe(&sample) {
                        Some(true) => "  ALERT",
                        Some(false) => "  clear",
                        None => "",
                    };
                    println!("{now}  {}{marker}", format_sample(&sample));
                    if let Some(recorder) = recorder.as_mut()
                        && let Err(e) = recorder.record(&sample).await
                    {
                        break Err(e.into());
                    }
                }
                Some(StreamEvent::Error(message)) => break Err(anyhow::anyhow!(message)),
                None => break Ok(()),
            },
        }
    };

    worker.stop_stream().await;
    session.stop().await?;
    if let Some(recorder) = recorder.as_mut() {
        recorder.flush().await?;
        info!(
            path = %recorder.path().display(),
            samples = recorder.written(),
            "Recording saved"
        );
    }
    debug!(stats = ?worker.stats(), "Stream finished");
    outcome
}

async fn set_command(session: &Session, args: SetArgs) -> Result<()> {
    let update: SettingsUpdate = args.settings.into_iter().collect();
    let report = session.apply_settings(&update).await?;

    print_config(&report.config);
    print_failures(&report);
    if !report.is_ok() {
        bail!("{} setting(s) rejected", report.failures.len());
    }
    Ok(())
}
