//! Command line definitions.

use clap::{Args, Parser, Subcommand};
use simtemp_core::SimulationMode;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "simtemp")]
#[command(version)]
#[command(about = "Control and monitor the simulated temperature sensor")]
#[command(long_about = "Control and monitor the simulated temperature sensor

Commands run against an in-process simulated device; settings last for the
duration of one invocation.

EXAMPLES:
    simtemp info
    simtemp read --timeout-ms 2000
    simtemp stream --period-ms 50 --mode ramp --threshold-mc 30000 --duration-ms 5000
    simtemp set sampling_period_ms=200 threshold_mc=45000

ENVIRONMENT VARIABLES:
    RUST_LOG=debug    Log filter, used when --log-level is not given")]
pub struct Cli {
    /// JSON configuration file with `session` and `stream` sections
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter (e.g. `info`, `simtemp_session=debug`)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Refuse to run unless the kernel module is listed as loaded
    #[arg(long, global = true)]
    pub require_module: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print driver metadata, configuration and statistics
    Info,

    /// Take a single one-shot reading
    Read(ReadArgs),

    /// Stream readings continuously with an alert indicator
    Stream(StreamArgs),

    /// Apply KEY=VALUE settings and print the resulting configuration
    Set(SetArgs),
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    /// Read timeout; defaults to the configured value
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Append the reading to a CSV file
    #[arg(long)]
    pub record: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Sampling period in milliseconds
    #[arg(long)]
    pub period_ms: Option<u32>,

    /// Simulation mode
    #[arg(long, value_parser = parse_simulation_mode)]
    pub mode: Option<SimulationMode>,

    /// Alert threshold in millidegrees Celsius (0 disables)
    #[arg(long)]
    pub threshold_mc: Option<i32>,

    /// Stop after this long; runs until Ctrl-C when omitted
    #[arg(long)]
    pub duration_ms: Option<u64>,

    /// Append every sample to a CSV file
    #[arg(long)]
    pub record: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Settings as KEY=VALUE pairs
    #[arg(required = true, value_parser = parse_key_value)]
    pub settings: Vec<(String, String)>,
}

fn parse_simulation_mode(value: &str) -> Result<SimulationMode, String> {
    value.parse().map_err(|e: simtemp_core::SessionError| e.to_string())
}

fn parse_key_value(pair: &str) -> Result<(String, String), String> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {pair:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in {pair:?}"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
