//! BMP statistics command-line tool
//!
//! Reads a channel-keyed JSON payload, runs one analysis, and writes the
//! report as JSON to stdout (or `--output`).
//!
//! Usage:
//!   bmp_stats rain storm.json
//!   bmp_stats flow flows.json --output flows_report.json
//!   bmp_stats rainflow site.json --config site.toml
//!   bmp_stats infiltration piezometers.json --time-budget-secs 120
//!
//! Environment:
//!   RUST_LOG - log filter (default `info`); logs go to stderr

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use bmp_stats::analysis::infiltration::FitBudget;
use bmp_stats::config::{AnalysisConfig, load_config, load_default_config};
use bmp_stats::ingest::payload::{
    parse_depth_payload, parse_flow_payload, parse_rain_payload, parse_rainflow_payload,
};
use bmp_stats::model::BmpResult;
use bmp_stats::report::{flow_report, infiltration_report, rain_report, rainflow_report};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Stormwater BMP rainfall, runoff and infiltration statistics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rain event statistics from a rain gauge
    Rain(CommonArgs),
    /// Whole-record runoff statistics and inflow/outflow balance
    Flow(CommonArgs),
    /// Rain events with per-event runoff statistics and balance
    Rainflow(CommonArgs),
    /// Infiltration rate from decay fits on piezometer depth
    Infiltration(InfiltrationArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// JSON payload keyed by channel
    payload: PathBuf,

    /// Analysis configuration (defaults to ./bmp.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InfiltrationArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Per-channel search budget in seconds, overriding the configuration
    #[arg(long)]
    time_budget_secs: Option<u64>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        eprintln!("❌ {}", e);
        process::exit(1);
    }
}

fn run(command: Command) -> BmpResult<()> {
    match command {
        Command::Rain(args) => {
            let config = resolve_config(args.config.as_deref())?;
            let rain = parse_rain_payload(&read_payload(&args.payload)?)?;
            write_report(&rain_report(&rain, &config), args.output.as_deref())
        }
        Command::Flow(args) => {
            let config = resolve_config(args.config.as_deref())?;
            let flows = parse_flow_payload(&read_payload(&args.payload)?)?;
            write_report(&flow_report(&flows, &config), args.output.as_deref())
        }
        Command::Rainflow(args) => {
            let config = resolve_config(args.config.as_deref())?;
            let payload = parse_rainflow_payload(&read_payload(&args.payload)?)?;
            let report = rainflow_report(&payload.rain, &payload.flows, &config);
            write_report(&report, args.output.as_deref())
        }
        Command::Infiltration(args) => {
            let mut config = resolve_config(args.common.config.as_deref())?;
            if args.time_budget_secs.is_some() {
                config.infiltration.time_budget_secs = args.time_budget_secs;
            }
            let depths = parse_depth_payload(&read_payload(&args.common.payload)?)?;
            let budget = FitBudget::from_config(&config.infiltration);
            write_report(&infiltration_report(&depths, &config, &budget), args.common.output.as_deref())
        }
    }
}

fn resolve_config(path: Option<&Path>) -> BmpResult<AnalysisConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            load_config(path)
        }
        None => load_default_config(),
    }
}

fn read_payload(path: &Path) -> BmpResult<String> {
    info!(path = %path.display(), "reading payload");
    Ok(fs::read_to_string(path)?)
}

fn write_report<T: Serialize>(report: &T, output: Option<&Path>) -> BmpResult<()> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{}", json),
    }
    Ok(())
}
