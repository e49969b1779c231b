use clap::Parser;
use locus_orchestrator::OrchestratorConfig;
use locus_primitives::{expected_schedule, olc, Location, LocationProofProperties, ProofId};
use serde::Serialize;
use tracing_subscriber::prelude::*;

use crate::cli::{Cli, DemoCmd, EncodeCmd, ProximityCmd, ScheduleCmd, Subcommand};
use crate::demo;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    match cli.subcommand {
        None | Some(Subcommand::Demo) => run_demo(&cli.run),
        Some(Subcommand::Schedule(cmd)) => schedule(&cmd),
        Some(Subcommand::Proximity(cmd)) => proximity(&cmd),
        Some(Subcommand::Encode(cmd)) => encode(&cmd),
    }
}

/// `log` records from the library crates reach the subscriber through its
/// `tracing-log` bridge.
fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn orchestrator_config(cmd: &DemoCmd) -> Result<OrchestratorConfig> {
    let mut config = match &cmd.config {
        Some(path) => OrchestratorConfig::load(path)?,
        None => OrchestratorConfig::default(),
    };
    if let Some(count) = cmd.fragment_count {
        config.fragment_count = count;
    }
    if let Some(length) = cmd.fragment_length {
        config.fragment_length_ms = length;
    }
    config.validate()?;
    Ok(config)
}

fn run_demo(cmd: &DemoCmd) -> Result<()> {
    let config = orchestrator_config(cmd)?;
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let report = runtime.block_on(demo::run(cmd.clone(), config))?;
    print_json(&report)
}

fn schedule(cmd: &ScheduleCmd) -> Result<()> {
    let properties = LocationProofProperties {
        identifier: ProofId::from("schedule"),
        fragment_count: cmd.fragment_count,
        fragment_length_ms: cmd.fragment_length,
        seed: cmd.seed,
    };
    let windows = expected_schedule(&properties, cmd.min_period, cmd.max_period)?;
    print_json(&windows)
}

#[derive(Serialize)]
struct ProximityReport {
    from: String,
    to: String,
    code: locus_primitives::ProximityCode,
    confidence: f64,
}

fn proximity(cmd: &ProximityCmd) -> Result<()> {
    let from = parse_location(&cmd.from)?;
    let to = parse_location(&cmd.to)?;
    let verdict = from.proximity_to(&to)?;

    print_json(&ProximityReport {
        from: from.to_string(),
        to: to.to_string(),
        code: verdict.code,
        confidence: verdict.confidence,
    })
}

fn encode(cmd: &EncodeCmd) -> Result<()> {
    let code = olc::encode(cmd.latitude, cmd.longitude, cmd.digits)?;
    print_json(&code)
}

/// `gps:LAT,LNG[,THRESHOLD]` or `olc:CODE`.
pub fn parse_location(raw: &str) -> Result<Location> {
    let (kind, body) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected gps:LAT,LNG[,THRESHOLD] or olc:CODE, got {}", raw))?;

    match kind.to_lowercase().as_str() {
        "gps" => {
            let parts = body
                .split(',')
                .map(|p| p.trim().parse::<f64>())
                .collect::<std::result::Result<Vec<f64>, _>>()?;
            match parts.as_slice() {
                [lat, lng] => Ok(Location::gps(*lat, *lng, 0.0)?),
                [lat, lng, threshold] => Ok(Location::gps(*lat, *lng, *threshold)?),
                _ => Err(format!("expected 2 or 3 numbers in {}", body).into()),
            }
        }
        "olc" => Ok(Location::olc(body)?),
        other => Err(format!("unknown location kind {}", other).into()),
    }
}

#[allow(clippy::print_stdout)]
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
