//! Skycast Simulator CLI
//!
//! Run a multicast experiment described by a TOML run file.
//!
//! # Example
//!
//! ```bash
//! # Run with the settings of the file
//! skycast-sim --config run.toml
//!
//! # Same topology, static routing with BIER, shorter horizon
//! skycast-sim --config run.toml --force-static --forwarding bier --end-time-ns 2000000000
//! ```

use anyhow::Result;
use clap::Parser;
use skycast_simulator::{Forwarding, Simulator, SimulatorConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,skycast_simulator=info,skycast_simulation=info";

/// Skycast Simulator
///
/// Runs deterministic multicast simulations over time-varying unicast
/// state. Reproducible for the same inputs and seed.
#[derive(Parser, Debug)]
#[command(name = "skycast-sim")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the run configuration (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Simulation end in nanoseconds (overrides config)
    #[arg(long)]
    end_time_ns: Option<u64>,

    /// Route once at time 0 and never refresh (overrides config)
    #[arg(long)]
    force_static: bool,

    /// Forwarding backend (overrides config)
    #[arg(long, value_enum)]
    forwarding: Option<Forwarding>,

    /// Seed of the generated schedule (overrides config)
    #[arg(long)]
    seed: Option<u64>,

    /// Write the simulated schedule (after splitting) to this file
    #[arg(long)]
    write_schedule: Option<PathBuf>,

    /// Log level filter (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

/// Apply CLI overrides to the configuration.
fn apply_overrides(config: SimulatorConfig, cli: &Cli) -> SimulatorConfig {
    let mut config = config;
    if let Some(end_time_ns) = cli.end_time_ns {
        config = config.with_end_time_ns(end_time_ns);
    }
    if cli.force_static {
        config = config.with_force_static(true);
    }
    if let Some(forwarding) = cli.forwarding {
        config = config.with_forwarding(forwarding);
    }
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }
    config
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = apply_overrides(SimulatorConfig::load(&cli.config)?, &cli);
    info!(
        config = %cli.config.display(),
        end_time_ns = config.end_time_ns,
        forwarding = ?config.routing.forwarding,
        force_static = config.routing.force_static,
        "Starting simulation"
    );

    let mut simulator = Simulator::new(config)?;
    if let Some(path) = &cli.write_schedule {
        simulator.write_schedule(path)?;
    }

    let report = simulator.run()?;
    report.print_summary();
    Ok(())
}
