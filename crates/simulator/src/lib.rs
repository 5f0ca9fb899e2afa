//! Skycast Simulator
//!
//! Runs a complete multicast experiment from a TOML run file, built on top
//! of the `skycast-simulation` framework.
//!
//! # Architecture
//!
//! The simulator wires the workspace crates together:
//!
//! - **Inputs**: schedule CSV or a seeded random schedule, and a directory of
//!   per-epoch unicast state (via `skycast-input`)
//! - **Splitting**: optional per-first-hop splitting at the source (via
//!   `skycast-routing`)
//! - **Forwarding**: route tables or BIER, refreshed every epoch (via
//!   `skycast-simulation`)
//! - **Reporting**: global and per-request delivery counters
//!
//! # Example
//!
//! ```ignore
//! use skycast_simulator::{Simulator, SimulatorConfig};
//! use std::path::Path;
//!
//! let config = SimulatorConfig::load(Path::new("run.toml"))?;
//! let mut simulator = Simulator::new(config)?;
//! let report = simulator.run()?;
//! report.print_summary();
//! ```

mod config;
mod report;
mod runner;

pub use config::{
    BierConfig, BitPositionConfig, Forwarding, GenerateConfig, RoutingConfig, SimulatorConfig,
    TopologyConfig, TrafficConfig,
};
pub use report::{RequestReport, SimulationReport};
pub use runner::Simulator;
