//! Simulator wrapper: turns a run configuration into a finished run.

use crate::config::SimulatorConfig;
use crate::report::SimulationReport;
use anyhow::{bail, Context, Result};
use skycast_bier::BitPositionMap;
use skycast_input::{read_schedule, write_schedule, FstateDirectory, RequestGenerator};
use skycast_routing::split::split_schedule_over;
use skycast_simulation::{ForwardingMode, SimulationRunner};
use skycast_types::{MulticastRequest, NodeId, SnapshotSource};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// A configured multicast simulation over some snapshot source.
pub struct Simulator<S> {
    config: SimulatorConfig,
    requests: Vec<MulticastRequest>,
    runner: SimulationRunner<S>,
}

impl Simulator<FstateDirectory> {
    /// Build a simulator reading unicast state from the configured directory.
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        let Some(dir) = config.routing.fstate_dir.clone() else {
            bail!("routing.fstate_dir is required");
        };
        let source = FstateDirectory::new(dir, config.topology.num_nodes);
        Self::with_source(config, source)
    }
}

impl<S: SnapshotSource + Clone> Simulator<S> {
    /// Build a simulator over an arbitrary snapshot source.
    pub fn with_source(config: SimulatorConfig, source: S) -> Result<Self> {
        config.validate()?;
        let roles = config.roles();

        let mut requests = match (&config.traffic.schedule, config.generator_config()) {
            (Some(path), _) => read_schedule(path, &roles, config.end_time_ns)?,
            (None, Some(generator)) => RequestGenerator::new(generator).generate(&roles),
            (None, None) => bail!("no traffic source configured"),
        };

        if config.traffic.split_at_source {
            // Static runs route every request with the state of epoch 0.
            let interval_ns = if config.routing.force_static {
                config.end_time_ns
            } else {
                config.routing.refresh_interval_ns
            };
            requests = split_schedule_over(
                &requests,
                &mut source.clone(),
                interval_ns,
                config.end_time_ns,
            )
            .context("Failed to split requests at their sources")?;
        }

        let mut runner = SimulationRunner::new(
            config.simulation_config(),
            source,
            roles,
            requests.clone(),
        );
        if config.forwarding_mode() == ForwardingMode::Bier {
            let bit_positions = match config.bit_positions()? {
                Some(map) => map,
                None => default_bit_positions(&requests)?,
            };
            info!(assigned = bit_positions.len(), "BIER bit positions");
            runner = runner.with_bit_positions(bit_positions);
        }

        info!(
            requests = requests.len(),
            nodes = config.topology.num_nodes,
            satellites = config.topology.num_satellites,
            end_time_ns = config.end_time_ns,
            forwarding = ?config.routing.forwarding,
            force_static = config.routing.force_static,
            "Simulator ready"
        );

        Ok(Self {
            config,
            requests,
            runner,
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// The schedule being simulated, after splitting.
    pub fn requests(&self) -> &[MulticastRequest] {
        &self.requests
    }

    /// Write the schedule in the CSV format the reader accepts.
    pub fn write_schedule(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create schedule file: {}", path.display()))?;
        write_schedule(BufWriter::new(file), &self.requests)
            .with_context(|| format!("Failed to write schedule file: {}", path.display()))?;
        info!(path = %path.display(), requests = self.requests.len(), "Wrote schedule");
        Ok(())
    }

    /// Run to the configured end time and summarize.
    pub fn run(&mut self) -> Result<SimulationReport> {
        let end_time = Duration::from_nanos(self.config.end_time_ns);
        self.runner
            .run_until(end_time)
            .context("Simulation aborted")?;

        let request_stats = self.runner.request_stats();
        let report = SimulationReport::new(
            self.runner.now(),
            self.runner.stats().clone(),
            &self.requests,
            |id| request_stats.get(&id).cloned(),
        );
        info!(
            events = report.stats.events_processed,
            delivered = report.stats.packets_delivered,
            dropped = report.stats.dropped(),
            "Simulation complete"
        );
        Ok(report)
    }
}

/// Number every destination of the schedule in ascending node order.
fn default_bit_positions(requests: &[MulticastRequest]) -> Result<BitPositionMap> {
    let destinations: BTreeSet<NodeId> = requests
        .iter()
        .flat_map(|r| r.destinations.iter().copied())
        .collect();
    BitPositionMap::sequential(destinations)
        .context("More BIER destinations than bit positions; configure [[bier.bit_positions]]")
}
