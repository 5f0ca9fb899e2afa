//! Run configuration.
//!
//! A run is described by a TOML file:
//!
//! ```toml
//! end_time_ns = 4000000000
//!
//! [topology]
//! num_nodes = 1256
//! num_satellites = 1156
//!
//! [routing]
//! fstate_dir = "dynamic_state_100ms_for_200s"
//! refresh_interval_ns = 100000000
//! force_static = false
//! forwarding = "route_table"   # or "bier"
//!
//! [traffic]
//! schedule = "schedule.csv"
//! split_at_source = true
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use skycast_bier::BitPositionMap;
use skycast_input::GeneratorConfig;
use skycast_simulation::{ForwardingMode, RefreshConfig, SimulationConfig};
use skycast_types::{NodeId, NodeRoles};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level run configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    /// Simulation end; no refresh or packet is processed after it.
    #[serde(default = "default_end_time_ns")]
    pub end_time_ns: u64,

    /// One-way delay of every link.
    #[serde(default = "default_link_latency_ns")]
    pub link_latency_ns: u64,

    pub topology: TopologyConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub traffic: TrafficConfig,

    #[serde(default)]
    pub bier: BierConfig,
}

fn default_end_time_ns() -> u64 {
    1_000_000_000
}

fn default_link_latency_ns() -> u64 {
    1_000_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopologyConfig {
    pub num_nodes: u32,

    /// Nodes `0..num_satellites` are satellites, the rest ground stations.
    #[serde(default)]
    pub num_satellites: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Directory holding `fstate_<epoch_ns>.txt` files.
    #[serde(default)]
    pub fstate_dir: Option<PathBuf>,

    #[serde(default = "default_refresh_interval_ns")]
    pub refresh_interval_ns: u64,

    /// Route once at time 0 and never refresh.
    #[serde(default)]
    pub force_static: bool,

    #[serde(default = "default_unbind_grace_ns")]
    pub unbind_grace_ns: u64,

    #[serde(default)]
    pub forwarding: Forwarding,
}

fn default_refresh_interval_ns() -> u64 {
    100_000_000
}

fn default_unbind_grace_ns() -> u64 {
    10_000_000
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            fstate_dir: None,
            refresh_interval_ns: default_refresh_interval_ns(),
            force_static: false,
            unbind_grace_ns: default_unbind_grace_ns(),
            forwarding: Forwarding::default(),
        }
    }
}

/// Forwarding backend, as named in configuration and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Forwarding {
    #[default]
    RouteTable,
    Bier,
}

impl From<Forwarding> for ForwardingMode {
    fn from(forwarding: Forwarding) -> Self {
        match forwarding {
            Forwarding::RouteTable => ForwardingMode::RouteTable,
            Forwarding::Bier => ForwardingMode::Bier,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrafficConfig {
    /// Schedule CSV. Takes precedence over `generate`.
    #[serde(default)]
    pub schedule: Option<PathBuf>,

    /// Split requests whose destinations leave the source through several
    /// next hops (route-table backend only).
    #[serde(default)]
    pub split_at_source: bool,

    #[serde(default)]
    pub generate: Option<GenerateConfig>,
}

/// Parameters of a randomly generated schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateConfig {
    #[serde(default = "default_request_count")]
    pub count: usize,

    #[serde(default)]
    pub seed: u64,

    #[serde(default = "default_rate_mbps")]
    pub rate_mbps: f64,

    #[serde(default)]
    pub mean_destinations: Option<f64>,

    #[serde(default)]
    pub mean_duration_ns: Option<u64>,
}

fn default_request_count() -> usize {
    10
}

fn default_rate_mbps() -> f64 {
    10.0
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            count: default_request_count(),
            seed: 0,
            rate_mbps: default_rate_mbps(),
            mean_destinations: None,
            mean_duration_ns: None,
        }
    }
}

/// Explicit BIER bit positions. Empty means: number the destinations of the
/// schedule in ascending node order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BierConfig {
    #[serde(default)]
    pub bit_positions: Vec<BitPositionConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BitPositionConfig {
    pub node: NodeId,
    pub bit_position: u32,
}

impl SimulatorConfig {
    /// Configuration of a topology with default routing and no traffic source.
    pub fn new(num_nodes: u32, num_satellites: u32) -> Self {
        Self {
            end_time_ns: default_end_time_ns(),
            link_latency_ns: default_link_latency_ns(),
            topology: TopologyConfig {
                num_nodes,
                num_satellites,
            },
            routing: RoutingConfig::default(),
            traffic: TrafficConfig::default(),
            bier: BierConfig::default(),
        }
    }

    /// Load a run file, resolving relative paths against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        if let Some(dir) = self.routing.fstate_dir.as_mut() {
            resolve(dir);
        }
        if let Some(schedule) = self.traffic.schedule.as_mut() {
            resolve(schedule);
        }
    }

    pub fn with_end_time_ns(mut self, end_time_ns: u64) -> Self {
        self.end_time_ns = end_time_ns;
        self
    }

    pub fn with_force_static(mut self, force_static: bool) -> Self {
        self.routing.force_static = force_static;
        self
    }

    pub fn with_forwarding(mut self, forwarding: Forwarding) -> Self {
        self.routing.forwarding = forwarding;
        self
    }

    pub fn with_schedule(mut self, schedule: impl Into<PathBuf>) -> Self {
        self.traffic.schedule = Some(schedule.into());
        self
    }

    pub fn with_generated_traffic(mut self, generate: GenerateConfig) -> Self {
        self.traffic.generate = Some(generate);
        self
    }

    /// Builder: seed of the generated schedule. Enables generation with
    /// default parameters if it was off.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.traffic.generate.get_or_insert_with(GenerateConfig::default).seed = seed;
        self
    }

    pub fn with_split_at_source(mut self, split_at_source: bool) -> Self {
        self.traffic.split_at_source = split_at_source;
        self
    }

    /// Check settings that cannot be expressed in the file format alone.
    pub fn validate(&self) -> Result<()> {
        if self.topology.num_nodes == 0 {
            bail!("topology.num_nodes must be positive");
        }
        if self.topology.num_satellites > self.topology.num_nodes {
            bail!(
                "topology.num_satellites ({}) exceeds num_nodes ({})",
                self.topology.num_satellites,
                self.topology.num_nodes
            );
        }
        if self.end_time_ns == 0 {
            bail!("end_time_ns must be positive");
        }
        if self.routing.refresh_interval_ns == 0 {
            bail!("routing.refresh_interval_ns must be positive");
        }
        if self.traffic.schedule.is_none() && self.traffic.generate.is_none() {
            bail!("traffic needs either a schedule file or a [traffic.generate] section");
        }
        if self.traffic.split_at_source && self.routing.forwarding == Forwarding::Bier {
            bail!("traffic.split_at_source only applies to the route_table backend");
        }
        Ok(())
    }

    pub fn roles(&self) -> NodeRoles {
        NodeRoles::new(self.topology.num_nodes, self.topology.num_satellites)
    }

    pub fn forwarding_mode(&self) -> ForwardingMode {
        self.routing.forwarding.into()
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig::default()
            .with_interval(Duration::from_nanos(self.routing.refresh_interval_ns))
            .with_end_time(Duration::from_nanos(self.end_time_ns))
            .with_force_static(self.routing.force_static)
            .with_unbind_grace(Duration::from_nanos(self.routing.unbind_grace_ns))
            .with_mode(self.forwarding_mode())
    }

    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig::default()
            .with_refresh(self.refresh_config())
            .with_link_latency(Duration::from_nanos(self.link_latency_ns))
    }

    /// Generator settings, when the schedule is generated.
    pub fn generator_config(&self) -> Option<GeneratorConfig> {
        self.traffic.generate.as_ref().map(|generate| GeneratorConfig {
            count: generate.count,
            seed: generate.seed,
            end_ns: self.end_time_ns,
            rate_mbps: generate.rate_mbps,
            mean_destinations: generate.mean_destinations,
            mean_duration_ns: generate.mean_duration_ns,
        })
    }

    /// The configured bit positions, if any were given.
    pub fn bit_positions(&self) -> Result<Option<BitPositionMap>> {
        if self.bier.bit_positions.is_empty() {
            return Ok(None);
        }
        let mut map = BitPositionMap::new();
        for entry in &self.bier.bit_positions {
            map.assign(entry.node, entry.bit_position).with_context(|| {
                format!("Invalid bit position for node {}", entry.node)
            })?;
        }
        Ok(Some(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = SimulatorConfig::from_toml(
            r#"
            [topology]
            num_nodes = 8

            [traffic.generate]
            count = 3
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.end_time_ns, 1_000_000_000);
        assert_eq!(config.routing.refresh_interval_ns, 100_000_000);
        assert_eq!(config.routing.forwarding, Forwarding::RouteTable);
        assert_eq!(config.roles(), NodeRoles::terrestrial(8));

        let generator = config.generator_config().unwrap();
        assert_eq!(generator.count, 3);
        assert_eq!(generator.end_ns, 1_000_000_000);
        assert_eq!(generator.rate_mbps, 10.0);
    }

    #[test]
    fn test_full_file() {
        let config = SimulatorConfig::from_toml(
            r#"
            end_time_ns = 2000000000
            link_latency_ns = 5000

            [topology]
            num_nodes = 6
            num_satellites = 4

            [routing]
            fstate_dir = "state"
            force_static = true
            forwarding = "bier"

            [traffic]
            schedule = "schedule.csv"

            [[bier.bit_positions]]
            node = 4
            bit_position = 0

            [[bier.bit_positions]]
            node = 5
            bit_position = 1
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        let refresh = config.refresh_config();
        assert!(refresh.force_static);
        assert_eq!(refresh.mode, ForwardingMode::Bier);
        assert_eq!(refresh.end_time, Duration::from_secs(2));
        assert_eq!(
            config.simulation_config().link_latency,
            Duration::from_micros(5)
        );
        let bits = config.bit_positions().unwrap().unwrap();
        assert_eq!(bits.bit_of(5), Some(1));
    }

    #[test]
    fn test_relative_paths_follow_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(
            &path,
            "[topology]\nnum_nodes = 4\n[routing]\nfstate_dir = \"state\"\n[traffic]\nschedule = \"/abs/schedule.csv\"\n",
        )
        .unwrap();

        let config = SimulatorConfig::load(&path).unwrap();
        assert_eq!(config.routing.fstate_dir, Some(dir.path().join("state")));
        assert_eq!(
            config.traffic.schedule,
            Some(PathBuf::from("/abs/schedule.csv"))
        );
    }

    #[test]
    fn test_validation_rejects_missing_traffic() {
        let config = SimulatorConfig::new(4, 0);
        assert!(config.validate().is_err());
        assert!(config.with_seed(1).validate().is_ok());
    }

    #[test]
    fn test_split_requires_route_table_backend() {
        let config = SimulatorConfig::new(4, 0)
            .with_seed(1)
            .with_split_at_source(true)
            .with_forwarding(Forwarding::Bier);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_bit_positions_rejected() {
        let mut config = SimulatorConfig::new(4, 0);
        config.bier.bit_positions = vec![
            BitPositionConfig {
                node: 1,
                bit_position: 0,
            },
            BitPositionConfig {
                node: 2,
                bit_position: 0,
            },
        ];
        assert!(config.bit_positions().is_err());
    }
}
