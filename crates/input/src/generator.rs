//! Seeded random request generation.
//!
//! Requests are drawn among the ground stations: a uniform source, a Poisson
//! number of distinct destinations (at least one), and an exponentially
//! distributed duration centred on a uniformly drawn midpoint. The active
//! interval is clamped to `[0, end_ns)`.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp, Poisson};
use skycast_types::{MulticastRequest, NodeId, NodeRoles, RequestId};
use tracing::info;

/// Parameters of a generated schedule.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub count: usize,
    pub seed: u64,
    /// Simulation end; every request lies inside `[0, end_ns)`.
    pub end_ns: u64,
    pub rate_mbps: f64,
    /// Mean of the Poisson destination count, at least 1. Defaults to 1/20
    /// of the ground stations.
    pub mean_destinations: Option<f64>,
    /// Mean duration. Defaults to a fifth of the simulation.
    pub mean_duration_ns: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            count: 10,
            seed: 0,
            end_ns: 4_000_000_000,
            rate_mbps: 10.0,
            mean_destinations: None,
            mean_duration_ns: None,
        }
    }
}

impl GeneratorConfig {
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_end_ns(mut self, end_ns: u64) -> Self {
        self.end_ns = end_ns;
        self
    }

    pub fn with_rate_mbps(mut self, rate_mbps: f64) -> Self {
        self.rate_mbps = rate_mbps;
        self
    }
}

/// Deterministic generator of random multicast schedules.
pub struct RequestGenerator {
    config: GeneratorConfig,
    rng: ChaCha8Rng,
}

impl RequestGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    /// Generate a schedule sorted by start time and numbered from 0.
    ///
    /// Returns an empty schedule when fewer than two ground stations exist.
    pub fn generate(&mut self, roles: &NodeRoles) -> Vec<MulticastRequest> {
        let stations: Vec<NodeId> = roles.ground_stations().collect();
        if stations.len() < 2 || self.config.end_ns == 0 {
            return Vec::new();
        }

        let mean_destinations = self
            .config
            .mean_destinations
            .unwrap_or((stations.len() / 20) as f64)
            .max(1.0);
        let mean_duration = self
            .config
            .mean_duration_ns
            .unwrap_or(self.config.end_ns / 5)
            .max(1) as f64;
        let destination_count = Poisson::new(mean_destinations).ok();
        let duration = Exp::new(1.0 / mean_duration).ok();

        let mut requests = Vec::with_capacity(self.config.count);
        for _ in 0..self.config.count {
            let source = stations[self.rng.gen_range(0..stations.len())];
            let candidates: Vec<NodeId> = stations.iter().copied().filter(|&n| n != source).collect();

            let mut wanted = 0usize;
            while wanted == 0 {
                wanted = destination_count
                    .as_ref()
                    .map_or(1.0, |d| d.sample(&mut self.rng))
                    as usize;
            }
            let destinations: Vec<NodeId> = candidates
                .choose_multiple(&mut self.rng, wanted.min(candidates.len()))
                .copied()
                .collect();

            let length = duration
                .as_ref()
                .map_or(mean_duration, |d| d.sample(&mut self.rng)) as u64;
            let midpoint = self.rng.gen_range(0..self.config.end_ns);
            let start = midpoint.saturating_sub(length / 2);
            // At least 1 ns, so every request emits; `midpoint < end_ns` keeps it in range.
            let end = midpoint
                .saturating_add(length / 2)
                .min(self.config.end_ns)
                .max(start + 1);

            requests.push(MulticastRequest::new(
                RequestId(0),
                source,
                destinations,
                self.config.rate_mbps,
                start,
                end - start,
            ));
        }

        requests.sort_by_key(|r| r.start_time_ns);
        for (index, request) in requests.iter_mut().enumerate() {
            request.id = RequestId(index as u64);
        }
        info!(
            count = requests.len(),
            seed = self.config.seed,
            "Generated random multicast schedule"
        );
        requests
    }
}
