//! Periodic re-synthesis of multicast state.
//!
//! ```text
//!            refresh(epoch)
//!   Idle ─────────────────────▶ Scheduled(epoch + interval)
//!    ▲                                  │
//!    │  static mode, or                 │ timer fires
//!    │  epoch + interval >= end         ▼
//!    └──────────────────────────── refresh(epoch + interval)
//! ```
//!
//! A refresh loads the unicast snapshot of its epoch, builds the complete
//! next generation of forwarding state (route tables or BIER tables) for
//! every request active during the epoch, and only then swaps it in. A
//! failed refresh leaves the previous generation untouched.

use crate::link_bindings::LinkBindingTable;
use skycast_bier::{build_tables, BierError, BierTable, BitPositionMap};
use skycast_core::{TimerId, TimerScheduler};
use skycast_routing::{synthesize, ArbiterError, RoutingState, SynthesisError};
use skycast_types::{
    LinkBinding, MulticastRequest, NodeId, NodeRoles, SnapshotError, SnapshotSource,
    UnicastSnapshot,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Which forwarding backend the refresh builds state for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardingMode {
    /// Per-node multicast route tables consulted by the arbiter.
    #[default]
    RouteTable,
    /// Bitstring forwarding with per-node BIER tables.
    Bier,
}

/// Configuration for the refresh driver.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Time between two epochs.
    pub interval: Duration,
    /// No refresh is scheduled at or after this time.
    pub end_time: Duration,
    /// Build state once at the first epoch and never refresh again.
    pub force_static: bool,
    /// Delay before a stale link binding is removed.
    pub unbind_grace: Duration,
    pub mode: ForwardingMode,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            end_time: Duration::from_secs(1),
            force_static: false,
            unbind_grace: Duration::from_millis(10),
            mode: ForwardingMode::RouteTable,
        }
    }
}

impl RefreshConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_end_time(mut self, end_time: Duration) -> Self {
        self.end_time = end_time;
        self
    }

    pub fn with_force_static(mut self, force_static: bool) -> Self {
        self.force_static = force_static;
        self
    }

    pub fn with_unbind_grace(mut self, unbind_grace: Duration) -> Self {
        self.unbind_grace = unbind_grace;
        self
    }

    pub fn with_mode(mut self, mode: ForwardingMode) -> Self {
        self.mode = mode;
        self
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("epoch {epoch_ns} ns does not follow the previous epoch {previous_ns} ns")]
    EpochNotIncreasing { previous_ns: u64, epoch_ns: u64 },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Arbiter(#[from] ArbiterError),

    #[error(transparent)]
    Bier(#[from] BierError),
}

/// Whether a future refresh is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Scheduled { epoch_ns: u64 },
}

/// What one refresh did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub epoch_ns: u64,
    pub active_requests: usize,
    /// Route entries (route-table mode) or BIER entries (BIER mode) installed.
    pub entries_installed: usize,
    pub bindings_created: usize,
    pub bindings_stale: usize,
    pub next_epoch_ns: Option<u64>,
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Owns every node's forwarding state and rebuilds it each epoch.
pub struct RefreshDriver<S> {
    config: RefreshConfig,
    source: S,
    roles: NodeRoles,
    requests: Vec<MulticastRequest>,
    bit_positions: BitPositionMap,

    routing: RoutingState,
    bier_tables: Vec<BierTable>,
    bindings: LinkBindingTable,
    snapshot: Option<UnicastSnapshot>,

    state: RefreshState,
    last_epoch_ns: Option<u64>,
    refreshes: u64,
}

impl<S: SnapshotSource> RefreshDriver<S> {
    pub fn new(
        config: RefreshConfig,
        source: S,
        roles: NodeRoles,
        requests: Vec<MulticastRequest>,
    ) -> Self {
        Self {
            routing: RoutingState::new(roles.num_nodes),
            config,
            source,
            roles,
            requests,
            bit_positions: BitPositionMap::new(),
            bier_tables: Vec::new(),
            bindings: LinkBindingTable::new(),
            snapshot: None,
            state: RefreshState::Idle,
            last_epoch_ns: None,
            refreshes: 0,
        }
    }

    /// Builder: bit positions used in BIER mode.
    pub fn with_bit_positions(mut self, bit_positions: BitPositionMap) -> Self {
        self.bit_positions = bit_positions;
        self
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    pub fn roles(&self) -> &NodeRoles {
        &self.roles
    }

    pub fn requests(&self) -> &[MulticastRequest] {
        &self.requests
    }

    pub fn bit_positions(&self) -> &BitPositionMap {
        &self.bit_positions
    }

    pub fn routing(&self) -> &RoutingState {
        &self.routing
    }

    pub fn bier_table(&self, node: NodeId) -> Option<&BierTable> {
        self.bier_tables.get(node as usize)
    }

    pub fn bindings(&self) -> &LinkBindingTable {
        &self.bindings
    }

    /// Unicast snapshot of the current epoch.
    pub fn snapshot(&self) -> Option<&UnicastSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn state(&self) -> RefreshState {
        self.state
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    /// Window of time the state built at `epoch_ns` serves.
    fn active_window(&self, epoch_ns: u64) -> (u64, u64) {
        let end = if self.config.force_static {
            nanos(self.config.end_time)
        } else {
            epoch_ns.saturating_add(nanos(self.config.interval))
        };
        (epoch_ns, end)
    }

    /// Rebuild all multicast state for the epoch starting at `epoch_ns`.
    pub fn refresh(
        &mut self,
        epoch_ns: u64,
        timers: &mut impl TimerScheduler,
    ) -> Result<RefreshOutcome, RefreshError> {
        if let Some(previous_ns) = self.last_epoch_ns {
            if epoch_ns <= previous_ns {
                return Err(RefreshError::EpochNotIncreasing {
                    previous_ns,
                    epoch_ns,
                });
            }
        }
        self.state = RefreshState::Idle;

        let snapshot = self.source.load(epoch_ns)?;
        let (from_ns, to_ns) = self.active_window(epoch_ns);
        let active: Vec<&MulticastRequest> = self
            .requests
            .iter()
            .filter(|r| r.is_active_during(from_ns, to_ns))
            .collect();

        let mut outcome = RefreshOutcome {
            epoch_ns,
            active_requests: active.len(),
            ..RefreshOutcome::default()
        };

        let mut new_bindings = Vec::new();
        match self.config.mode {
            ForwardingMode::RouteTable => {
                let mut next = RoutingState::new(self.roles.num_nodes);
                for request in &active {
                    let tree = synthesize(request, &snapshot)?;
                    outcome.entries_installed += next.install_tree(&tree)?;
                    new_bindings.extend(
                        tree.hops
                            .iter()
                            .filter(|hop| self.roles.crosses_ground_link(hop.from, hop.to))
                            .map(|hop| LinkBinding {
                                group: tree.group,
                                from_node: hop.from,
                                from_interface: hop.out_interface,
                                to_node: hop.to,
                                to_interface: hop.in_interface,
                            }),
                    );
                }
                self.routing = next;
            }
            ForwardingMode::Bier => {
                let tables = build_tables(&snapshot, &self.bit_positions)?;
                outcome.entries_installed = tables.iter().map(BierTable::len).sum();
                self.bier_tables = tables;
            }
        }

        self.bindings.begin_epoch();
        for binding in new_bindings {
            if self.bindings.bind(binding) {
                outcome.bindings_created += 1;
            }
        }
        let stale = self.bindings.newly_stale();
        outcome.bindings_stale = stale.len();
        for binding in stale {
            timers.set_timer(TimerId::UnbindLink(binding), self.config.unbind_grace);
        }

        self.snapshot = Some(snapshot);
        self.last_epoch_ns = Some(epoch_ns);
        self.refreshes += 1;

        if !self.config.force_static {
            let next_ns = epoch_ns.saturating_add(nanos(self.config.interval));
            if next_ns < nanos(self.config.end_time) {
                timers.set_timer(TimerId::Refresh { epoch_ns: next_ns }, self.config.interval);
                self.state = RefreshState::Scheduled { epoch_ns: next_ns };
                outcome.next_epoch_ns = Some(next_ns);
            }
        }

        info!(
            epoch_ns,
            active = outcome.active_requests,
            entries = outcome.entries_installed,
            bindings_created = outcome.bindings_created,
            bindings_stale = outcome.bindings_stale,
            next_epoch_ns = ?outcome.next_epoch_ns,
            "Refreshed multicast state"
        );
        Ok(outcome)
    }

    /// Remove a stale link binding. Returns whether it was removed.
    pub fn unbind(&mut self, binding: &LinkBinding) -> bool {
        let removed = self.bindings.unbind_if_stale(binding);
        if !removed {
            debug!(?binding, "Link binding renewed, keeping it");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skycast_routing::Decision;
    use skycast_types::{Origin, RequestId};
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct RecordingTimers {
        timers: Vec<(TimerId, Duration)>,
    }

    impl TimerScheduler for RecordingTimers {
        fn set_timer(&mut self, id: TimerId, delay: Duration) {
            self.timers.push((id, delay));
        }
    }

    /// Snapshots keyed by exact epoch.
    struct Snapshots(BTreeMap<u64, UnicastSnapshot>);

    impl SnapshotSource for Snapshots {
        fn load(&mut self, epoch_ns: u64) -> Result<UnicastSnapshot, SnapshotError> {
            self.0
                .get(&epoch_ns)
                .cloned()
                .ok_or(SnapshotError::Missing { epoch_ns })
        }
    }

    /// 0 - 1 - 2 plus a detour 0 - 3 - 2. Interface `k` on a node faces the
    /// neighbour it was linked to `k`-th.
    fn snapshot(epoch_ns: u64, via: u32) -> UnicastSnapshot {
        let mut snapshot = UnicastSnapshot::new(epoch_ns, 4);
        snapshot.add_link(0, 1, 1, 1);
        snapshot.add_link(1, 2, 2, 1);
        snapshot.add_link(0, 2, 3, 1);
        snapshot.add_link(3, 2, 2, 2);
        snapshot.next_hops.set(0, 2, vec![via]);
        snapshot.next_hops.set(via, 2, vec![2]);
        snapshot
    }

    const MS: u64 = 1_000_000;

    fn driver(snapshots: Vec<UnicastSnapshot>, config: RefreshConfig) -> RefreshDriver<Snapshots> {
        let source = Snapshots(snapshots.into_iter().map(|s| (s.epoch_ns, s)).collect());
        let requests = vec![MulticastRequest::new(RequestId(0), 0, [2], 10.0, 0, 1_000 * MS)];
        RefreshDriver::new(config, source, NodeRoles::terrestrial(4), requests)
    }

    fn config() -> RefreshConfig {
        RefreshConfig::default()
            .with_interval(Duration::from_millis(100))
            .with_end_time(Duration::from_millis(300))
    }

    #[test]
    fn test_refresh_schedules_next_epoch() {
        let mut driver = driver(vec![snapshot(0, 1)], config());
        let mut timers = RecordingTimers::default();
        let outcome = driver.refresh(0, &mut timers).unwrap();

        assert_eq!(outcome.active_requests, 1);
        assert_eq!(outcome.entries_installed, 3);
        assert_eq!(outcome.next_epoch_ns, Some(100 * MS));
        assert_eq!(driver.state(), RefreshState::Scheduled { epoch_ns: 100 * MS });
        assert_eq!(
            timers.timers,
            vec![(
                TimerId::Refresh { epoch_ns: 100 * MS },
                Duration::from_millis(100)
            )]
        );
    }

    #[test]
    fn test_no_refresh_at_or_after_end() {
        let mut driver = driver(
            vec![snapshot(0, 1), snapshot(100 * MS, 1), snapshot(200 * MS, 1)],
            config(),
        );
        let mut timers = RecordingTimers::default();
        driver.refresh(0, &mut timers).unwrap();
        driver.refresh(100 * MS, &mut timers).unwrap();
        let last = driver.refresh(200 * MS, &mut timers).unwrap();
        assert_eq!(last.next_epoch_ns, None);
        assert_eq!(driver.state(), RefreshState::Idle);
        assert_eq!(timers.timers.len(), 2);
        assert_eq!(driver.refreshes(), 3);
    }

    #[test]
    fn test_static_mode_never_reschedules() {
        let mut driver = driver(vec![snapshot(0, 1)], config().with_force_static(true));
        let mut timers = RecordingTimers::default();
        let outcome = driver.refresh(0, &mut timers).unwrap();
        assert_eq!(outcome.next_epoch_ns, None);
        assert!(timers.timers.is_empty());
        assert_eq!(driver.state(), RefreshState::Idle);
    }

    #[test]
    fn test_epochs_must_increase() {
        let mut driver = driver(vec![snapshot(0, 1), snapshot(100 * MS, 1)], config());
        let mut timers = RecordingTimers::default();
        driver.refresh(100 * MS, &mut timers).unwrap();
        assert!(matches!(
            driver.refresh(0, &mut timers),
            Err(RefreshError::EpochNotIncreasing { .. })
        ));
        assert!(matches!(
            driver.refresh(100 * MS, &mut timers),
            Err(RefreshError::EpochNotIncreasing { .. })
        ));
    }

    #[test]
    fn test_refresh_replaces_stale_routes() {
        let mut driver = driver(vec![snapshot(0, 1), snapshot(100 * MS, 3)], config());
        let mut timers = RecordingTimers::default();
        driver.refresh(0, &mut timers).unwrap();
        let group = driver.requests()[0].group(skycast_types::ROUTE_GROUP_BASE);
        let origin = Origin::new(0, 1);
        assert_eq!(
            driver.routing().decide(1, 0, origin, group).unwrap(),
            Decision::Forward { interfaces: vec![2] }
        );

        driver.refresh(100 * MS, &mut timers).unwrap();
        assert_eq!(
            driver.routing().decide(1, 0, origin, group).unwrap(),
            Decision::NoRoute
        );
        assert_eq!(
            driver.routing().decide(3, 0, origin, group).unwrap(),
            Decision::Forward { interfaces: vec![2] }
        );
        assert_eq!(
            driver.routing().decide(0, 0, origin, group).unwrap(),
            Decision::Outbound { interface: 2 }
        );
    }

    #[test]
    fn test_failed_refresh_keeps_previous_state() {
        let mut driver = driver(vec![snapshot(0, 1)], config());
        let mut timers = RecordingTimers::default();
        driver.refresh(0, &mut timers).unwrap();
        let before = driver.routing().route_count();

        assert!(matches!(
            driver.refresh(100 * MS, &mut timers),
            Err(RefreshError::Snapshot(SnapshotError::Missing { .. }))
        ));
        assert_eq!(driver.routing().route_count(), before);
        assert_eq!(driver.snapshot().map(|s| s.epoch_ns), Some(0));
    }

    #[test]
    fn test_inactive_requests_get_no_routes() {
        let source = Snapshots([(0, snapshot(0, 1))].into_iter().collect());
        let requests = vec![MulticastRequest::new(RequestId(0), 0, [2], 10.0, 150 * MS, MS)];
        let mut driver = RefreshDriver::new(config(), source, NodeRoles::terrestrial(4), requests);
        let outcome = driver.refresh(0, &mut RecordingTimers::default()).unwrap();
        assert_eq!(outcome.active_requests, 0);
        assert_eq!(driver.routing().route_count(), 0);
    }

    #[test]
    fn test_bier_mode_builds_tables() {
        let source = Snapshots([(0, snapshot(0, 1))].into_iter().collect());
        let requests = vec![MulticastRequest::new(RequestId(0), 0, [2], 10.0, 0, MS)];
        let mut driver = RefreshDriver::new(
            config().with_mode(ForwardingMode::Bier),
            source,
            NodeRoles::terrestrial(4),
            requests,
        )
        .with_bit_positions(BitPositionMap::sequential([2]).unwrap());

        let outcome = driver.refresh(0, &mut RecordingTimers::default()).unwrap();
        assert_eq!(driver.routing().route_count(), 0);
        let table = driver.bier_table(0).unwrap();
        assert_eq!(table.lookup(0).unwrap().next_hop, 1);
        assert_eq!(driver.bier_table(2).unwrap().local_bit_position(), Some(0));
        assert_eq!(outcome.entries_installed, 2);
    }
}
