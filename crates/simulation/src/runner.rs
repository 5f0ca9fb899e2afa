//! Deterministic packet-level simulation runner.
//!
//! Sources emit paced bursts; every arriving packet is arbitrated by the
//! receiving node's current forwarding state (route table or BIER table) and
//! copies are scheduled towards the neighbours after a fixed link latency.

use crate::event_queue::{EventKey, EventQueue};
use crate::refresh::{ForwardingMode, RefreshConfig, RefreshDriver, RefreshError};
use skycast_bier::{BierError, BitPositionMap, HeaderError, IdSeqBierHeader, IdSeqHeader};
use skycast_core::{Event, Packet, DEFAULT_TTL};
use skycast_routing::{ArbiterError, Decision};
use skycast_types::{
    GroupAddress, InterfaceIndex, MulticastRequest, NodeId, NodeRoles, Origin, RequestId,
    SnapshotSource, BIER_GROUP_ADDRESS, NO_INTERFACE, ROUTE_GROUP_BASE,
};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Configuration of a packet-level run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub refresh: RefreshConfig,
    /// One-way delay of every link.
    pub link_latency: Duration,
    /// Hop limit of packets leaving a source.
    pub initial_ttl: u8,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            refresh: RefreshConfig::default(),
            link_latency: Duration::from_millis(1),
            initial_ttl: DEFAULT_TTL,
        }
    }
}

impl SimulationConfig {
    pub fn with_refresh(mut self, refresh: RefreshConfig) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_link_latency(mut self, link_latency: Duration) -> Self {
        self.link_latency = link_latency;
        self
    }

    pub fn with_initial_ttl(mut self, initial_ttl: u8) -> Self {
        self.initial_ttl = initial_ttl;
        self
    }
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Arbiter(#[from] ArbiterError),

    #[error(transparent)]
    Bier(#[from] BierError),

    #[error("undecodable forwarding header: {0}")]
    Header(#[from] HeaderError),

    #[error("event references unknown request {request}")]
    UnknownRequest { request: RequestId },

    #[error("node {node} has no BIER table")]
    MissingBierTable { node: NodeId },
}

/// Statistics collected during simulation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulationStats {
    /// Total events processed.
    pub events_processed: u64,
    /// Events processed by priority.
    pub events_by_priority: [u64; 4],
    /// Completed refreshes.
    pub refreshes: u64,
    /// Route or BIER entries installed, summed over refreshes.
    pub entries_installed: u64,
    /// Link bindings removed after their grace period.
    pub bindings_removed: u64,
    /// Packets emitted by sources.
    pub packets_sent: u64,
    /// Copies handed to a neighbour.
    pub copies_forwarded: u64,
    /// Packets delivered to a destination.
    pub packets_delivered: u64,
    /// Packets dropped because the node had no matching state.
    pub dropped_no_route: u64,
    /// Copies dropped because their hop limit ran out.
    pub dropped_ttl: u64,
    /// Copies dropped because no receiver sits behind the output interface.
    pub dropped_unresolved: u64,
}

impl SimulationStats {
    /// Total packets and copies dropped.
    pub fn dropped(&self) -> u64 {
        self.dropped_no_route + self.dropped_ttl + self.dropped_unresolved
    }
}

/// Per-request traffic counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestStats {
    pub destinations: u64,
    pub packets_sent: u64,
    pub packets_delivered: u64,
}

impl RequestStats {
    /// Delivered packets over the deliveries a lossless network would make.
    pub fn delivery_ratio(&self) -> f64 {
        let expected = self.packets_sent as f64 * self.destinations as f64;
        if expected == 0.0 {
            1.0
        } else {
            self.packets_delivered as f64 / expected
        }
    }
}

/// Deterministic simulation runner.
///
/// Processes events in deterministic order. The same requests and snapshots
/// always produce identical statistics.
pub struct SimulationRunner<S> {
    config: SimulationConfig,

    /// Global event queue and simulation clock.
    queue: EventQueue,

    /// Owns every node's forwarding state.
    driver: RefreshDriver<S>,

    /// Position of each request in the driver's request list.
    request_index: HashMap<RequestId, usize>,

    /// Next sequence number per request.
    burst_sequence: HashMap<RequestId, u64>,

    stats: SimulationStats,
    request_stats: BTreeMap<RequestId, RequestStats>,
}

impl<S: SnapshotSource> SimulationRunner<S> {
    /// Create a runner and schedule the first refresh plus every burst start.
    pub fn new(
        config: SimulationConfig,
        source: S,
        roles: NodeRoles,
        requests: Vec<MulticastRequest>,
    ) -> Self {
        let mut queue = EventQueue::new();
        queue.schedule(None, Duration::ZERO, Event::RefreshTimer { epoch_ns: 0 });

        let mut request_index = HashMap::with_capacity(requests.len());
        let mut request_stats = BTreeMap::new();
        for (index, request) in requests.iter().enumerate() {
            request_index.insert(request.id, index);
            request_stats.insert(
                request.id,
                RequestStats {
                    destinations: request.destinations.len() as u64,
                    ..RequestStats::default()
                },
            );
            if request.duration_ns == 0 {
                debug!(request = %request.id, "Empty request, no burst scheduled");
                continue;
            }
            queue.schedule(
                Some(request.source),
                Duration::from_nanos(request.start_time_ns),
                Event::BurstTick {
                    request: request.id,
                },
            );
        }

        info!(
            requests = requests.len(),
            nodes = roles.num_nodes,
            mode = ?config.refresh.mode,
            "Initialized multicast simulation"
        );

        let driver = RefreshDriver::new(config.refresh.clone(), source, roles, requests);
        Self {
            config,
            queue,
            driver,
            request_index,
            burst_sequence: HashMap::new(),
            stats: SimulationStats::default(),
            request_stats,
        }
    }

    /// Builder: bit positions used in BIER mode.
    pub fn with_bit_positions(mut self, bit_positions: BitPositionMap) -> Self {
        self.driver = self.driver.with_bit_positions(bit_positions);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn request_stats(&self) -> &BTreeMap<RequestId, RequestStats> {
        &self.request_stats
    }

    pub fn driver(&self) -> &RefreshDriver<S> {
        &self.driver
    }

    /// Get current simulation time.
    pub fn now(&self) -> Duration {
        self.queue.now()
    }

    /// Number of events still pending.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Run until the configured end time.
    pub fn run(&mut self) -> Result<(), SimulationError> {
        self.run_until(self.config.refresh.end_time)
    }

    /// Run simulation until no more events or time limit reached.
    pub fn run_until(&mut self, end_time: Duration) -> Result<(), SimulationError> {
        trace!(
            end_time_secs = end_time.as_secs_f64(),
            "Running simulation step"
        );

        while let Some((key, event)) = self.queue.pop_until(end_time) {
            trace!(time = ?key.time, node = ?key.node, event = event.type_name(), "Processing event");

            self.stats.events_processed += 1;
            self.stats.events_by_priority[event.priority() as usize] += 1;
            self.handle(key, event)?;
        }

        // Callers polling in steps rely on the clock reaching `end_time`.
        self.queue.advance_to(end_time);

        debug!(
            events_processed = self.stats.events_processed,
            remaining_events = self.queue.len(),
            final_time = ?self.queue.now(),
            "Simulation step complete"
        );
        Ok(())
    }

    fn handle(&mut self, key: EventKey, event: Event) -> Result<(), SimulationError> {
        match event {
            Event::RefreshTimer { epoch_ns } => {
                let outcome = self.driver.refresh(epoch_ns, &mut self.queue)?;
                self.stats.refreshes += 1;
                self.stats.entries_installed += outcome.entries_installed as u64;
            }
            Event::UnbindLinkTimer { binding } => {
                if self.driver.unbind(&binding) {
                    self.stats.bindings_removed += 1;
                }
            }
            Event::BurstTick { request } => self.emit_burst(request)?,
            Event::PacketReceived { packet, interface } => {
                if let Some(node) = key.node {
                    self.receive(node, packet, interface)?;
                }
            }
        }
        Ok(())
    }

    fn request(&self, id: RequestId) -> Result<&MulticastRequest, SimulationError> {
        self.request_index
            .get(&id)
            .and_then(|&index| self.driver.requests().get(index))
            .ok_or(SimulationError::UnknownRequest { request: id })
    }

    /// Emit the next packet of `id` at its source and schedule the following one.
    fn emit_burst(&mut self, id: RequestId) -> Result<(), SimulationError> {
        let request = self.request(id)?.clone();
        let sequence = self.burst_sequence.entry(id).or_insert(0);
        let seq = *sequence;
        *sequence += 1;

        self.stats.packets_sent += 1;
        if let Some(stats) = self.request_stats.get_mut(&id) {
            stats.packets_sent += 1;
        }

        match self.config.refresh.mode {
            ForwardingMode::RouteTable => self.emit_routed(&request, seq)?,
            ForwardingMode::Bier => self.emit_bier(&request, seq)?,
        }

        let gap = Duration::from_nanos(request.packet_gap_ns());
        let next = self.queue.now() + gap;
        if next < Duration::from_nanos(request.end_time_ns()) {
            self.queue
                .schedule(Some(request.source), next, Event::BurstTick { request: id });
        }
        Ok(())
    }

    fn emit_routed(&mut self, request: &MulticastRequest, seq: u64) -> Result<(), SimulationError> {
        let group = request.group(ROUTE_GROUP_BASE);
        let origin = Origin::new(request.source, NO_INTERFACE);
        let decision = self
            .driver
            .routing()
            .decide(request.source, request.source, origin, group)?;

        let Decision::Outbound { interface } = decision else {
            debug!(request = %request.id, seq, group = %group, "Source has no route, dropping packet");
            self.stats.dropped_no_route += 1;
            return Ok(());
        };

        let packet = Packet {
            request: request.id,
            source: request.source,
            origin: Origin::new(request.source, interface),
            group,
            ttl: self.config.initial_ttl,
            header: IdSeqHeader::new(request.id.0, seq).to_bytes(),
        };
        trace!(request = %request.id, seq, interface, "Emitting packet");
        self.send_on_interface(request.source, interface, packet);
        Ok(())
    }

    fn emit_bier(&mut self, request: &MulticastRequest, seq: u64) -> Result<(), SimulationError> {
        let bitstring = self
            .driver
            .bit_positions()
            .bitstring_for(&request.destinations)?;
        let header = IdSeqBierHeader::new(request.id.0, seq, bitstring);
        let decision = self
            .driver
            .bier_table(request.source)
            .ok_or(SimulationError::MissingBierTable {
                node: request.source,
            })?
            .process(bitstring)?;

        let interface = decision
            .replicas
            .first()
            .map_or(NO_INTERFACE, |r| r.output_interface);
        let packet = Packet {
            request: request.id,
            source: request.source,
            origin: Origin::new(request.source, interface),
            group: GroupAddress::new(BIER_GROUP_ADDRESS),
            ttl: self.config.initial_ttl,
            header: header.to_bytes(),
        };
        trace!(request = %request.id, seq, bits = %bitstring, replicas = decision.replicas.len(), "Emitting BIER packet");
        for replica in decision.replicas {
            let copy = Packet {
                header: header.with_bitstring(replica.bitstring).to_bytes(),
                ..packet.clone()
            };
            self.send_to(request.source, replica.next_hop, copy);
        }
        Ok(())
    }

    /// Handle `packet` arriving at `node` on `interface`.
    fn receive(
        &mut self,
        node: NodeId,
        packet: Packet,
        interface: InterfaceIndex,
    ) -> Result<(), SimulationError> {
        let is_destination = self.request(packet.request)?.destinations.contains(&node);
        match self.config.refresh.mode {
            ForwardingMode::RouteTable => {
                self.receive_routed(node, packet, interface, is_destination)
            }
            ForwardingMode::Bier => self.receive_bier(node, packet, is_destination),
        }
    }

    fn receive_routed(
        &mut self,
        node: NodeId,
        packet: Packet,
        interface: InterfaceIndex,
        is_destination: bool,
    ) -> Result<(), SimulationError> {
        let header = IdSeqHeader::decode(&mut packet.header.clone())?;
        let decision =
            self.driver
                .routing()
                .decide(node, packet.source, packet.origin, packet.group)?;
        trace!(
            node,
            interface,
            request = header.id,
            seq = header.seq,
            ?decision,
            "Arbitrated packet"
        );

        let interfaces = match decision {
            Decision::Forward { interfaces } => interfaces,
            Decision::NoRoute | Decision::Outbound { .. } => {
                debug!(
                    node,
                    request = %packet.request,
                    seq = header.seq,
                    group = %packet.group,
                    "No multicast route, dropping packet"
                );
                self.stats.dropped_no_route += 1;
                return Ok(());
            }
        };

        if is_destination {
            self.deliver(node, &packet);
        }
        for out in interfaces {
            match packet.forwarded(packet.header.clone()) {
                Some(copy) => self.send_on_interface(node, out, copy),
                None => self.drop_expired(node, &packet),
            }
        }
        Ok(())
    }

    fn receive_bier(
        &mut self,
        node: NodeId,
        packet: Packet,
        is_destination: bool,
    ) -> Result<(), SimulationError> {
        let header = IdSeqBierHeader::decode(&mut packet.header.clone())?;
        let decision = self
            .driver
            .bier_table(node)
            .ok_or(SimulationError::MissingBierTable { node })?
            .process(header.bitstring)?;
        trace!(
            node,
            request = header.id,
            seq = header.seq,
            bits = %header.bitstring,
            deliver = decision.deliver_locally,
            replicas = decision.replicas.len(),
            "Processed BIER packet"
        );

        if decision.deliver_locally && is_destination {
            self.deliver(node, &packet);
        }
        for replica in decision.replicas {
            let bytes = header.with_bitstring(replica.bitstring).to_bytes();
            match packet.forwarded(bytes) {
                Some(copy) => self.send_to(node, replica.next_hop, copy),
                None => self.drop_expired(node, &packet),
            }
        }
        Ok(())
    }

    fn deliver(&mut self, node: NodeId, packet: &Packet) {
        trace!(node, request = %packet.request, "Delivered packet");
        self.stats.packets_delivered += 1;
        if let Some(stats) = self.request_stats.get_mut(&packet.request) {
            stats.packets_delivered += 1;
        }
    }

    fn drop_expired(&mut self, node: NodeId, packet: &Packet) {
        debug!(node, request = %packet.request, "Hop limit exceeded, dropping packet");
        self.stats.dropped_ttl += 1;
    }

    /// Send `packet` out of `interface` on `node` to whoever listens there.
    ///
    /// Link bindings name the receivers on shared channels; otherwise the
    /// interface must face exactly one neighbour.
    fn send_on_interface(&mut self, node: NodeId, interface: InterfaceIndex, packet: Packet) {
        let mut receivers = self
            .driver
            .bindings()
            .receivers(packet.group, node, interface);
        if receivers.is_empty() {
            let neighbor = self.driver.snapshot().and_then(|snapshot| {
                let neighbor = snapshot.interfaces.neighbor_on(node, interface)?;
                let in_interface = snapshot.interfaces.interface_to(neighbor, node)?;
                Some((neighbor, in_interface))
            });
            receivers.extend(neighbor);
        }

        if receivers.is_empty() {
            debug!(node, interface, request = %packet.request, "No receiver behind interface, dropping copy");
            self.stats.dropped_unresolved += 1;
            return;
        }
        for (to, in_interface) in receivers {
            self.schedule_arrival(to, in_interface, packet.clone());
        }
    }

    /// Send `packet` from `node` to its neighbour `to`.
    fn send_to(&mut self, node: NodeId, to: NodeId, packet: Packet) {
        let in_interface = self
            .driver
            .snapshot()
            .and_then(|snapshot| snapshot.interfaces.interface_to(to, node));
        match in_interface {
            Some(in_interface) => self.schedule_arrival(to, in_interface, packet),
            None => {
                debug!(node, to, request = %packet.request, "Next hop is not adjacent, dropping copy");
                self.stats.dropped_unresolved += 1;
            }
        }
    }

    fn schedule_arrival(&mut self, to: NodeId, interface: InterfaceIndex, packet: Packet) {
        self.stats.copies_forwarded += 1;
        let time = self.queue.now() + self.config.link_latency;
        self.queue
            .schedule(Some(to), time, Event::PacketReceived { packet, interface });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_ratio() {
        let stats = RequestStats {
            destinations: 2,
            packets_sent: 10,
            packets_delivered: 15,
        };
        assert!((stats.delivery_ratio() - 0.75).abs() < f64::EPSILON);
        assert_eq!(RequestStats::default().delivery_ratio(), 1.0);
    }

    #[test]
    fn test_delivery_ratio_with_huge_counters() {
        let stats = RequestStats {
            destinations: u64::MAX,
            packets_sent: 4,
            packets_delivered: 0,
        };
        assert_eq!(stats.delivery_ratio(), 0.0);
    }

    #[test]
    fn test_dropped_sums_all_causes() {
        let stats = SimulationStats {
            dropped_no_route: 1,
            dropped_ttl: 2,
            dropped_unresolved: 3,
            ..SimulationStats::default()
        };
        assert_eq!(stats.dropped(), 6);
    }
}
