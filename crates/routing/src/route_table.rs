//! Per-node multicast route tables and the forwarding arbiter.

use crate::MulticastTree;
use skycast_types::{GroupAddress, InterfaceIndex, NodeId, Origin, NO_INTERFACE};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors raised by the arbiter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArbiterError {
    #[error("node {node}: route for {group} originates on {count} interfaces, expected exactly 1")]
    SingleEgressViolation {
        node: NodeId,
        group: GroupAddress,
        count: usize,
    },

    #[error("node {node} is outside the routing state of {num_nodes} nodes")]
    UnknownNode { node: NodeId, num_nodes: usize },
}

/// One installed multicast route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub origin: Origin,
    pub group: GroupAddress,
    pub input_interface: InterfaceIndex,
    pub output_interfaces: BTreeSet<InterfaceIndex>,
}

/// Outcome of arbitrating one packet at one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The node originates the packet and emits exactly one copy.
    Outbound { interface: InterfaceIndex },
    /// The node relays a copy on every listed interface. Empty at leaves.
    Forward { interfaces: Vec<InterfaceIndex> },
    /// No route for the group; the caller drops the packet.
    NoRoute,
}

/// Multicast routes installed on one node.
#[derive(Debug, Clone, Default)]
pub struct MulticastRouteTable {
    node: NodeId,
    routes: Vec<RouteEntry>,
}

impl MulticastRouteTable {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            routes: Vec::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Install a route, merging output interfaces into an existing entry with
    /// the same origin, group and input interface.
    pub fn install(&mut self, entry: RouteEntry) {
        if let Some(existing) = self.routes.iter_mut().find(|r| {
            r.origin == entry.origin
                && r.group == entry.group
                && r.input_interface == entry.input_interface
        }) {
            existing.output_interfaces.extend(entry.output_interfaces);
            return;
        }
        self.routes.push(entry);
    }

    /// Remove every route.
    pub fn clear(&mut self) {
        self.routes.clear();
    }

    /// Decide what to do with a packet of `group` from `origin`.
    ///
    /// The input interface is a wildcard. A route whose origin also matches
    /// is recognized, but selection is by group alone: the first entry for
    /// the group wins.
    pub fn decide(
        &self,
        source_node: NodeId,
        origin: Origin,
        group: GroupAddress,
    ) -> Result<Decision, ArbiterError> {
        let Some(entry) = self.routes.iter().find(|r| r.group == group) else {
            trace!(node = self.node, group = %group, "No multicast route");
            return Ok(Decision::NoRoute);
        };

        if entry.origin == origin {
            trace!(node = self.node, origin = %origin, group = %group, "Source-specific route matched");
        }

        if source_node == self.node {
            let count = entry.output_interfaces.len();
            return match entry.output_interfaces.first() {
                Some(&interface) if count == 1 => Ok(Decision::Outbound { interface }),
                _ => Err(ArbiterError::SingleEgressViolation {
                    node: self.node,
                    group,
                    count,
                }),
            };
        }

        Ok(Decision::Forward {
            interfaces: entry
                .output_interfaces
                .iter()
                .copied()
                .filter(|&interface| interface != NO_INTERFACE)
                .collect(),
        })
    }
}

/// Route tables of every node, indexed by node id.
#[derive(Debug, Clone, Default)]
pub struct RoutingState {
    tables: Vec<MulticastRouteTable>,
}

impl RoutingState {
    pub fn new(num_nodes: u32) -> Self {
        Self {
            tables: (0..num_nodes).map(MulticastRouteTable::new).collect(),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.tables.len()
    }

    pub fn table(&self, node: NodeId) -> Option<&MulticastRouteTable> {
        self.tables.get(node as usize)
    }

    /// Total number of installed routes across all nodes.
    pub fn route_count(&self) -> usize {
        self.tables.iter().map(MulticastRouteTable::len).sum()
    }

    /// Install one route entry per node of `tree`. Returns the number of
    /// entries installed.
    pub fn install_tree(&mut self, tree: &MulticastTree) -> Result<usize, ArbiterError> {
        let num_nodes = self.tables.len();
        if let Some(&node) = tree.nodes.keys().find(|&&n| n as usize >= num_nodes) {
            return Err(ArbiterError::UnknownNode { node, num_nodes });
        }
        for (&node, tree_node) in &tree.nodes {
            self.tables[node as usize].install(RouteEntry {
                origin: tree.origin,
                group: tree.group,
                input_interface: tree_node.input_interface,
                output_interfaces: tree_node.output_interfaces.clone(),
            });
        }
        debug!(
            request = %tree.request,
            group = %tree.group,
            entries = tree.nodes.len(),
            "Installed multicast routes"
        );
        Ok(tree.nodes.len())
    }

    /// Empty every node's table.
    pub fn clear_all(&mut self) {
        for table in &mut self.tables {
            table.clear();
        }
    }

    /// Arbitrate a packet at `node`.
    pub fn decide(
        &self,
        node: NodeId,
        source_node: NodeId,
        origin: Origin,
        group: GroupAddress,
    ) -> Result<Decision, ArbiterError> {
        self.table(node)
            .ok_or(ArbiterError::UnknownNode {
                node,
                num_nodes: self.tables.len(),
            })?
            .decide(source_node, origin, group)
    }
}
