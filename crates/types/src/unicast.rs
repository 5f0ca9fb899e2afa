//! Unicast state adapter.
//!
//! The unicast next-hop computation lives outside this workspace. What the
//! multicast engine consumes is one [`UnicastSnapshot`] per epoch: an ordered
//! candidate list per `(node, destination)` plus the interface indices of every
//! adjacency. Only the first candidate is ever used.

use crate::{InterfaceIndex, NodeId};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors resolving a unicast next hop.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnicastError {
    #[error("node {node} is out of range (topology has {num_nodes} nodes)")]
    UnknownNode { node: NodeId, num_nodes: u32 },

    #[error("no unicast route from node {node} towards node {destination}")]
    NoRoute { node: NodeId, destination: NodeId },

    #[error("node {neighbor} is not an adjacent neighbor of node {node}")]
    NotNeighbor { node: NodeId, neighbor: NodeId },
}

/// Errors producing a snapshot for an epoch.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no unicast snapshot available for epoch {epoch_ns} ns")]
    Missing { epoch_ns: u64 },

    #[error("failed to read unicast snapshot {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed unicast snapshot line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// A resolved hop: the chosen neighbor and the interfaces on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NextHop {
    /// Neighbor the packet is handed to.
    pub node: NodeId,
    /// Interface on the current node leading to `node`.
    pub out_interface: InterfaceIndex,
    /// Interface on `node` the packet arrives on.
    pub in_interface: InterfaceIndex,
}

/// `node × destination → ordered next-hop candidates`.
///
/// A missing entry or an empty candidate list means "drop".
#[derive(Debug, Clone, Default)]
pub struct NextHopTable {
    candidates: HashMap<(NodeId, NodeId), Vec<NodeId>>,
}

impl NextHopTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the candidate list of `(node, destination)`.
    pub fn set(&mut self, node: NodeId, destination: NodeId, candidates: Vec<NodeId>) {
        self.candidates.insert((node, destination), candidates);
    }

    /// Mark `(node, destination)` as a drop.
    pub fn set_drop(&mut self, node: NodeId, destination: NodeId) {
        self.candidates.remove(&(node, destination));
    }

    /// All candidates, best first. Empty when the pair is a drop.
    pub fn candidates(&self, node: NodeId, destination: NodeId) -> &[NodeId] {
        self.candidates
            .get(&(node, destination))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The deterministic choice: candidate 0.
    pub fn first(&self, node: NodeId, destination: NodeId) -> Option<NodeId> {
        self.candidates(node, destination).first().copied()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Interface index table: which interface of a node faces a given neighbor.
///
/// Point-to-point interfaces face exactly one neighbor. Shared-channel
/// interfaces (a ground station's uplink) face many; for those the reverse
/// lookup [`InterfaceMap::neighbor_on`] is ambiguous and returns `None`.
#[derive(Debug, Clone, Default)]
pub struct InterfaceMap {
    towards: HashMap<(NodeId, NodeId), InterfaceIndex>,
    facing: HashMap<(NodeId, InterfaceIndex), Vec<NodeId>>,
}

impl InterfaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `interface` on `node` leads to `neighbor`.
    pub fn insert(&mut self, node: NodeId, neighbor: NodeId, interface: InterfaceIndex) {
        if let Some(previous) = self.towards.insert((node, neighbor), interface) {
            if let Some(neighbors) = self.facing.get_mut(&(node, previous)) {
                neighbors.retain(|&n| n != neighbor);
            }
        }
        let neighbors = self.facing.entry((node, interface)).or_default();
        if !neighbors.contains(&neighbor) {
            neighbors.push(neighbor);
        }
    }

    /// Interface on `node` leading to `neighbor`.
    pub fn interface_to(&self, node: NodeId, neighbor: NodeId) -> Option<InterfaceIndex> {
        self.towards.get(&(node, neighbor)).copied()
    }

    /// The unique neighbor behind `interface` on `node`, if there is exactly one.
    pub fn neighbor_on(&self, node: NodeId, interface: InterfaceIndex) -> Option<NodeId> {
        match self.facing.get(&(node, interface)).map(Vec::as_slice) {
            Some([only]) => Some(*only),
            _ => None,
        }
    }
}

/// Unicast state of one epoch.
#[derive(Debug, Clone, Default)]
pub struct UnicastSnapshot {
    pub epoch_ns: u64,
    pub num_nodes: u32,
    pub next_hops: NextHopTable,
    pub interfaces: InterfaceMap,
}

impl UnicastSnapshot {
    pub fn new(epoch_ns: u64, num_nodes: u32) -> Self {
        Self {
            epoch_ns,
            num_nodes,
            next_hops: NextHopTable::new(),
            interfaces: InterfaceMap::new(),
        }
    }

    /// Register a bidirectional adjacency `a:a_if <-> b:b_if`.
    pub fn add_link(&mut self, a: NodeId, a_if: InterfaceIndex, b: NodeId, b_if: InterfaceIndex) {
        self.interfaces.insert(a, b, a_if);
        self.interfaces.insert(b, a, b_if);
    }

    fn check_node(&self, node: NodeId) -> Result<(), UnicastError> {
        if node < self.num_nodes {
            Ok(())
        } else {
            Err(UnicastError::UnknownNode {
                node,
                num_nodes: self.num_nodes,
            })
        }
    }

    /// Resolve the hop taken from `node` towards `destination`.
    ///
    /// Selects candidate 0 and looks up the interfaces on both ends of the
    /// adjacency.
    pub fn next_hop(&self, node: NodeId, destination: NodeId) -> Result<NextHop, UnicastError> {
        self.check_node(node)?;
        self.check_node(destination)?;

        let next = self
            .next_hops
            .first(node, destination)
            .ok_or(UnicastError::NoRoute { node, destination })?;
        self.check_node(next)?;

        let out_interface =
            self.interfaces
                .interface_to(node, next)
                .ok_or(UnicastError::NotNeighbor {
                    node,
                    neighbor: next,
                })?;
        let in_interface =
            self.interfaces
                .interface_to(next, node)
                .ok_or(UnicastError::NotNeighbor {
                    node: next,
                    neighbor: node,
                })?;

        Ok(NextHop {
            node: next,
            out_interface,
            in_interface,
        })
    }
}

/// Produces the unicast snapshot of an epoch.
///
/// Implemented over a directory of `fstate_<t>.txt` files by the input crate,
/// and over in-memory snapshots for tests and static topologies.
pub trait SnapshotSource {
    fn load(&mut self, epoch_ns: u64) -> Result<UnicastSnapshot, SnapshotError>;
}
