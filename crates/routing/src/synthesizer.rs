//! Multicast tree synthesis over a unicast next-hop snapshot.

use skycast_types::{
    GroupAddress, InterfaceIndex, MulticastRequest, NodeId, Origin, RequestId, UnicastError,
    UnicastSnapshot, NO_INTERFACE, ROUTE_GROUP_BASE,
};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

/// Errors raised while building a multicast tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("request {request} lists its source {node} as a destination")]
    SelfDestination { request: RequestId, node: NodeId },

    #[error("request {request} has no destinations")]
    NoDestinations { request: RequestId },

    #[error("request {request}: routing loop towards {destination} after {hops} hops")]
    RoutingLoop {
        request: RequestId,
        destination: NodeId,
        hops: u32,
    },

    #[error("request {request}: source {node} needs {count} output interfaces, expected exactly 1")]
    SingleEgressViolation {
        request: RequestId,
        node: NodeId,
        count: usize,
    },

    #[error("request {request}: {error}")]
    Unicast {
        request: RequestId,
        #[source]
        error: UnicastError,
    },
}

/// Forwarding state accumulated for one node of a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeNode {
    /// Interface the tree enters this node on; [`NO_INTERFACE`] at the source.
    pub input_interface: InterfaceIndex,
    /// Interfaces copies leave on. Empty at leaves.
    pub output_interfaces: BTreeSet<InterfaceIndex>,
}

/// One directed adjacency used by a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreeHop {
    pub from: NodeId,
    pub out_interface: InterfaceIndex,
    pub to: NodeId,
    pub in_interface: InterfaceIndex,
}

/// The multicast distribution tree of one request in one epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastTree {
    pub request: RequestId,
    pub source: NodeId,
    pub group: GroupAddress,
    pub origin: Origin,
    pub nodes: BTreeMap<NodeId, TreeNode>,
    pub hops: BTreeSet<TreeHop>,
}

impl MulticastTree {
    pub fn node(&self, node: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&node)
    }

    /// The single interface the source emits on.
    pub fn source_interface(&self) -> InterfaceIndex {
        self.origin.interface
    }
}

/// Build the multicast tree of `request` over `snapshot`.
///
/// Every destination path follows candidate 0 of the next-hop table. A node
/// reached from several upstream neighbours keeps the input interface of the
/// last path walked. The tree is rejected if the source would need more than
/// one output interface.
pub fn synthesize(
    request: &MulticastRequest,
    snapshot: &UnicastSnapshot,
) -> Result<MulticastTree, SynthesisError> {
    let source = request.source;
    if request.destinations.is_empty() {
        return Err(SynthesisError::NoDestinations { request: request.id });
    }
    if request.destinations.contains(&source) {
        return Err(SynthesisError::SelfDestination {
            request: request.id,
            node: source,
        });
    }

    let unicast = |error| SynthesisError::Unicast {
        request: request.id,
        error,
    };

    let mut nodes: BTreeMap<NodeId, TreeNode> = BTreeMap::new();
    let mut hops = BTreeSet::new();
    nodes.insert(source, TreeNode::default());

    for &destination in &request.destinations {
        let mut cur = source;
        let mut walked = 0u32;
        while cur != destination {
            if walked >= snapshot.num_nodes {
                return Err(SynthesisError::RoutingLoop {
                    request: request.id,
                    destination,
                    hops: walked,
                });
            }
            let hop = snapshot.next_hop(cur, destination).map_err(unicast)?;

            nodes
                .entry(cur)
                .or_default()
                .output_interfaces
                .insert(hop.out_interface);
            nodes.entry(hop.node).or_default().input_interface = hop.in_interface;
            hops.insert(TreeHop {
                from: cur,
                out_interface: hop.out_interface,
                to: hop.node,
                in_interface: hop.in_interface,
            });

            cur = hop.node;
            walked += 1;
        }
    }

    let source_node = nodes.entry(source).or_default();
    source_node.input_interface = NO_INTERFACE;
    let egress = source_node.output_interfaces.len();
    let source_interface = match source_node.output_interfaces.first() {
        Some(&interface) if egress == 1 => interface,
        _ => {
            return Err(SynthesisError::SingleEgressViolation {
                request: request.id,
                node: source,
                count: egress,
            })
        }
    };

    let group = request.group(ROUTE_GROUP_BASE);
    debug!(
        request = %request.id,
        source,
        group = %group,
        nodes = nodes.len(),
        "Synthesized multicast tree"
    );

    Ok(MulticastTree {
        request: request.id,
        source,
        group,
        origin: Origin::new(source, source_interface),
        nodes,
        hops,
    })
}
