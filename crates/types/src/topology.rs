//! Node roles and link-layer bindings of a satellite network.

use crate::{GroupAddress, InterfaceIndex, NodeId};

/// Partition of the node id space into satellites and ground stations.
///
/// Satellites occupy ids `0..num_satellites`, ground stations the rest. A
/// plain terrestrial topology uses `num_satellites = 0`: every node is a
/// ground station and no hop ever crosses a shared satellite channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeRoles {
    pub num_nodes: u32,
    pub num_satellites: u32,
}

impl NodeRoles {
    pub fn new(num_nodes: u32, num_satellites: u32) -> Self {
        Self {
            num_nodes,
            num_satellites: num_satellites.min(num_nodes),
        }
    }

    /// Terrestrial topology without satellites.
    pub fn terrestrial(num_nodes: u32) -> Self {
        Self::new(num_nodes, 0)
    }

    pub fn is_satellite(&self, node: NodeId) -> bool {
        node < self.num_satellites
    }

    pub fn is_ground_station(&self, node: NodeId) -> bool {
        node >= self.num_satellites && node < self.num_nodes
    }

    /// Ground stations are the valid traffic endpoints.
    pub fn ground_stations(&self) -> impl Iterator<Item = NodeId> {
        self.num_satellites..self.num_nodes
    }

    /// Whether a hop between `a` and `b` crosses the satellite/ground boundary.
    pub fn crosses_ground_link(&self, a: NodeId, b: NodeId) -> bool {
        (self.is_satellite(a) && self.is_ground_station(b))
            || (self.is_ground_station(a) && self.is_satellite(b))
    }
}

/// Link-layer association on a shared satellite/ground channel.
///
/// Frames sent by `from_node` out of `from_interface` for `group` are
/// delivered to `to_interface` on `to_node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkBinding {
    pub group: GroupAddress,
    pub from_node: NodeId,
    pub from_interface: InterfaceIndex,
    pub to_node: NodeId,
    pub to_interface: InterfaceIndex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_split_id_space() {
        let roles = NodeRoles::new(6, 4);
        assert!(roles.is_satellite(3));
        assert!(!roles.is_satellite(4));
        assert!(roles.is_ground_station(4));
        assert!(!roles.is_ground_station(6));
        assert_eq!(roles.ground_stations().collect::<Vec<_>>(), vec![4, 5]);
    }

    #[test]
    fn test_ground_link_crossing() {
        let roles = NodeRoles::new(6, 4);
        assert!(roles.crosses_ground_link(1, 5));
        assert!(roles.crosses_ground_link(5, 1));
        assert!(!roles.crosses_ground_link(1, 2));
        assert!(!roles.crosses_ground_link(4, 5));
    }

    #[test]
    fn test_terrestrial_has_no_ground_links() {
        let roles = NodeRoles::terrestrial(4);
        assert!(!roles.crosses_ground_link(0, 1));
        assert_eq!(roles.ground_stations().count(), 4);
    }
}
