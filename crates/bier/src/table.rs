//! Per-node BIER forwarding tables and their construction.

use crate::{forward, BierError, Bitstring, Replica};
use skycast_types::{InterfaceIndex, NodeId, UnicastSnapshot};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One row of a BIER table, keyed by `bit_position`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BierTableEntry {
    pub bit_position: u32,
    /// Every bit position reached through the same next hop and interface.
    pub forwarding_bitmask: Bitstring,
    pub next_hop: NodeId,
    /// Bit position of the next hop, if it is itself a BIER destination.
    pub next_hop_bit_position: Option<u32>,
    pub output_interface: InterfaceIndex,
}

/// Result of processing a BIER packet at one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BierDecision {
    /// The node's own bit was set: hand a copy to the local receiver.
    pub deliver_locally: bool,
    pub replicas: Vec<Replica>,
}

/// BIER forwarding table of one node.
#[derive(Debug, Clone, Default)]
pub struct BierTable {
    node: NodeId,
    local_bit_position: Option<u32>,
    entries: BTreeMap<u32, BierTableEntry>,
}

impl BierTable {
    pub fn new(node: NodeId, local_bit_position: Option<u32>) -> Self {
        Self {
            node,
            local_bit_position,
            entries: BTreeMap::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn local_bit_position(&self) -> Option<u32> {
        self.local_bit_position
    }

    /// Install or replace the entry for `entry.bit_position`.
    pub fn install(&mut self, entry: BierTableEntry) {
        self.entries.insert(entry.bit_position, entry);
    }

    pub fn lookup(&self, bit_position: u32) -> Result<&BierTableEntry, BierError> {
        self.entries
            .get(&bit_position)
            .ok_or(BierError::UnknownBitPosition {
                node: self.node,
                bit_position,
            })
    }

    pub fn entries(&self) -> impl Iterator<Item = &BierTableEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Handle an arriving bitstring: strip the local bit, then replicate the rest.
    pub fn process(&self, bitstring: Bitstring) -> Result<BierDecision, BierError> {
        let mut remaining = bitstring;
        let mut deliver_locally = false;
        if let Some(local) = self.local_bit_position {
            if remaining.test(local) {
                deliver_locally = true;
                remaining.clear(local)?;
            }
        }
        Ok(BierDecision {
            deliver_locally,
            replicas: forward(remaining, self)?,
        })
    }
}

/// Assignment of BIER bit positions to destination nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitPositionMap {
    by_node: BTreeMap<NodeId, u32>,
    by_bit: BTreeMap<u32, NodeId>,
}

impl BitPositionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign consecutive bit positions from 0 to `nodes` in order.
    pub fn sequential(nodes: impl IntoIterator<Item = NodeId>) -> Result<Self, BierError> {
        let mut map = Self::new();
        for (bit_position, node) in (0u32..).zip(nodes) {
            map.assign(node, bit_position)?;
        }
        Ok(map)
    }

    /// Assign `bit_position` to `node`, replacing the node's previous position.
    pub fn assign(&mut self, node: NodeId, bit_position: u32) -> Result<(), BierError> {
        if bit_position >= crate::BITSTRING_BITS {
            return Err(BierError::BitOutOfRange { bit_position });
        }
        if let Some(&owner) = self.by_bit.get(&bit_position) {
            if owner != node {
                return Err(BierError::DuplicateBitPosition {
                    bit_position,
                    first: owner,
                    second: node,
                });
            }
        }
        if let Some(previous) = self.by_node.insert(node, bit_position) {
            self.by_bit.remove(&previous);
        }
        self.by_bit.insert(bit_position, node);
        Ok(())
    }

    pub fn bit_of(&self, node: NodeId) -> Option<u32> {
        self.by_node.get(&node).copied()
    }

    pub fn node_of(&self, bit_position: u32) -> Option<NodeId> {
        self.by_bit.get(&bit_position).copied()
    }

    /// Bitstring addressing every node in `nodes`.
    pub fn bitstring_for<'a>(
        &self,
        nodes: impl IntoIterator<Item = &'a NodeId>,
    ) -> Result<Bitstring, BierError> {
        let mut bits = Bitstring::ZERO;
        for &node in nodes {
            let bit_position = self
                .bit_of(node)
                .ok_or(BierError::UnassignedNode { node })?;
            bits.set(bit_position)?;
        }
        Ok(bits)
    }

    /// `(node, bit position)` pairs in node order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, u32)> + '_ {
        self.by_node.iter().map(|(&node, &bit)| (node, bit))
    }

    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}

/// Build the BIER table of every node from a unicast snapshot.
///
/// For each assigned destination a node can reach, the entry follows the
/// first next-hop candidate; destinations sharing the same next hop and
/// output interface share one forwarding bitmask. Unreachable destinations
/// are left out of the node's table.
pub fn build_tables(
    snapshot: &UnicastSnapshot,
    assignment: &BitPositionMap,
) -> Result<Vec<BierTable>, BierError> {
    let mut tables = Vec::with_capacity(snapshot.num_nodes as usize);

    for node in 0..snapshot.num_nodes {
        let mut by_neighbor: BTreeMap<(NodeId, InterfaceIndex), Vec<u32>> = BTreeMap::new();
        for (destination, bit_position) in assignment.iter() {
            if destination == node {
                continue;
            }
            match snapshot.next_hop(node, destination) {
                Ok(hop) => by_neighbor
                    .entry((hop.node, hop.out_interface))
                    .or_default()
                    .push(bit_position),
                Err(error) => {
                    warn!(node, destination, bit_position, %error, "BIER destination unreachable");
                }
            }
        }

        let mut table = BierTable::new(node, assignment.bit_of(node));
        for ((next_hop, output_interface), bits) in by_neighbor {
            let mask = Bitstring::from_positions(bits.iter().copied())?;
            for bit_position in bits {
                table.install(BierTableEntry {
                    bit_position,
                    forwarding_bitmask: mask,
                    next_hop,
                    next_hop_bit_position: assignment.bit_of(next_hop),
                    output_interface,
                });
            }
        }
        tables.push(table);
    }

    debug!(
        epoch_ns = snapshot.epoch_ns,
        nodes = tables.len(),
        destinations = assignment.len(),
        "Built BIER tables"
    );
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Star with centre 0 and leaves 1..=3. Interface `i` on the centre faces
    /// leaf `i`; each leaf reaches the centre on interface 1.
    fn star_snapshot() -> UnicastSnapshot {
        let mut snapshot = UnicastSnapshot::new(0, 4);
        for leaf in 1..4 {
            snapshot.add_link(0, leaf, leaf, 1);
            snapshot.next_hops.set(0, leaf, vec![leaf]);
            snapshot.next_hops.set(leaf, 0, vec![0]);
            for other in 1..4 {
                if other != leaf {
                    snapshot.next_hops.set(leaf, other, vec![0]);
                }
            }
        }
        snapshot
    }

    #[test]
    fn test_assignment_rejects_duplicates() {
        let mut map = BitPositionMap::new();
        map.assign(1, 0).unwrap();
        assert_eq!(
            map.assign(2, 0),
            Err(BierError::DuplicateBitPosition {
                bit_position: 0,
                first: 1,
                second: 2
            })
        );
        map.assign(1, 5).unwrap();
        assert_eq!(map.node_of(0), None);
        assert_eq!(map.bit_of(1), Some(5));
    }

    #[test]
    fn test_bitstring_for_unassigned_node() {
        let map = BitPositionMap::sequential([1, 2]).unwrap();
        assert_eq!(
            map.bitstring_for(&[1, 3]),
            Err(BierError::UnassignedNode { node: 3 })
        );
        assert_eq!(
            map.bitstring_for(&[1, 2]).unwrap(),
            Bitstring::from_words([0b11, 0, 0, 0])
        );
    }

    #[test]
    fn test_build_tables_groups_by_next_hop() {
        let map = BitPositionMap::sequential([1, 2, 3]).unwrap();
        let tables = build_tables(&star_snapshot(), &map).unwrap();
        assert_eq!(tables.len(), 4);

        // Leaf 1 reaches both other leaves through the centre.
        let leaf = &tables[1];
        assert_eq!(leaf.local_bit_position(), Some(0));
        assert_eq!(leaf.len(), 2);
        let via_centre = leaf.lookup(1).unwrap();
        assert_eq!(via_centre.next_hop, 0);
        assert_eq!(via_centre.forwarding_bitmask, Bitstring::from_words([0b110, 0, 0, 0]));
        assert_eq!(via_centre.next_hop_bit_position, None);

        // The centre splits towards each leaf.
        let centre = &tables[0];
        assert_eq!(centre.local_bit_position(), None);
        let to_leaf3 = centre.lookup(2).unwrap();
        assert_eq!(to_leaf3.next_hop, 3);
        assert_eq!(to_leaf3.output_interface, 3);
        assert_eq!(to_leaf3.forwarding_bitmask, Bitstring::from_words([0b100, 0, 0, 0]));
        assert_eq!(to_leaf3.next_hop_bit_position, Some(2));
    }

    #[test]
    fn test_unreachable_destination_is_skipped() {
        let mut snapshot = star_snapshot();
        snapshot.next_hops.set_drop(0, 3);
        let map = BitPositionMap::sequential([1, 2, 3]).unwrap();
        let tables = build_tables(&snapshot, &map).unwrap();
        assert!(tables[0].lookup(2).is_err());
        assert!(tables[0].lookup(1).is_ok());
    }

    #[test]
    fn test_process_end_to_end_over_star() {
        let map = BitPositionMap::sequential([1, 2, 3]).unwrap();
        let tables = build_tables(&star_snapshot(), &map).unwrap();

        // Leaf 1 sends to leaves 2 and 3.
        let bits = map.bitstring_for(&[2, 3]).unwrap();
        let at_source = tables[1].process(bits).unwrap();
        assert!(!at_source.deliver_locally);
        assert_eq!(at_source.replicas.len(), 1);
        assert_eq!(at_source.replicas[0].next_hop, 0);

        let at_centre = tables[0].process(at_source.replicas[0].bitstring).unwrap();
        assert!(!at_centre.deliver_locally);
        let next_hops: Vec<_> = at_centre.replicas.iter().map(|r| r.next_hop).collect();
        assert_eq!(next_hops, vec![2, 3]);

        for replica in at_centre.replicas {
            let at_leaf = tables[replica.next_hop as usize]
                .process(replica.bitstring)
                .unwrap();
            assert!(at_leaf.deliver_locally);
            assert!(at_leaf.replicas.is_empty());
        }
    }

    #[test]
    fn test_clear_empties_table() {
        let map = BitPositionMap::sequential([1, 2, 3]).unwrap();
        let mut tables = build_tables(&star_snapshot(), &map).unwrap();
        tables[0].clear();
        assert!(tables[0].is_empty());
        assert!(tables[0].process(Bitstring::ZERO).unwrap().replicas.is_empty());
    }
}
