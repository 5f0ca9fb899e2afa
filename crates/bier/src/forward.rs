//! The BIER replication loop.

use crate::{BierError, BierTable, Bitstring};
use skycast_types::{InterfaceIndex, NodeId};
use tracing::trace;

/// One copy of a packet leaving a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replica {
    pub next_hop: NodeId,
    pub output_interface: InterfaceIndex,
    /// The destinations this copy is still responsible for.
    pub bitstring: Bitstring,
}

/// Replicate `bitstring` according to `table`.
///
/// Repeatedly takes the lowest remaining bit, sends everything its entry's
/// forwarding bitmask covers in one replica and removes those bits. Each set
/// bit ends up in exactly one replica; an empty bitstring yields none.
pub fn forward(bitstring: Bitstring, table: &BierTable) -> Result<Vec<Replica>, BierError> {
    let mut remaining = bitstring;
    let mut replicas = Vec::new();

    while let Some(bit_position) = remaining.lowest_set_bit() {
        let entry = table.lookup(bit_position)?;
        let to_send = remaining & entry.forwarding_bitmask;
        if !to_send.test(bit_position) {
            return Err(BierError::InconsistentMask {
                node: table.node(),
                bit_position,
            });
        }

        trace!(
            node = table.node(),
            bit_position,
            next_hop = entry.next_hop,
            bits = %to_send,
            "BIER replica"
        );
        replicas.push(Replica {
            next_hop: entry.next_hop,
            output_interface: entry.output_interface,
            bitstring: to_send,
        });
        remaining = remaining ^ to_send;
    }

    Ok(replicas)
}
