//! Bit Index Explicit Replication for skycast.
//!
//! In BIER mode a packet carries its remaining destination set as a
//! [`Bitstring`]. Each node looks up the lowest set bit in its [`BierTable`],
//! sends the bits covered by that entry's forwarding bitmask to the entry's
//! next hop, removes them, and repeats until nothing is left. Every set bit
//! therefore leaves the node in exactly one replica.
//!
//! Tables are derived from the same unicast snapshot as the route-table
//! backend (see [`build_tables`]); bit positions are assigned externally
//! through a [`BitPositionMap`].

mod bitstring;
mod forward;
pub mod header;
mod table;

pub use bitstring::{Bitstring, BITSTRING_BITS, BITSTRING_WORDS};
pub use forward::{forward, Replica};
pub use header::{HeaderError, IdSeqBierHeader, IdSeqHeader};
pub use table::{build_tables, BierDecision, BierTable, BierTableEntry, BitPositionMap};

use skycast_types::NodeId;
use thiserror::Error;

/// Errors raised by BIER bitstring handling and forwarding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BierError {
    #[error("bit position {bit_position} outside the 128-bit bitstring")]
    BitOutOfRange { bit_position: u32 },

    #[error("node {node}: no BIER table entry for bit position {bit_position}")]
    UnknownBitPosition { node: NodeId, bit_position: u32 },

    #[error("node {node}: entry for bit position {bit_position} does not cover its own bit")]
    InconsistentMask { node: NodeId, bit_position: u32 },

    #[error("node {node} has no bit position")]
    UnassignedNode { node: NodeId },

    #[error("bit position {bit_position} assigned to both node {first} and node {second}")]
    DuplicateBitPosition {
        bit_position: u32,
        first: NodeId,
        second: NodeId,
    },
}
