//! Packets exchanged between simulated nodes.

use bytes::Bytes;
use skycast_types::{GroupAddress, NodeId, Origin, RequestId};

/// Hop limit given to freshly originated packets.
pub const DEFAULT_TTL: u8 = 64;

/// A multicast packet in flight.
///
/// The addressing fields mirror an IP header; `header` holds the encoded
/// id/sequence (and, for BIER, bitstring) header exactly as it would appear on
/// the wire. Each hop decodes it, so replicas never share mutable state.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub request: RequestId,
    pub source: NodeId,
    pub origin: Origin,
    pub group: GroupAddress,
    pub ttl: u8,
    pub header: Bytes,
}

impl Packet {
    /// Copy of this packet for the next hop, or `None` once the hop limit is spent.
    pub fn forwarded(&self, header: Bytes) -> Option<Self> {
        let ttl = self.ttl.checked_sub(1).filter(|&ttl| ttl > 0)?;
        Some(Self {
            ttl,
            header,
            ..self.clone()
        })
    }
}
