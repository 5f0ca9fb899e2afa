//! Multicast group and origin addressing.

use crate::{InterfaceIndex, NodeId, RequestId};
use std::fmt;
use std::net::Ipv4Addr;

/// Group base used by the route-table forwarding backend.
pub const ROUTE_GROUP_BASE: Ipv4Addr = Ipv4Addr::new(225, 1, 2, 4);

/// Group base used by the BIER forwarding backend.
pub const BIER_GROUP_BASE: Ipv4Addr = Ipv4Addr::new(233, 0, 0, 0);

/// Well-known destination address marking a packet as BIER-encapsulated.
pub const BIER_GROUP_ADDRESS: Ipv4Addr = Ipv4Addr::new(239, 255, 254, 254);

/// IPv4 multicast group address of a request.
///
/// Derived by offsetting a fixed base address by the request id. For a given
/// base, group addresses and request ids are one-to-one as long as ids stay
/// below 2^32, which schedules numbered from 0 always do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupAddress(Ipv4Addr);

impl GroupAddress {
    /// Derive the group address of `request` relative to `base`.
    ///
    /// The offset is the id modulo 2^32 and the sum wraps around the 32-bit
    /// address space, so ids 2^32 apart share a group.
    pub fn for_request(base: Ipv4Addr, request: RequestId) -> Self {
        let offset = (request.0 % (1 << 32)) as u32;
        let raw = u32::from(base).wrapping_add(offset);
        Self(Ipv4Addr::from(raw))
    }

    /// Wrap an arbitrary address.
    pub fn new(addr: Ipv4Addr) -> Self {
        Self(addr)
    }

    /// The underlying IPv4 address.
    pub fn addr(&self) -> Ipv4Addr {
        self.0
    }

    /// Recover the request id from a group address and its base.
    ///
    /// Returns `None` when the address lies below the base.
    pub fn request_id(&self, base: Ipv4Addr) -> Option<RequestId> {
        u32::from(self.0)
            .checked_sub(u32::from(base))
            .map(|offset| RequestId(offset as u64))
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Origin of a multicast flow: the source node and its single egress interface.
///
/// Stands in for the source's interface address; two origins are equal exactly
/// when they name the same interface on the same node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Origin {
    pub node: NodeId,
    pub interface: InterfaceIndex,
}

impl Origin {
    pub fn new(node: NodeId, interface: InterfaceIndex) -> Self {
        Self { node, interface }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}/if{}", self.node, self.interface)
    }
}
