//! Identifier types.

use std::fmt;

/// Index of a node in the simulated topology.
///
/// Nodes are numbered densely from zero; every per-node table in the workspace
/// is a `Vec` indexed by this value.
pub type NodeId = u32;

/// Index of a network interface on a node.
///
/// Interface 0 is the loopback interface and doubles as the "no interface"
/// sentinel (e.g. the input interface of a route installed at the source).
pub type InterfaceIndex = u32;

/// The "no interface" sentinel.
pub const NO_INTERFACE: InterfaceIndex = 0;

/// Identifier of a multicast request, ascending from zero in schedule order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Raw numeric value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
