//! Multicast traffic requests.

use crate::{GroupAddress, NodeId, RequestId};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// Size of a full packet on the wire, used to pace bursts.
pub const PACKET_SIZE_BYTES: u64 = 1500;

/// One multicast flow: a single source sending to a set of destinations
/// at a target rate during `[start_time_ns, start_time_ns + duration_ns)`.
///
/// Created once from schedule data and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct MulticastRequest {
    pub id: RequestId,
    pub source: NodeId,
    /// Never empty, never contains `source`.
    pub destinations: BTreeSet<NodeId>,
    pub target_rate_mbps: f64,
    pub start_time_ns: u64,
    pub duration_ns: u64,
    pub additional_parameters: String,
    pub metadata: String,
}

impl MulticastRequest {
    /// Create a request with empty additional parameters and metadata.
    pub fn new(
        id: RequestId,
        source: NodeId,
        destinations: impl IntoIterator<Item = NodeId>,
        target_rate_mbps: f64,
        start_time_ns: u64,
        duration_ns: u64,
    ) -> Self {
        Self {
            id,
            source,
            destinations: destinations.into_iter().collect(),
            target_rate_mbps,
            start_time_ns,
            duration_ns,
            additional_parameters: String::new(),
            metadata: String::new(),
        }
    }

    /// Builder: set the free-form metadata column.
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    /// Exclusive end of the active interval.
    pub fn end_time_ns(&self) -> u64 {
        self.start_time_ns.saturating_add(self.duration_ns)
    }

    /// Whether the request's active interval intersects `[from_ns, to_ns)`.
    pub fn is_active_during(&self, from_ns: u64, to_ns: u64) -> bool {
        self.start_time_ns < to_ns && self.end_time_ns() > from_ns
    }

    /// Group address of this request relative to `base`.
    pub fn group(&self, base: Ipv4Addr) -> GroupAddress {
        GroupAddress::for_request(base, self.id)
    }

    /// Gap between two consecutive full-size packets at the target rate.
    ///
    /// `rate_mbps / 8000` is the rate in bytes per nanosecond.
    pub fn packet_gap_ns(&self) -> u64 {
        (PACKET_SIZE_BYTES as f64 * 8000.0 / self.target_rate_mbps).ceil() as u64
    }
}
