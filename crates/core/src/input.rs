//! Event types for the deterministic runner.

use crate::Packet;
use skycast_types::{InterfaceIndex, LinkBinding, RequestId};

/// Priority levels for event ordering within the same timestamp.
///
/// Events at the same simulation time are processed in priority order.
/// Lower values = higher priority (processed first).
///
/// Refresh timers outrank packet arrivals, so routing state for an epoch is
/// fully rebuilt before any packet of that instant is arbitrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventPriority {
    /// Internal events: consequences of prior event processing.
    Internal = 0,

    /// Timer events: routing refreshes and delayed link unbinding.
    Timer = 1,

    /// Network events: packets arriving at a node.
    Network = 2,

    /// Traffic events: a source emitting the next packet of a burst.
    Traffic = 3,
}

/// All inputs the runner processes.
#[derive(Debug, Clone)]
pub enum Event {
    /// Rebuild multicast state for the epoch starting at `epoch_ns`.
    RefreshTimer { epoch_ns: u64 },

    /// Remove a link binding left over from an earlier epoch.
    UnbindLinkTimer { binding: LinkBinding },

    /// The source of `request` emits its next packet.
    BurstTick { request: RequestId },

    /// `packet` arrives at the event's node on `interface`.
    PacketReceived {
        packet: Packet,
        interface: InterfaceIndex,
    },
}

impl Event {
    /// Get the priority of this event for ordering.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::RefreshTimer { .. } | Event::UnbindLinkTimer { .. } => EventPriority::Timer,
            Event::PacketReceived { .. } => EventPriority::Network,
            Event::BurstTick { .. } => EventPriority::Traffic,
        }
    }

    /// Get the event type name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::RefreshTimer { .. } => "RefreshTimer",
            Event::UnbindLinkTimer { .. } => "UnbindLinkTimer",
            Event::BurstTick { .. } => "BurstTick",
            Event::PacketReceived { .. } => "PacketReceived",
        }
    }
}
