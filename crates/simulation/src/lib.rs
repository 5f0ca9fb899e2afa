//! Deterministic multicast simulation.
//!
//! This crate drives the multicast engine through simulated time: it owns
//! every node's forwarding state, rebuilds it on each refresh epoch and
//! pushes paced packet bursts through it. Given the same requests and
//! snapshots, it produces identical results every run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SimulationRunner                       │
//! │                                                         │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     EventQueue (BTreeMap<EventKey, Event>)         │ │
//! │  │     Ordered by: time, priority, node, sequence     │ │
//! │  └───────────┬───────────────────────────┬────────────┘ │
//! │              │ RefreshTimer              │ BurstTick    │
//! │              │ UnbindLinkTimer           │ PacketRecv'd │
//! │              ▼                           ▼              │
//! │  ┌──────────────────────┐   ┌─────────────────────────┐ │
//! │  │  RefreshDriver       │──▶│  arbiter / BIER process │ │
//! │  │  routes, BIER tables │   │  copies → neighbours    │ │
//! │  │  link bindings       │   └─────────────────────────┘ │
//! │  └──────────────────────┘                               │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod event_queue;
mod link_bindings;
mod refresh;
mod runner;

pub use event_queue::{EventKey, EventQueue};
pub use link_bindings::LinkBindingTable;
pub use refresh::{
    ForwardingMode, RefreshConfig, RefreshDriver, RefreshError, RefreshOutcome, RefreshState,
};
pub use runner::{RequestStats, SimulationConfig, SimulationError, SimulationRunner, SimulationStats};
