//! Multicast route synthesis and per-packet arbitration.
//!
//! # Overview
//!
//! ```text
//! MulticastRequest + UnicastSnapshot
//!         │
//!         ▼
//!   synthesize()  ──▶  MulticastTree  ──▶  RoutingState::install_tree()
//!                                               │
//!                                               ▼
//!                          MulticastRouteTable::decide() per packet
//! ```
//!
//! The synthesizer walks the first unicast next-hop candidate from the source
//! towards every destination and merges the hops into one tree. Each node on
//! the tree receives one [`RouteEntry`] with a single input interface and the
//! union of the output interfaces its downstream paths need.
//!
//! [`split`] helps upstream of the synthesizer: the source may only emit one
//! copy, so requests that fan out at the source are split before synthesis.

mod route_table;
pub mod split;
mod synthesizer;

pub use route_table::{ArbiterError, Decision, MulticastRouteTable, RouteEntry, RoutingState};
pub use synthesizer::{synthesize, MulticastTree, SynthesisError, TreeHop, TreeNode};
