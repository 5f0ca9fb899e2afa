//! Core types for skycast multicast routing.
//!
//! This crate provides the foundational types used by the synthesizer, the
//! BIER engine and the simulation driver:
//!
//! - **Identifiers**: [`NodeId`], [`InterfaceIndex`], [`RequestId`]
//! - **Addressing**: [`GroupAddress`], [`Origin`]
//! - **Traffic**: [`MulticastRequest`]
//! - **Unicast state**: [`NextHopTable`], [`InterfaceMap`], [`UnicastSnapshot`]
//!   and the [`SnapshotSource`] trait that produces one snapshot per epoch
//! - **Topology roles**: [`NodeRoles`], [`LinkBinding`]
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend on
//! any other workspace crates, making it the foundation layer.

mod address;
mod identifiers;
mod request;
mod topology;
mod unicast;

pub use address::{
    GroupAddress, Origin, BIER_GROUP_ADDRESS, BIER_GROUP_BASE, ROUTE_GROUP_BASE,
};
pub use identifiers::{InterfaceIndex, NodeId, RequestId, NO_INTERFACE};
pub use request::{MulticastRequest, PACKET_SIZE_BYTES};
pub use topology::{LinkBinding, NodeRoles};
pub use unicast::{
    InterfaceMap, NextHop, NextHopTable, SnapshotError, SnapshotSource, UnicastError,
    UnicastSnapshot,
};
