//! Core event model for skycast.
//!
//! This crate provides the types exchanged between the refresh driver, the
//! per-node forwarding logic and whatever runtime drives them:
//!
//! - [`Event`]: All possible inputs processed by the runner
//! - [`EventPriority`]: Ordering priority for events at the same timestamp
//! - [`TimerId`] / [`TimerScheduler`]: How the refresh driver asks for callbacks
//! - [`Packet`]: A multicast packet in flight
//!
//! # Architecture
//!
//! ```text
//! TimerScheduler ──▶ event queue ──▶ Event::RefreshTimer ──▶ RefreshDriver
//!                                 └▶ Event::PacketReceived ──▶ arbiter / BIER
//! ```
//!
//! Everything is synchronous: a handler runs to completion before the next
//! event is popped, so a refresh is never observed half-applied.

mod input;
mod message;
mod timer;

pub use input::{Event, EventPriority};
pub use message::{Packet, DEFAULT_TTL};
pub use timer::{TimerId, TimerScheduler};
