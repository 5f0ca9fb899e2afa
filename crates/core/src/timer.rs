//! Timer scheduling abstraction.
//!
//! The refresh driver asks for future callbacks through [`TimerScheduler`].
//! This trait abstracts the runtime side:
//! - Simulation: inserts into the deterministic event queue
//! - Tests: records the requests for inspection

use skycast_types::LinkBinding;
use std::time::Duration;

/// Timer identification for scheduled events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Periodic routing refresh for the epoch starting at `epoch_ns`.
    Refresh { epoch_ns: u64 },
    /// Delayed removal of a stale link binding.
    UnbindLink(LinkBinding),
}

/// Abstraction for scheduling timers relative to the current time.
///
/// Timers cannot be cancelled. In static-topology mode the next refresh is
/// simply never scheduled.
pub trait TimerScheduler {
    fn set_timer(&mut self, id: TimerId, delay: Duration);
}
