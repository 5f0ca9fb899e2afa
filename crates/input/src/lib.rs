//! File inputs of a skycast run.
//!
//! - [`schedule`]: the multicast request schedule (CSV), reader and writer
//! - [`fstate`]: per-epoch unicast forwarding state (`fstate_<t>.txt`)
//! - [`generator`]: seeded random schedules over the ground stations

pub mod fstate;
pub mod generator;
pub mod schedule;

pub use fstate::{parse_snapshot, FstateDirectory, InMemorySnapshots};
pub use generator::{GeneratorConfig, RequestGenerator};
pub use schedule::{parse_schedule, read_schedule, write_schedule, ScheduleError};
