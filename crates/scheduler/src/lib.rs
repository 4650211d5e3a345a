//! `bearmemori-scheduler` — the housekeeping tick loop: firing due
//! reminders, expiring pending images, expiring stale suggested tags, and
//! re-prompting stale pending events, on a fixed interval.

pub mod error;
pub mod housekeeping;

pub use error::{Result, SchedulerError};
pub use housekeeping::{HousekeepingConfig, HousekeepingEngine};
