//! Time for Parley.
//!
//! Two separate concerns live here:
//!
//! - [`Clock`]: "what tick is it?" Every duration the session measures
//!   (round trips, resend waits, the readiness pulse) is in 1/60 s ticks.
//!   [`SystemClock`] reads wall time, [`ManualClock`] is stepped by tests.
//! - [`TickScheduler`]: "when should I poll next?" An async pacer that
//!   wakes the driver loop at a fixed rate on the Tokio timer.

mod clock;
mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock, TICKS_PER_SECOND};
pub use scheduler::{PollInfo, PollMetrics, TickConfig, TickPolicy, TickScheduler};
