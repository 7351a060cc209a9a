//! Tick clocks.
//!
//! Lag samples, resend timers and the readiness pulse are all measured in
//! ticks of 1/60 s. A [`Clock`] answers one question, "what tick is it?",
//! so the session can be driven by wall time in production and by hand in
//! tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Ticks per second of every [`Clock`].
pub const TICKS_PER_SECOND: u64 = 60;

/// A monotonic source of tick counts.
pub trait Clock: Send {
    /// Ticks elapsed since the clock's epoch. Never decreases.
    fn now_ticks(&self) -> u64;
}

/// Wall-clock ticks since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ticks(&self) -> u64 {
        let elapsed = self.epoch.elapsed();
        elapsed.as_secs() * TICKS_PER_SECOND
            + u64::from(elapsed.subsec_nanos()) * TICKS_PER_SECOND / 1_000_000_000
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same counter, so a test can keep one handle and give
/// another to the session under test.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ticks: u64) -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(ticks)),
        }
    }

    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }

    /// Moves the clock to `ticks`. Ignored if that would go backwards.
    pub fn set(&self, ticks: u64) {
        self.ticks.fetch_max(ticks, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

impl<C: Clock + Sync> Clock for Arc<C> {
    fn now_ticks(&self) -> u64 {
        (**self).now_ticks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_clones_share_counter() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        handle.advance(30);
        assert_eq!(clock.now_ticks(), 30);
    }

    #[test]
    fn test_manual_clock_set_never_goes_backwards() {
        let clock = ManualClock::starting_at(100);
        clock.set(50);
        assert_eq!(clock.now_ticks(), 100);
        clock.set(160);
        assert_eq!(clock.now_ticks(), 160);
    }

    #[test]
    fn test_system_clock_starts_near_zero() {
        let clock = SystemClock::new();
        assert!(clock.now_ticks() < TICKS_PER_SECOND);
    }
}
