//! Fixed-rate pacer for the session poll loop.
//!
//! The session itself never sleeps; something has to call `poll()` at a
//! steady rate. [`TickScheduler`] is that something when the session is
//! hosted inside a Tokio task:
//!
//! ```ignore
//! let mut pacer = TickScheduler::new(TickConfig::default());
//! loop {
//!     pacer.wait_for_tick().await;
//!     if let Some(outcome) = session.poll()? {
//!         break outcome;
//!     }
//!     pacer.record_poll_end();
//! }
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when the loop wakes up late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TickPolicy {
    /// Forget the missed polls and schedule the next one from now.
    #[default]
    Skip,
    /// Keep the original cadence; the next poll fires at its planned time.
    Drop,
}

/// Configuration for the poll pacer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickConfig {
    /// Polls per second. The default of 20 matches a 3-tick wait between
    /// event-loop passes.
    pub poll_rate_hz: u32,
    pub policy: TickPolicy,
    /// Fraction of the poll period (0.0–1.0) after which a slow poll is
    /// logged.
    pub budget_warn_threshold: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            poll_rate_hz: 20,
            policy: TickPolicy::default(),
            budget_warn_threshold: 0.80,
        }
    }
}

impl TickConfig {
    /// Upper bound on `poll_rate_hz`. Polling faster than the 60 Hz tick
    /// clock cannot observe anything new.
    pub const MAX_POLL_RATE_HZ: u32 = 60;

    pub fn with_rate(poll_rate_hz: u32) -> Self {
        Self {
            poll_rate_hz,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values:
    /// - `poll_rate_hz` into `1..=MAX_POLL_RATE_HZ`,
    /// - `budget_warn_threshold` into `0.0..=1.0`.
    pub fn validated(mut self) -> Self {
        if self.poll_rate_hz == 0 || self.poll_rate_hz > Self::MAX_POLL_RATE_HZ {
            let fixed = self.poll_rate_hz.clamp(1, Self::MAX_POLL_RATE_HZ);
            warn!(rate = self.poll_rate_hz, fixed, "poll_rate_hz out of range, clamping");
            self.poll_rate_hz = fixed;
        }
        self.budget_warn_threshold = if self.budget_warn_threshold.is_nan() {
            0.80
        } else {
            self.budget_warn_threshold.clamp(0.0, 1.0)
        };
        self
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.poll_rate_hz.max(1)))
    }
}

// ---------------------------------------------------------------------------
// Poll reports
// ---------------------------------------------------------------------------

/// One wake-up of the pacer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInfo {
    /// 1 for the first poll.
    pub poll: u64,
    /// Woke more than a tenth of a period after the due time.
    pub late: bool,
    /// Polls given up to catch up (Skip policy only).
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollMetrics {
    pub polls: u64,
    pub late_wakeups: u64,
    pub skipped: u64,
    pub slow_polls: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Paces a poll loop at a fixed rate on the Tokio timer.
pub struct TickScheduler {
    config: TickConfig,
    period: Duration,
    polls: u64,
    next_due: TokioInstant,
    poll_start: Option<Instant>,
    metrics: PollMetrics,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let period = config.poll_period();
        debug!(
            rate_hz = config.poll_rate_hz,
            period_ms = period.as_secs_f64() * 1000.0,
            policy = ?config.policy,
            "poll pacer created"
        );
        Self {
            config,
            period,
            polls: 0,
            next_due: TokioInstant::now() + period,
            poll_start: None,
            metrics: PollMetrics::default(),
        }
    }

    pub fn with_rate(poll_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(poll_rate_hz))
    }

    /// Sleeps until the next poll is due.
    pub async fn wait_for_tick(&mut self) -> PollInfo {
        let due = self.next_due;
        time::sleep_until(due).await;

        let woke = TokioInstant::now();
        self.polls += 1;
        self.poll_start = Some(Instant::now());

        let lateness = woke.saturating_duration_since(due);
        let late = lateness > self.period / 10;
        let skipped = match (self.config.policy, late) {
            (TickPolicy::Skip, true) => (lateness.as_nanos() / self.period.as_nanos()) as u64,
            _ => 0,
        };
        if skipped > 0 {
            warn!(
                poll = self.polls,
                skipped,
                late_ms = lateness.as_secs_f64() * 1000.0,
                "poll loop fell behind, skipping ahead"
            );
        }

        self.next_due = match self.config.policy {
            TickPolicy::Skip => woke + self.period,
            TickPolicy::Drop => due + self.period,
        };

        self.metrics.polls += 1;
        self.metrics.late_wakeups += u64::from(late);
        self.metrics.skipped += skipped;
        trace!(poll = self.polls, late, "poll due");

        PollInfo {
            poll: self.polls,
            late,
            skipped,
        }
    }

    /// Marks the end of the poll started by the last `wait_for_tick`.
    /// Logs when the poll used more than the configured budget.
    pub fn record_poll_end(&mut self) {
        let Some(start) = self.poll_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        let utilization = elapsed.as_secs_f64() / self.period.as_secs_f64();
        if utilization >= self.config.budget_warn_threshold {
            self.metrics.slow_polls += 1;
            warn!(
                poll = self.polls,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                budget_ms = self.period.as_secs_f64() * 1000.0,
                "poll approaching its budget"
            );
        }
    }

    /// Polls started so far.
    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn metrics(&self) -> PollMetrics {
        self.metrics
    }

    pub fn poll_rate_hz(&self) -> u32 {
        self.config.poll_rate_hz
    }

    pub fn poll_period(&self) -> Duration {
        self.period
    }
}
