//! Session configuration.

use parley_protocol::RegisteredMode;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ResendPolicy
// ---------------------------------------------------------------------------

/// When an unanswered echo frame is sent again.
///
/// A frame is retransmitted once its age exceeds the current wait. After a
/// retransmission the wait escalates to `escalated_wait_ticks` if the
/// replicated registered mode is at least `escalate_at`, since the reliable
/// channel will keep retrying on its own. Any matched echo resets the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResendPolicy {
    pub wait_ticks: u64,
    pub escalated_wait_ticks: u64,
    /// `None` disables escalation.
    pub escalate_at: Option<RegisteredMode>,
}

impl Default for ResendPolicy {
    fn default() -> Self {
        Self {
            wait_ticks: 60,
            escalated_wait_ticks: 600,
            escalate_at: Some(RegisteredMode::Resend),
        }
    }
}

impl ResendPolicy {
    /// Whether the wait should escalate under the given registered mode.
    pub fn escalates_under(&self, mode: RegisteredMode) -> bool {
        self.escalate_at.is_some_and(|threshold| mode >= threshold)
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Tunables for one setup session. The defaults reproduce the classic
/// lobby behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub resend: ResendPolicy,

    /// Half-period of the "opponent is waiting for you" flash, in ticks.
    pub pulse_interval_ticks: u64,

    /// Characters kept per visible chat line.
    pub visible_chat_limit: usize,

    /// Capacity of each chat byte ring.
    pub stream_capacity: usize,

    /// Desyncs tolerated before the connection-problem flag is raised.
    pub desync_alert_threshold: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resend: ResendPolicy::default(),
            pulse_interval_ticks: 12,
            visible_chat_limit: 120,
            stream_capacity: 512,
            desync_alert_threshold: 3,
        }
    }
}

impl SessionConfig {
    /// Clamps values that would make the session misbehave:
    /// - waits and the pulse interval are at least 1 tick,
    /// - the escalated wait is never shorter than the base wait,
    /// - chat limits and capacity are at least 1,
    /// - the desync threshold is at least 1.
    pub fn validated(mut self) -> Self {
        if self.resend.wait_ticks == 0 {
            tracing::warn!("resend wait_ticks is 0, using 1");
            self.resend.wait_ticks = 1;
        }
        if self.resend.escalated_wait_ticks < self.resend.wait_ticks {
            tracing::warn!(
                escalated = self.resend.escalated_wait_ticks,
                base = self.resend.wait_ticks,
                "escalated wait shorter than base wait, raising it"
            );
            self.resend.escalated_wait_ticks = self.resend.wait_ticks;
        }
        self.pulse_interval_ticks = at_least_one(self.pulse_interval_ticks, "pulse_interval_ticks");
        self.visible_chat_limit = at_least_one(self.visible_chat_limit, "visible_chat_limit");
        self.stream_capacity = at_least_one(self.stream_capacity, "stream_capacity");
        self.desync_alert_threshold =
            at_least_one(self.desync_alert_threshold, "desync_alert_threshold");
        self
    }
}

fn at_least_one<T: PartialEq + From<u8>>(value: T, name: &str) -> T {
    if value == T::from(0) {
        tracing::warn!(name, "config value is 0, using 1");
        T::from(1)
    } else {
        value
    }
}
