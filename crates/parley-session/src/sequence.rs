//! Sequenced echo exchange with retransmission.
//!
//! Host and client play ping-pong with tagged [`EchoFrame`]s. The host
//! sends sample `n`; the client answers with its own frame tagged `n`; the
//! host then moves on to `n + 1`. Each received match is at once the
//! acknowledgement of the receiver's own outstanding frame and the next
//! piece of data from the peer.
//!
//! ```text
//!   host                      client
//!    │ ── #0 (expects #0) ──►   │  match, reply tagged #0, expect #1
//!    │ ◄──────── #0 ─────────   │
//!    │  match, send #1          │
//!    │ ── #1 ───────────────►   │  match, reply tagged #1, expect #2
//! ```
//!
//! Either side keeps at most one frame outstanding and resends it verbatim
//! if the exchange stalls. A frame tagged lower than expected is a late
//! duplicate and is ignored; one tagged higher than expected means the
//! peers disagree about the sequence (a desync).

use parley_protocol::{EchoFrame, EchoKind, RegisteredMode, Role, SampleNumber};

use crate::{ResendPolicy, SessionError};

/// Result of feeding a received echo frame into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoOutcome {
    /// The frame is the one we were waiting for. Its payload should be
    /// consumed. `round_trip` is the lag of our own frame that it
    /// acknowledges, if we had one outstanding.
    Completed {
        sample: SampleNumber,
        round_trip: Option<u64>,
    },
    /// Late duplicate of something already handled.
    Stale {
        sample: SampleNumber,
        expected: SampleNumber,
    },
    /// Tag beyond anything the peer should have sent.
    Ahead {
        sample: SampleNumber,
        expected: SampleNumber,
    },
}

/// A frame due to be sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retransmission {
    pub frame: EchoFrame,
    /// 1 for the first resend.
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy)]
struct PendingSample {
    frame: EchoFrame,
    first_sent_at: u64,
    last_sent_at: u64,
    attempts: u32,
}

/// One side of the echo exchange.
#[derive(Debug)]
pub struct SequenceEngine {
    role: Role,
    /// Tag of the next frame this side will accept.
    expected: SampleNumber,
    pending: Option<PendingSample>,
    /// Set when it is this side's turn to send.
    turn: bool,
    wait_ticks: u64,
    policy: ResendPolicy,
    resends: u64,
}

impl SequenceEngine {
    pub fn new(role: Role, policy: ResendPolicy) -> Self {
        Self {
            role,
            expected: SampleNumber::default(),
            pending: None,
            turn: false,
            wait_ticks: policy.wait_ticks,
            policy,
            resends: 0,
        }
    }

    /// Opens the exchange. Only the host serves first; on the client this
    /// does nothing.
    pub fn start(&mut self) {
        if self.role.is_host() && self.pending.is_none() {
            self.turn = true;
        }
    }

    /// True when a new frame may be sent: it is this side's turn and nothing
    /// is outstanding.
    pub fn may_begin(&self) -> bool {
        self.turn && self.pending.is_none()
    }

    /// Tags a new frame and marks it outstanding.
    ///
    /// # Errors
    /// [`SessionError::SampleOutstanding`] if an earlier frame has not been
    /// answered yet.
    pub fn begin_sample(
        &mut self,
        kind: EchoKind,
        data: [u8; 4],
        now: u64,
    ) -> Result<EchoFrame, SessionError> {
        if let Some(pending) = &self.pending {
            return Err(SessionError::SampleOutstanding(pending.frame.sample));
        }

        let sample = match self.role {
            Role::Host => self.expected,
            // A reply carries the tag of the frame it answers.
            Role::Client => SampleNumber(self.expected.0.saturating_sub(1)),
        };
        let frame = EchoFrame { sample, kind, data };
        self.pending = Some(PendingSample {
            frame,
            first_sent_at: now,
            last_sent_at: now,
            attempts: 0,
        });
        self.turn = false;
        tracing::trace!(role = %self.role, sample = %frame.sample, ?kind, "echo sent");
        Ok(frame)
    }

    /// Classifies a received frame and advances the sequence on a match.
    pub fn on_echo(&mut self, sample: SampleNumber, now: u64) -> EchoOutcome {
        if sample < self.expected {
            return EchoOutcome::Stale {
                sample,
                expected: self.expected,
            };
        }
        if sample > self.expected {
            return EchoOutcome::Ahead {
                sample,
                expected: self.expected,
            };
        }

        let round_trip = self
            .pending
            .take()
            .map(|p| now.saturating_sub(p.first_sent_at));
        self.expected = self.expected.next();
        self.turn = true;
        self.wait_ticks = self.policy.wait_ticks;
        tracing::trace!(role = %self.role, %sample, ?round_trip, "echo matched");
        EchoOutcome::Completed { sample, round_trip }
    }

    /// Returns the outstanding frame if it has waited longer than the
    /// current threshold. The frame is byte-for-byte the one first sent.
    pub fn on_tick(&mut self, now: u64, registered: RegisteredMode) -> Option<Retransmission> {
        let pending = self.pending.as_mut()?;
        if now.saturating_sub(pending.last_sent_at) <= self.wait_ticks {
            return None;
        }

        pending.last_sent_at = now;
        pending.attempts += 1;
        self.resends += 1;
        if self.policy.escalates_under(registered) {
            self.wait_ticks = self.policy.escalated_wait_ticks;
        }
        tracing::debug!(
            role = %self.role,
            sample = %pending.frame.sample,
            attempt = pending.attempts,
            next_wait = self.wait_ticks,
            "resending echo"
        );
        Some(Retransmission {
            frame: pending.frame,
            attempt: pending.attempts,
        })
    }

    /// Drops any outstanding frame and stops the exchange.
    pub fn abandon(&mut self) {
        self.pending = None;
        self.turn = false;
    }

    pub fn expected(&self) -> SampleNumber {
        self.expected
    }

    pub fn outstanding(&self) -> Option<SampleNumber> {
        self.pending.map(|p| p.frame.sample)
    }

    /// Age of the outstanding frame, measured from its first send.
    pub fn outstanding_age(&self, now: u64) -> Option<u64> {
        self.pending.map(|p| now.saturating_sub(p.first_sent_at))
    }

    pub fn wait_ticks(&self) -> u64 {
        self.wait_ticks
    }

    pub fn total_resends(&self) -> u64 {
        self.resends
    }
}
