//! Readiness state machine.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ReadinessState
// ---------------------------------------------------------------------------

/// Where the two players are on the way to starting the match.
///
/// ```text
/// NotArrived ──(peer arrives)──→ WaitingOnSelf ⇄ WaitingOnPeer ──→ BothReady
///      │                               │               │
///      └───────────────(cancel / peer left)────────────┴──→ Cancelled
/// ```
///
/// - **NotArrived**: the peer has not opened its setup screen yet.
/// - **WaitingOnSelf**: the local player has not pressed OK.
/// - **WaitingOnPeer**: the local player is ready, the peer is not.
/// - **BothReady**: terminal; the match can load.
/// - **Cancelled**: terminal; either side backed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadinessState {
    NotArrived,
    WaitingOnSelf,
    WaitingOnPeer,
    BothReady,
    Cancelled,
}

impl ReadinessState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::BothReady | Self::Cancelled)
    }
}

impl std::fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotArrived => write!(f, "NotArrived"),
            Self::WaitingOnSelf => write!(f, "WaitingOnSelf"),
            Self::WaitingOnPeer => write!(f, "WaitingOnPeer"),
            Self::BothReady => write!(f, "BothReady"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Who ended the session early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    Local,
    PeerCancelled,
    PeerLeft,
}

// ---------------------------------------------------------------------------
// ReadinessCoordinator
// ---------------------------------------------------------------------------

/// Tracks both players' ready flags and derives the [`ReadinessState`].
#[derive(Debug, Clone)]
pub struct ReadinessCoordinator {
    peer_arrived: bool,
    im_ready: bool,
    opponent_ready: bool,
    cancelled: Option<CancelReason>,
    pulse_interval: u64,
}

impl ReadinessCoordinator {
    pub fn new(pulse_interval: u64) -> Self {
        Self {
            peer_arrived: false,
            im_ready: false,
            opponent_ready: false,
            cancelled: None,
            pulse_interval: pulse_interval.max(1),
        }
    }

    pub fn state(&self) -> ReadinessState {
        if self.cancelled.is_some() {
            ReadinessState::Cancelled
        } else if !self.peer_arrived {
            ReadinessState::NotArrived
        } else if !self.im_ready {
            ReadinessState::WaitingOnSelf
        } else if !self.opponent_ready {
            ReadinessState::WaitingOnPeer
        } else {
            ReadinessState::BothReady
        }
    }

    /// Returns true the first time the peer shows up.
    pub fn peer_arrived(&mut self) -> bool {
        if self.peer_arrived || self.state().is_terminal() {
            return false;
        }
        self.peer_arrived = true;
        true
    }

    /// The local player pressed OK. Returns true if that changed anything;
    /// it is refused before the peer has arrived or after a terminal state.
    pub fn declare_ready(&mut self) -> bool {
        if self.im_ready || !self.peer_arrived || self.state().is_terminal() {
            return false;
        }
        self.im_ready = true;
        true
    }

    /// The peer announced it is ready. A ready peer has obviously arrived.
    pub fn peer_ready(&mut self) -> bool {
        if self.opponent_ready || self.state().is_terminal() {
            return false;
        }
        self.peer_arrived = true;
        self.opponent_ready = true;
        true
    }

    /// Moves to `Cancelled` unless the session already finished.
    pub fn cancel(&mut self, reason: CancelReason) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        self.cancelled = Some(reason);
        true
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.cancelled
    }

    pub fn is_peer_arrived(&self) -> bool {
        self.peer_arrived
    }

    pub fn im_ready(&self) -> bool {
        self.im_ready
    }

    pub fn opponent_ready(&self) -> bool {
        self.opponent_ready
    }

    /// Flash phase for the "opponent is waiting for you" hint. Only on
    /// while the opponent is ready and the local player is not; flips
    /// every `pulse_interval` ticks.
    pub fn pulse(&self, now: u64) -> bool {
        self.opponent_ready
            && !self.im_ready
            && self.cancelled.is_none()
            && (now / self.pulse_interval) % 2 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrived() -> ReadinessCoordinator {
        let mut r = ReadinessCoordinator::new(12);
        r.peer_arrived();
        r
    }

    #[test]
    fn test_initial_state_not_arrived() {
        assert_eq!(ReadinessCoordinator::new(12).state(), ReadinessState::NotArrived);
    }

    #[test]
    fn test_peer_arrived_only_once() {
        let mut r = ReadinessCoordinator::new(12);
        assert!(r.peer_arrived());
        assert!(!r.peer_arrived());
        assert_eq!(r.state(), ReadinessState::WaitingOnSelf);
    }

    #[test]
    fn test_declare_ready_refused_before_arrival() {
        let mut r = ReadinessCoordinator::new(12);
        assert!(!r.declare_ready());
        assert_eq!(r.state(), ReadinessState::NotArrived);
    }

    #[test]
    fn test_self_then_peer_reaches_both_ready() {
        let mut r = arrived();
        assert!(r.declare_ready());
        assert_eq!(r.state(), ReadinessState::WaitingOnPeer);
        assert!(r.peer_ready());
        assert_eq!(r.state(), ReadinessState::BothReady);
    }

    #[test]
    fn test_peer_then_self_reaches_both_ready() {
        let mut r = arrived();
        r.peer_ready();
        assert_eq!(r.state(), ReadinessState::WaitingOnSelf);
        r.declare_ready();
        assert_eq!(r.state(), ReadinessState::BothReady);
    }

    #[test]
    fn test_both_ready_is_sticky() {
        let mut r = arrived();
        r.declare_ready();
        r.peer_ready();
        assert!(!r.cancel(CancelReason::PeerLeft));
        assert!(!r.peer_ready());
        assert_eq!(r.state(), ReadinessState::BothReady);
    }

    #[test]
    fn test_cancel_from_any_open_state() {
        let mut r = ReadinessCoordinator::new(12);
        assert!(r.cancel(CancelReason::PeerCancelled));
        assert_eq!(r.state(), ReadinessState::Cancelled);
        assert_eq!(r.cancel_reason(), Some(CancelReason::PeerCancelled));
        assert!(!r.declare_ready());
    }

    #[test]
    fn test_pulse_flashes_only_while_opponent_waits() {
        let mut r = arrived();
        assert!(!r.pulse(0));

        r.peer_ready();
        assert!(r.pulse(0));
        assert!(r.pulse(11));
        assert!(!r.pulse(12));
        assert!(r.pulse(24));

        r.declare_ready();
        assert!(!r.pulse(0));
    }

    #[test]
    fn test_readiness_state_display() {
        assert_eq!(ReadinessState::WaitingOnPeer.to_string(), "WaitingOnPeer");
    }
}
