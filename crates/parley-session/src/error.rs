//! Error types for the setup session.

use parley_protocol::{ProtocolError, SampleNumber};
use parley_transport::TransportError;

/// Errors raised by the session layer.
///
/// Most protocol trouble never becomes an error: stale echoes are ignored,
/// illegal settings are coerced, and desyncs are counted. What remains here
/// is either fatal (the link is gone) or a caller mistake.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport failed or the peer disconnected.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An outgoing message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// `begin_sample` was called while an earlier sample is still waiting
    /// for its echo.
    #[error("sample {0} is still outstanding")]
    SampleOutstanding(SampleNumber),

    /// A portrait run would write past the end of the current row.
    #[error("portrait run of length {length} at ({x}, {y}) overflows the row")]
    PortraitOverflow { x: u8, y: u8, length: u8 },

    /// A portrait run arrived after the whole portrait was filled in.
    #[error("portrait is already complete")]
    PortraitComplete,

    /// A portrait run with length zero.
    #[error("portrait run has zero length")]
    EmptyPortraitRun,

    /// The session has already reached an outcome.
    #[error("session has already ended")]
    Ended,
}

impl SessionError {
    /// True for errors that mean the peer is unreachable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Transport(e) if e.is_disconnect())
    }
}
