//! Unified error type for Parley.

use parley_protocol::ProtocolError;
use parley_session::SessionError;
use parley_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` attributes let `?` convert sub-crate errors, so code using
/// the `parley` meta-crate only deals with this one type.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// Connecting, sending, or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The setup session rejected a call.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A command was sent to a driver that has already finished.
    #[error("setup driver is no longer running")]
    DriverStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("peer hung up".into());
        let parley_err: ParleyError = err.into();
        assert!(matches!(parley_err, ParleyError::Transport(_)));
        assert!(parley_err.to_string().contains("peer hung up"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let parley_err: ParleyError = err.into();
        assert!(matches!(parley_err, ParleyError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let parley_err: ParleyError = SessionError::Ended.into();
        assert!(matches!(parley_err, ParleyError::Session(_)));
        assert_eq!(parley_err.to_string(), "session has already ended");
    }
}
