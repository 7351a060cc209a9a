//! Error types for the protocol layer.

/// Errors raised while turning envelopes into bytes or back.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The datagram could not be parsed: malformed JSON, an unknown message
    /// type, or missing fields.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but breaks a protocol rule, e.g. a latency that
    /// is not on the unit grid.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
