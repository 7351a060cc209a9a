/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The link was closed by either side.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding, accepting, or connecting failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The listener was shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// True when the error means the peer is gone for good.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::ConnectionClosed(_) | TransportError::Shutdown)
    }
}
