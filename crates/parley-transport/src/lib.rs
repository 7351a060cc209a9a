//! Transport port for Parley.
//!
//! The setup session is a single-threaded, poll-driven state machine, so the
//! [`Connection`] trait is synchronous and non-blocking: `send`
//! queues a datagram, `try_recv` returns whatever has already arrived.
//! Implementations that sit on top of an async stack (the WebSocket one)
//! run their I/O on background tasks and hand datagrams across channels.
//!
//! Provided implementations:
//!
//! - [`MemoryConnection`]: an in-process pair with optional loss and
//!   duplication on the unreliable channel.
//! - [`WebSocketConnection`]: feature `websocket` (default), via
//!   `tokio-tungstenite`.

#![allow(async_fn_in_trait)]

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{LinkConfig, LinkStats, MemoryConnection};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketListener};

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts the peer's incoming connection on the hosting side.
pub trait Listener: Send + 'static {
    /// The connection type produced by this listener.
    type Connection: Connection;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, TransportError>;

    /// Stops accepting connections.
    async fn shutdown(&self) -> Result<(), TransportError>;
}

/// A message-oriented link to the one remote peer.
///
/// Every call returns immediately. A closed link is reported as
/// `Err(TransportError::ConnectionClosed)` from `try_recv` once everything
/// that arrived before the close has been drained.
pub trait Connection: Send + 'static {
    /// Sends a datagram over the reliable channel.
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Sends a datagram that may be lost or duplicated.
    ///
    /// Defaults to the reliable channel. Transports with a real best-effort
    /// path override this.
    fn send_unreliable(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.send(data)
    }

    /// Returns the next datagram that has arrived, or `Ok(None)` if nothing
    /// is waiting.
    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// False once either side has closed the link.
    fn is_connected(&self) -> bool;

    /// True on the side that accepted the connection.
    fn is_host(&self) -> bool;

    /// Closes the link. Closing twice is a no-op.
    fn close(&mut self) -> Result<(), TransportError>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
