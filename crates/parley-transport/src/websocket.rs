//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! The socket is split into a reader and a writer half, each driven by its
//! own Tokio task. The [`WebSocketConnection`] the session sees only holds
//! the channel ends, which keeps `send` and `try_recv` non-blocking.
//!
//! ```text
//!  session ──send──► mpsc ──► writer task ──► WebSocket sink
//!  session ◄─try_recv── mpsc ◄── reader task ◄── WebSocket stream
//! ```
//!
//! WebSocket rides on TCP, so there is no best-effort channel:
//! `send_unreliable` falls back to the reliable path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::{Connection, ConnectionId, Listener, TransportError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Accepts the client's WebSocket connection on the hosting side.
pub struct WebSocketListener {
    listener: TcpListener,
}

impl WebSocketListener {
    /// Binds a listener to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket listener bound");
        Ok(Self { listener })
    }

    /// The address actually bound, useful after binding to port 0.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::AcceptFailed)
    }
}

impl Listener for WebSocketListener {
    type Connection = WebSocketConnection;

    async fn accept(&mut self) -> Result<Self::Connection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let ws = tokio_tungstenite::accept_async(stream).await.map_err(|e| {
            TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        let conn = WebSocketConnection::spawn(ws, true);
        tracing::debug!(id = %conn.id, %addr, "accepted WebSocket peer");
        Ok(conn)
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// One end of a WebSocket link, bridged to the non-blocking [`Connection`]
/// contract.
pub struct WebSocketConnection {
    id: ConnectionId,
    host: bool,
    outgoing: Option<UnboundedSender<Message>>,
    incoming: UnboundedReceiver<Vec<u8>>,
    open: Arc<AtomicBool>,
}

impl WebSocketConnection {
    /// Connects to a hosting peer at `url` (e.g. `ws://127.0.0.1:9000`).
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;
        let conn = Self::spawn(ws, false);
        tracing::debug!(id = %conn.id, url, "connected to WebSocket host");
        Ok(conn)
    }

    fn spawn<S>(ws: WebSocketStream<S>, host: bool) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let open = Arc::new(AtomicBool::new(true));

        let writer_open = Arc::clone(&open);
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = sink.send(msg).await {
                    tracing::debug!(%id, error = %e, "WebSocket write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
            writer_open.store(false, Ordering::Release);
        });

        let reader_open = Arc::clone(&open);
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Binary(data)) => {
                        if in_tx.send(data.into()).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text.as_bytes().to_vec()).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue, // ping/pong/frame
                    Err(e) => {
                        tracing::debug!(%id, error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
            reader_open.store(false, Ordering::Release);
        });

        Self {
            id,
            host,
            outgoing: Some(out_tx),
            incoming: in_rx,
            open,
        }
    }
}

impl Connection for WebSocketConnection {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let closed = || TransportError::ConnectionClosed(format!("{} is closed", self.id));
        if !self.open.load(Ordering::Acquire) {
            return Err(closed());
        }
        let outgoing = self.outgoing.as_ref().ok_or_else(closed)?;
        outgoing
            .send(Message::Binary(data.to_vec().into()))
            .map_err(|_| closed())
    }

    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        // The reader task drops its sender on exit, so `Disconnected` comes
        // only after every frame it forwarded has been drained.
        match self.incoming.try_recv() {
            Ok(data) => Ok(Some(data)),
            Err(TryRecvError::Empty) if self.outgoing.is_some() => Ok(None),
            Err(_) => Err(TransportError::ConnectionClosed(format!("{} is closed", self.id))),
        }
    }

    fn is_connected(&self) -> bool {
        self.outgoing.is_some() && self.open.load(Ordering::Acquire)
    }

    fn is_host(&self) -> bool {
        self.host
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(outgoing) = self.outgoing.take() {
            // The writer task exits after flushing the close frame.
            let _ = outgoing.send(Message::Close(None));
            tracing::debug!(id = %self.id, "WebSocket link closing");
        }
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
