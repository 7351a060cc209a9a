//! In-process transport with fault injection.
//!
//! [`MemoryConnection::pair`] returns two connected ends that deliver
//! datagrams through channels. Reliable sends always arrive, in order.
//! Unreliable sends go through a small fault model first:
//!
//! | Fault       | Description                                  |
//! |-------------|----------------------------------------------|
//! | Loss        | Drop the datagram with probability `loss_rate`. |
//! | Duplication | Deliver it twice with probability `duplicate_rate`. |
//!
//! The RNG is seedable so a lossy test run can be replayed exactly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::{Connection, ConnectionId, TransportError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Fault model for the unreliable channel of a memory link.
///
/// All probabilities are in `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub loss_rate: f64,
    pub duplicate_rate: f64,
    /// Fixed seed for reproducible runs; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            seed: None,
        }
    }
}

impl LinkConfig {
    /// A link that loses `loss_rate` of unreliable datagrams.
    pub fn lossy(loss_rate: f64, seed: u64) -> Self {
        Self {
            loss_rate,
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Clamps probabilities into `[0.0, 1.0]`; NaN becomes 0.
    pub fn validated(mut self) -> Self {
        let clamp = |p: f64, name: &str| {
            if p.is_nan() || !(0.0..=1.0).contains(&p) {
                let fixed = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
                tracing::warn!(name, value = p, fixed, "link probability out of range, clamping");
                fixed
            } else {
                p
            }
        };
        self.loss_rate = clamp(self.loss_rate, "loss_rate");
        self.duplicate_rate = clamp(self.duplicate_rate, "duplicate_rate");
        self
    }
}

/// Counters kept by each end of a memory link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub sent: u64,
    pub dropped: u64,
    pub duplicated: u64,
}

/// One end of an in-process link.
pub struct MemoryConnection {
    id: ConnectionId,
    host: bool,
    /// `None` once this end has been closed.
    outbox: Option<UnboundedSender<Vec<u8>>>,
    inbox: UnboundedReceiver<Vec<u8>>,
    /// Shared by both ends; cleared by whichever closes first.
    open: Arc<AtomicBool>,
    config: LinkConfig,
    rng: StdRng,
    stats: LinkStats,
}

impl MemoryConnection {
    /// Creates a connected `(host, client)` pair sharing one fault model.
    ///
    /// The client end derives its RNG seed from the host's so the two
    /// directions do not drop in lock-step.
    pub fn pair(config: LinkConfig) -> (MemoryConnection, MemoryConnection) {
        let config = config.validated();
        let (to_client, from_host) = mpsc::unbounded_channel();
        let (to_host, from_client) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        let host_rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let client_rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_os_rng(),
        };

        let host = MemoryConnection {
            id: next_id(),
            host: true,
            outbox: Some(to_client),
            inbox: from_client,
            open: Arc::clone(&open),
            config: config.clone(),
            rng: host_rng,
            stats: LinkStats::default(),
        };
        let client = MemoryConnection {
            id: next_id(),
            host: false,
            outbox: Some(to_host),
            inbox: from_host,
            open,
            config,
            rng: client_rng,
            stats: LinkStats::default(),
        };
        tracing::debug!(host = %host.id, client = %client.id, "memory link created");
        (host, client)
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    fn push(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed(format!("{} is closed", self.id)));
        }
        let outbox = self
            .outbox
            .as_ref()
            .ok_or_else(|| TransportError::ConnectionClosed(format!("{} is closed", self.id)))?;
        outbox
            .send(data.to_vec())
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))?;
        self.stats.sent += 1;
        Ok(())
    }
}

fn next_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

impl Connection for MemoryConnection {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.push(data)
    }

    fn send_unreliable(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.config.loss_rate > 0.0 && self.rng.random_bool(self.config.loss_rate) {
            if !self.open.load(Ordering::Acquire) {
                return Err(TransportError::ConnectionClosed(format!("{} is closed", self.id)));
            }
            self.stats.dropped += 1;
            tracing::trace!(id = %self.id, "dropping unreliable datagram");
            return Ok(());
        }
        self.push(data)?;
        if self.config.duplicate_rate > 0.0 && self.rng.random_bool(self.config.duplicate_rate) {
            self.stats.duplicated += 1;
            tracing::trace!(id = %self.id, "duplicating unreliable datagram");
            self.push(data)?;
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        // The peer's sender is dropped when it closes, so `Disconnected`
        // only shows up after everything it sent has been drained.
        match self.inbox.try_recv() {
            Ok(data) => Ok(Some(data)),
            Err(TryRecvError::Empty) if self.outbox.is_some() => Ok(None),
            Err(_) => Err(TransportError::ConnectionClosed(format!("{} is closed", self.id))),
        }
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn is_host(&self) -> bool {
        self.host
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.outbox.take().is_some() {
            self.open.store(false, Ordering::Release);
            tracing::debug!(id = %self.id, "memory link closed");
        }
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
