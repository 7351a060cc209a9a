//! # Parley
//!
//! Pre-match setup negotiation for two-player networked games.
//!
//! Before a match starts, the two players sit in a setup screen: they pick
//! races and a level, tune the artificial latency, chat, swap portraits, and
//! finally both press OK. Parley is the protocol behind that screen. It
//! keeps the settings identical on both sides over a lossy link, measures
//! round-trip lag, and reports one outcome when the screen closes.
//!
//! ## Crates
//!
//! | Crate | What it does |
//! |---|---|
//! | `parley-protocol` | message types and the wire codec |
//! | `parley-transport` | the `Connection` port, in-memory and WebSocket links |
//! | `parley-tick` | clocks in 1/60 s ticks and the poll pacer |
//! | `parley-session` | the setup `Session` and its parts |
//! | `parley` (this crate) | the async [`SetupDriver`], [`ParleyError`], tracing setup |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parley::prelude::*;
//!
//! # async fn demo(conn: MemoryConnection) -> Result<(), ParleyError> {
//! let driver = SetupDriver::builder().build();
//! let handle = driver.handle();
//! handle.ready()?;
//!
//! let session = driver
//!     .run(conn, ScenarioTable::new(), SystemClock::new(), InitialSettings::default())
//!     .await?;
//! if let Some(SessionOutcome::Success(settings)) = session.outcome() {
//!     println!("starting on {} with latency {}", settings.level, settings.latency.ticks());
//! }
//! # Ok(())
//! # }
//! ```

mod driver;
mod error;

pub use driver::{SetupCommand, SetupDriver, SetupDriverBuilder, SetupHandle};
pub use error::ParleyError;

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber that honours `RUST_LOG` and falls back
/// to `info`. Calling it again is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Everything most callers need in one import.
pub mod prelude {
    pub use crate::{init_tracing, ParleyError, SetupCommand, SetupDriver, SetupHandle};

    pub use parley_protocol::{
        ChapterId, ColorIndex, Latency, PlayerSlot, PlayerStats, RaceId, RegisteredMode,
        ResendDelay, Role, ScenarioFileInfo, ScenarioVerdict, Setting, SettingId,
    };
    pub use parley_session::{
        CancelReason, ChapterEntry, InitialSettings, LagSnapshot, NegotiatedSettings, Origin,
        Portrait, PortraitRun, ReadinessState, RunCursor, ScenarioCatalog, ScenarioTable,
        Session, SessionConfig, SessionError, SessionOutcome, SetupObserver, Side,
    };
    pub use parley_tick::{
        Clock, ManualClock, PollMetrics, SystemClock, TickConfig, TICKS_PER_SECOND,
    };
    pub use parley_transport::{
        Connection, LinkConfig, Listener, MemoryConnection, TransportError, WebSocketConnection,
        WebSocketListener,
    };
}
