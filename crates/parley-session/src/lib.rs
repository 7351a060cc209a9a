//! The pre-match setup session for Parley.
//!
//! Two peers open a setup screen, agree on the match settings, trade chat
//! and portraits, and either both press OK or one of them backs out. This
//! crate is that negotiation, as a single poll-driven [`Session`] built from
//! small parts:
//!
//! 1. **Sequencing** ([`SequenceEngine`]): the echo ping-pong, one frame in
//!    flight per side, resent verbatim when it stalls.
//! 2. **Lag** ([`LagSampler`]): round-trip history and the latency
//!    recommendation shown to the players.
//! 3. **Settings** ([`SettingsReplicator`]): last-writer-wins replication
//!    with edit rights and scenario legality checks.
//! 4. **Streams** ([`StreamMultiplexer`]): chat keystrokes and portrait runs
//!    packed into the four payload bytes of each echo frame.
//! 5. **Readiness** ([`ReadinessCoordinator`]): who has pressed OK, and when
//!    the session is over.
//!
//! # How it fits in the stack
//!
//! ```text
//! Driver / UI (above)   ← calls poll() every tick, subscribes observers
//!     ↕
//! Session (this crate)  ← all setup state, single-threaded
//!     ↕
//! Protocol + Transport  ← SetupMessage envelopes over a Connection
//! ```

mod chat;
mod config;
mod error;
mod lag;
mod mux;
mod observer;
mod portrait;
mod readiness;
mod scenario;
mod sequence;
mod session;
mod settings;
mod stream;

pub use chat::{ChatLine, BACKSPACE, DELETE, LINE_BREAK};
pub use config::{ResendPolicy, SessionConfig};
pub use error::SessionError;
pub use lag::{LagSampler, LagSnapshot};
pub use mux::{Side, StreamEvent, StreamMultiplexer};
pub use observer::SetupObserver;
pub use portrait::{Portrait, PortraitRun, RunCursor, BLANK_PIXEL, MAX_RUN_LENGTH, PORTRAIT_SIZE};
pub use readiness::{CancelReason, ReadinessCoordinator, ReadinessState};
pub use scenario::{compare_scenario, ChapterEntry, ScenarioCatalog, ScenarioTable};
pub use sequence::{EchoOutcome, Retransmission, SequenceEngine};
pub use session::{Session, SessionOutcome};
pub use settings::{EditRights, InitialSettings, NegotiatedSettings, Origin, SettingsReplicator};
pub use stream::ByteRing;
