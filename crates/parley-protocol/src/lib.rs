//! Wire protocol for Parley.
//!
//! This crate defines what two peers say to each other while they set up a
//! match:
//!
//! - **Types** ([`SetupMessage`], [`Envelope`], [`EchoFrame`], [`Setting`],
//!   ...): the messages and the setting values they carry.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how envelopes become
//!   datagrams.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (datagrams) → Protocol (Envelope) → Session (setup state)
//! ```
//!
//! The protocol layer knows nothing about connections or about what a
//! message does to the session. It only knows shapes.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ChapterId, ColorIndex, EchoFrame, EchoKind, Envelope, Latency, PlayerSlot,
    PlayerStats, RaceId, RegisteredMode, ResendDelay, Role, SampleNumber,
    ScenarioFileInfo, ScenarioVerdict, Setting, SettingId, SetupMessage,
};
