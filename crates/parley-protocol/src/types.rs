//! Core protocol types for Parley's wire format.
//!
//! Everything in this module travels "on the wire" between the two peers of
//! a setup session: the settings they negotiate, the echo frames that carry
//! lag samples and the chat/portrait streams, and the control messages that
//! move the session from "peer arrived" to "both ready".
//!
//! Think of this as the vocabulary the host and the client share. Neither
//! side ever sends anything that is not a [`SetupMessage`] wrapped in an
//! [`Envelope`].

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Roles and slots
// ---------------------------------------------------------------------------

/// Which end of the link this peer is.
///
/// The host owns the authoritative copy of the match settings and opens the
/// echo exchange; the client answers. Roles never change during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Host,
    Client,
}

impl Role {
    pub fn is_host(self) -> bool {
        matches!(self, Role::Host)
    }

    /// The slot this role occupies before any "host is player 2" swap.
    pub fn default_slot(self) -> PlayerSlot {
        match self {
            Role::Host => PlayerSlot::FIRST,
            Role::Client => PlayerSlot::SECOND,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::Client => write!(f, "client"),
        }
    }
}

/// A player's seat in the match (the "admiral number").
///
/// Only two values are meaningful: slot 0 and slot 1. The scenario decides
/// which races are legal for which slot, so legality checks always take the
/// owning player's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerSlot(pub u8);

impl PlayerSlot {
    pub const FIRST: PlayerSlot = PlayerSlot(0);
    pub const SECOND: PlayerSlot = PlayerSlot(1);

    /// The seat across the table.
    pub fn other(self) -> PlayerSlot {
        if self == Self::FIRST {
            Self::SECOND
        } else {
            Self::FIRST
        }
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Sample numbers and echo frames
// ---------------------------------------------------------------------------

/// The tag carried by every echo frame.
///
/// Both peers walk the same sequence of sample numbers: the host sends `n`,
/// the client answers with `n`, and the next exchange uses `n + 1`. Sample
/// numbers only ever grow during a session, so `u32` is plenty for a lobby
/// that exchanges a few frames per second.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SampleNumber(pub u32);

impl SampleNumber {
    pub fn next(self) -> SampleNumber {
        SampleNumber(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SampleNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the four data bytes of an echo frame mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EchoKind {
    /// Keep-alive: the frame exists only to measure lag.
    Dummy,
    /// Up to four chat keystrokes.
    Chat,
    /// Up to four packed portrait runs.
    Portrait,
}

/// The sequenced, tagged frame used both to measure lag and to carry a few
/// bytes of chat or portrait data.
///
/// Payload bytes are never zero (chat keystrokes are printable or editing
/// characters and portrait runs always have a non-zero length), so the first
/// zero byte terminates the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoFrame {
    pub sample: SampleNumber,
    pub kind: EchoKind,
    pub data: [u8; 4],
}

impl EchoFrame {
    /// Maximum number of payload bytes a single frame carries.
    pub const CAPACITY: usize = 4;

    /// A keep-alive frame with no payload.
    pub fn dummy(sample: SampleNumber) -> Self {
        Self {
            sample,
            kind: EchoKind::Dummy,
            data: [0; 4],
        }
    }

    /// The meaningful payload bytes, stopping at the first zero.
    pub fn payload(&self) -> &[u8] {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(Self::CAPACITY);
        &self.data[..end]
    }
}

// ---------------------------------------------------------------------------
// Setting values
// ---------------------------------------------------------------------------

/// Identifier of a race (faction) defined by the active scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RaceId(pub i16);

/// Identifier of a chapter (level) in the scenario catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(pub i32);

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chapter-{}", self.0)
    }
}

/// Colour index the local player assigns to the opponent's ships.
///
/// Colour 0 means "no colorization" and is always allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorIndex(pub u8);

impl ColorIndex {
    pub const NONE: ColorIndex = ColorIndex(0);
}

/// Input latency, in ticks, applied once the match starts.
///
/// Always a multiple of [`Latency::UNIT`] inside `[0, Latency::MAX]`;
/// [`Latency::new`] snaps anything else into that grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Latency(u32);

impl Latency {
    /// Step between two selectable latencies.
    pub const UNIT: u32 = 3;
    /// Largest selectable latency.
    pub const MAX: u32 = 48;

    /// Snaps `ticks` down to the unit grid and clamps it to the maximum.
    pub fn new(ticks: u32) -> Self {
        let clamped = ticks.min(Self::MAX);
        Self(clamped - clamped % Self::UNIT)
    }

    pub fn ticks(self) -> u32 {
        self.0
    }

    pub fn increased(self) -> Self {
        Self::new(self.0.saturating_add(Self::UNIT))
    }

    pub fn decreased(self) -> Self {
        Self::new(self.0.saturating_sub(Self::UNIT))
    }

    /// True if the value already sits on the grid. Values decoded from the
    /// wire may not.
    pub fn is_canonical(self) -> bool {
        self.0 <= Self::MAX && self.0 % Self::UNIT == 0
    }
}

impl Default for Latency {
    fn default() -> Self {
        Self(Self::UNIT)
    }
}

/// Which echo frames travel over the transport's reliable channel.
///
/// Control messages are always reliable; this only affects echoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum RegisteredMode {
    /// Every echo frame is best-effort.
    #[default]
    Never,
    /// Only retransmitted frames are reliable.
    Resend,
    /// Every echo frame is reliable.
    Always,
}

impl RegisteredMode {
    /// Index used by selection UIs (0, 1, 2). Out-of-range indices clamp to
    /// `Always`.
    pub fn from_index(index: u8) -> Self {
        match index {
            0 => Self::Never,
            1 => Self::Resend,
            _ => Self::Always,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Self::Never => 0,
            Self::Resend => 1,
            Self::Always => 2,
        }
    }

    /// Whether a freshly sent frame should use the reliable channel.
    pub fn first_send_reliable(self) -> bool {
        self == Self::Always
    }

    /// Whether a retransmission should use the reliable channel.
    pub fn resend_reliable(self) -> bool {
        self != Self::Never
    }
}

/// How long the game waits before resending in-match data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResendDelay {
    #[default]
    OneSecond,
    TwoSeconds,
    FourSeconds,
    Never,
}

impl ResendDelay {
    /// Buckets a tick count: up to 60 is one second, up to 120 two, up to
    /// 240 four, anything longer disables resending.
    pub fn from_ticks(ticks: u32) -> Self {
        match ticks {
            0..=60 => Self::OneSecond,
            61..=120 => Self::TwoSeconds,
            121..=240 => Self::FourSeconds,
            _ => Self::Never,
        }
    }

    /// Delay in ticks, `None` when resending is disabled.
    pub fn ticks(self) -> Option<u32> {
        match self {
            Self::OneSecond => Some(60),
            Self::TwoSeconds => Some(120),
            Self::FourSeconds => Some(240),
            Self::Never => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Names a negotiated setting without carrying its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingId {
    Race,
    Level,
    Latency,
    Registered,
    ResendDelay,
    LowerBandwidth,
    ClientCanEdit,
    HostIsPlayer2,
}

impl SettingId {
    /// Settings only the host may ever change.
    pub fn is_host_only(self) -> bool {
        matches!(self, SettingId::ClientCanEdit | SettingId::HostIsPlayer2)
    }
}

/// One replicated setting and its new value.
///
/// `#[serde(tag = "id", content = "value")]` keeps the JSON readable:
/// `{ "id": "Latency", "value": 9 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "id", content = "value")]
pub enum Setting {
    /// The sender's own race. The receiver stores it as the opponent's race.
    Race(RaceId),
    Level(ChapterId),
    Latency(Latency),
    Registered(RegisteredMode),
    ResendDelay(ResendDelay),
    LowerBandwidth(bool),
    ClientCanEdit(bool),
    HostIsPlayer2(bool),
}

impl Setting {
    pub fn id(&self) -> SettingId {
        match self {
            Setting::Race(_) => SettingId::Race,
            Setting::Level(_) => SettingId::Level,
            Setting::Latency(_) => SettingId::Latency,
            Setting::Registered(_) => SettingId::Registered,
            Setting::ResendDelay(_) => SettingId::ResendDelay,
            Setting::LowerBandwidth(_) => SettingId::LowerBandwidth,
            Setting::ClientCanEdit(_) => SettingId::ClientCanEdit,
            Setting::HostIsPlayer2(_) => SettingId::HostIsPlayer2,
        }
    }
}

// ---------------------------------------------------------------------------
// Supplementary payloads
// ---------------------------------------------------------------------------

/// Career numbers shown next to the opponent's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerStats {
    pub minutes_played: u16,
    pub kills: u16,
    pub losses: u16,
}

/// Identity of an external scenario file, announced when one peer opens it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioFileInfo {
    pub file_name: String,
    /// Where the other player can fetch the file if they lack it.
    pub download_url: String,
    pub version: u32,
    pub checksum: u32,
}

/// The receiver's answer to an [`SetupMessage::OpenScenario`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioVerdict {
    /// Same file, same version, same checksum.
    Accepted,
    /// The receiver has no copy of the file.
    Missing,
    /// The receiver's copy is older than the sender's.
    OlderVersion,
    /// The receiver's copy is newer than the sender's.
    NewerVersion,
    /// Versions match but the contents differ.
    WrongChecksum,
}

impl ScenarioVerdict {
    pub fn is_accepted(self) -> bool {
        self == ScenarioVerdict::Accepted
    }
}

// ---------------------------------------------------------------------------
// SetupMessage
// ---------------------------------------------------------------------------

/// Every message a peer can send during setup.
///
/// Internally tagged (`{ "type": "StartMatch" }`), like the rest of the
/// wire format. Only [`SetupMessage::Echo`] is sequenced; everything else is
/// a control message sent once over the reliable channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SetupMessage {
    /// "I have opened the setup screen." Triggers the arrival snapshot.
    ReadyForSetup,

    /// Host → client: the host's seat.
    AdmiralNumber { slot: PlayerSlot },

    /// One setting changed on the sender's side.
    SettingChanged { setting: Setting },

    /// The sender's career numbers.
    PlayerStats(PlayerStats),

    /// "I am ready to load the level."
    StartMatch,

    /// The sender backed out of setup.
    Cancel,

    /// The sender's application is going away.
    PeerLeft,

    /// A sequenced echo frame.
    Echo(EchoFrame),

    /// The sender opened an external scenario file.
    OpenScenario(ScenarioFileInfo),

    /// Answer to [`SetupMessage::OpenScenario`].
    ScenarioReply { verdict: ScenarioVerdict },
}

impl SetupMessage {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            SetupMessage::ReadyForSetup => "ReadyForSetup",
            SetupMessage::AdmiralNumber { .. } => "AdmiralNumber",
            SetupMessage::SettingChanged { .. } => "SettingChanged",
            SetupMessage::PlayerStats(_) => "PlayerStats",
            SetupMessage::StartMatch => "StartMatch",
            SetupMessage::Cancel => "Cancel",
            SetupMessage::PeerLeft => "PeerLeft",
            SetupMessage::Echo(_) => "Echo",
            SetupMessage::OpenScenario(_) => "OpenScenario",
            SetupMessage::ScenarioReply { .. } => "ScenarioReply",
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level wire wrapper. Every datagram is exactly one Envelope.
///
/// ```text
/// ┌──────────────────────────────┐
/// │ seq: 17                      │  ← sender's message counter
/// │ timestamp: 5412              │  ← sender's tick at send time
/// │ ┌──────────────────────────┐ │
/// │ │ message: Echo { #8, .. } │ │
/// │ └──────────────────────────┘ │
/// └──────────────────────────────┘
/// ```
///
/// `seq` and `timestamp` are diagnostics. Ordering and duplicate handling
/// rely on the echo's own sample number, never on `seq`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: u64,
    pub timestamp: u64,
    pub message: SetupMessage,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The peers may run different builds, so the JSON shapes below are
    //! part of the contract.

    use super::*;

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_sample_number_serializes_as_plain_number() {
        let json = serde_json::to_string(&SampleNumber(12)).unwrap();
        assert_eq!(json, "12");
    }

    #[test]
    fn test_sample_number_display() {
        assert_eq!(SampleNumber(5).to_string(), "#5");
    }

    #[test]
    fn test_player_slot_other_swaps_seats() {
        assert_eq!(PlayerSlot::FIRST.other(), PlayerSlot::SECOND);
        assert_eq!(PlayerSlot::SECOND.other(), PlayerSlot::FIRST);
    }

    #[test]
    fn test_role_default_slot_host_is_first() {
        assert_eq!(Role::Host.default_slot(), PlayerSlot(0));
        assert_eq!(Role::Client.default_slot(), PlayerSlot(1));
    }

    // =====================================================================
    // EchoFrame
    // =====================================================================

    #[test]
    fn test_echo_frame_payload_stops_at_first_zero() {
        let frame = EchoFrame {
            sample: SampleNumber(3),
            kind: EchoKind::Chat,
            data: [b'h', b'i', 0, b'x'],
        };
        assert_eq!(frame.payload(), b"hi");
    }

    #[test]
    fn test_echo_frame_payload_full_when_no_zero() {
        let frame = EchoFrame {
            sample: SampleNumber(0),
            kind: EchoKind::Portrait,
            data: [0x13, 0x2f, 0x11, 0x01],
        };
        assert_eq!(frame.payload().len(), EchoFrame::CAPACITY);
    }

    #[test]
    fn test_echo_frame_dummy_has_empty_payload() {
        assert!(EchoFrame::dummy(SampleNumber(9)).payload().is_empty());
    }

    // =====================================================================
    // Setting values
    // =====================================================================

    #[test]
    fn test_latency_new_snaps_to_unit_grid() {
        assert_eq!(Latency::new(10).ticks(), 9);
        assert_eq!(Latency::new(12).ticks(), 12);
    }

    #[test]
    fn test_latency_new_clamps_to_max() {
        assert_eq!(Latency::new(500).ticks(), Latency::MAX);
    }

    #[test]
    fn test_latency_increase_and_decrease_stay_in_bounds() {
        assert_eq!(Latency::new(48).increased().ticks(), 48);
        assert_eq!(Latency::new(0).decreased().ticks(), 0);
        assert_eq!(Latency::new(6).increased().ticks(), 9);
    }

    #[test]
    fn test_latency_deserialized_off_grid_is_not_canonical() {
        let latency: Latency = serde_json::from_str("7").unwrap();
        assert!(!latency.is_canonical());
        assert!(Latency::new(latency.ticks()).is_canonical());
    }

    #[test]
    fn test_resend_delay_from_ticks_buckets() {
        assert_eq!(ResendDelay::from_ticks(60), ResendDelay::OneSecond);
        assert_eq!(ResendDelay::from_ticks(90), ResendDelay::TwoSeconds);
        assert_eq!(ResendDelay::from_ticks(240), ResendDelay::FourSeconds);
        assert_eq!(ResendDelay::from_ticks(241), ResendDelay::Never);
        assert_eq!(ResendDelay::Never.ticks(), None);
    }

    #[test]
    fn test_registered_mode_channel_selection() {
        assert!(!RegisteredMode::Never.resend_reliable());
        assert!(RegisteredMode::Resend.resend_reliable());
        assert!(!RegisteredMode::Resend.first_send_reliable());
        assert!(RegisteredMode::Always.first_send_reliable());
        assert_eq!(RegisteredMode::from_index(7), RegisteredMode::Always);
    }

    #[test]
    fn test_setting_id_host_only() {
        assert!(Setting::HostIsPlayer2(true).id().is_host_only());
        assert!(!Setting::Race(RaceId(100)).id().is_host_only());
    }

    // =====================================================================
    // SetupMessage: JSON shapes
    // =====================================================================

    #[test]
    fn test_setting_changed_json_format() {
        let msg = SetupMessage::SettingChanged {
            setting: Setting::Latency(Latency::new(9)),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "SettingChanged");
        assert_eq!(json["setting"]["id"], "Latency");
        assert_eq!(json["setting"]["value"], 9);
    }

    #[test]
    fn test_echo_json_format() {
        let msg = SetupMessage::Echo(EchoFrame {
            sample: SampleNumber(4),
            kind: EchoKind::Chat,
            data: [b'o', b'k', 0, 0],
        });
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Echo");
        assert_eq!(json["sample"], 4);
        assert_eq!(json["kind"], "Chat");
    }

    #[test]
    fn test_unit_message_json_format() {
        let json: serde_json::Value =
            serde_json::to_value(&SetupMessage::StartMatch).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "StartMatch" }));
    }

    #[test]
    fn test_open_scenario_round_trip() {
        let msg = SetupMessage::OpenScenario(ScenarioFileInfo {
            file_name: "Nebula Run".into(),
            download_url: "http://example.net/nebula".into(),
            version: 3,
            checksum: 0xdead_beef,
        });
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded: SetupMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = Envelope {
            seq: 3,
            timestamp: 420,
            message: SetupMessage::PlayerStats(PlayerStats {
                minutes_played: 90,
                kills: 12,
                losses: 4,
            }),
        };
        let bytes = serde_json::to_vec(&envelope).unwrap();
        let decoded: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope, decoded);
    }

    // =====================================================================
    // Error cases
    // =====================================================================

    #[test]
    fn test_decode_unknown_message_type_returns_error() {
        let unknown = r#"{"type": "LaunchMissiles"}"#;
        let result: Result<SetupMessage, _> = serde_json::from_str(unknown);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_envelope_missing_message_returns_error() {
        let wrong = r#"{"seq": 1, "timestamp": 2}"#;
        let result: Result<Envelope, _> = serde_json::from_str(wrong);
        assert!(result.is_err());
    }
}
