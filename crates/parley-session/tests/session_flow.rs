//! Integration tests for the setup session: two peers over an in-memory
//! link, stepped by a shared manual clock.

use std::sync::{Arc, Mutex};

use parley_protocol::{
    ChapterId, Codec, EchoFrame, EchoKind, Envelope, JsonCodec, Latency, PlayerStats, RaceId,
    RegisteredMode, ResendDelay, SampleNumber, ScenarioFileInfo, ScenarioVerdict, Setting,
    SettingId, SetupMessage,
};
use parley_session::{
    CancelReason, ChapterEntry, InitialSettings, LagSnapshot, NegotiatedSettings, Origin,
    Portrait, PortraitRun, ReadinessState, RunCursor, Session, SessionConfig, SessionError,
    ScenarioTable, SessionOutcome, SetupObserver, Side, DELETE, PORTRAIT_SIZE,
};
use parley_tick::ManualClock;
use parley_transport::{Connection, ConnectionId, LinkConfig, MemoryConnection, TransportError};

type TestSession = Session<MemoryConnection, ScenarioTable>;

// =========================================================================
// Fixtures
// =========================================================================

fn catalog() -> ScenarioTable {
    ScenarioTable::new()
        .with_chapter(ChapterEntry::solo(ChapterId(1)))
        .with_chapter(ChapterEntry::networked(
            ChapterId(2),
            &[RaceId(100), RaceId(101)],
            &[RaceId(200), RaceId(201)],
        ))
        .with_chapter(ChapterEntry::networked(
            ChapterId(3),
            &[RaceId(101)],
            &[RaceId(201), RaceId(100)],
        ))
}

fn scenario_file(version: u32) -> ScenarioFileInfo {
    ScenarioFileInfo {
        file_name: "Gaitori Straits".into(),
        download_url: "http://example.net/gaitori".into(),
        version,
        checksum: 0x5eed,
    }
}

fn host_initial() -> InitialSettings {
    InitialSettings {
        level: ChapterId(2),
        race: RaceId(100),
        stats: PlayerStats {
            minutes_played: 300,
            kills: 41,
            losses: 12,
        },
        ..InitialSettings::default()
    }
}

fn client_initial() -> InitialSettings {
    InitialSettings {
        level: ChapterId(2),
        race: RaceId(200),
        stats: PlayerStats {
            minutes_played: 90,
            kills: 7,
            losses: 9,
        },
        ..InitialSettings::default()
    }
}

/// Everything an observer saw, shared with the test body.
#[derive(Default)]
struct Events {
    arrived: u32,
    ready: u32,
    converged: Vec<NegotiatedSettings>,
    cancelled: Vec<CancelReason>,
    lost: u32,
    problems: Vec<u32>,
    verdicts: Vec<ScenarioVerdict>,
    lag: Vec<LagSnapshot>,
    portrait_runs: usize,
    remote_settings: Vec<Setting>,
    opponent_chat: Option<String>,
    stats: Vec<PlayerStats>,
    readiness: Vec<ReadinessState>,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Events>>);

impl Recorder {
    fn events(&self) -> std::sync::MutexGuard<'_, Events> {
        self.0.lock().unwrap()
    }
}

impl SetupObserver for Recorder {
    fn on_peer_arrived(&mut self) {
        self.events().arrived += 1;
    }

    fn on_lag_sample_recorded(&mut self, snapshot: &LagSnapshot) {
        self.events().lag.push(*snapshot);
    }

    fn on_setting_changed(&mut self, setting: Setting, origin: Origin) {
        if origin == Origin::Remote {
            self.events().remote_settings.push(setting);
        }
    }

    fn on_chat_changed(&mut self, side: Side, text: &str) {
        if side == Side::Opponent {
            self.events().opponent_chat = Some(text.to_string());
        }
    }

    fn on_portrait_run_received(&mut self, _run: PortraitRun, _at: RunCursor) {
        self.events().portrait_runs += 1;
    }

    fn on_player_stats(&mut self, stats: PlayerStats) {
        self.events().stats.push(stats);
    }

    fn on_scenario_verdict(&mut self, verdict: ScenarioVerdict, _info: &ScenarioFileInfo) {
        self.events().verdicts.push(verdict);
    }

    fn on_readiness_changed(&mut self, state: ReadinessState) {
        self.events().readiness.push(state);
    }

    fn on_connection_problem(&mut self, desyncs: u32) {
        self.events().problems.push(desyncs);
    }

    fn on_settings_converged(&mut self, settings: &NegotiatedSettings) {
        self.events().converged.push(*settings);
    }

    fn on_ready(&mut self) {
        self.events().ready += 1;
    }

    fn on_cancelled(&mut self, reason: CancelReason) {
        self.events().cancelled.push(reason);
    }

    fn on_connection_lost(&mut self) {
        self.events().lost += 1;
    }
}

struct Peers {
    host: TestSession,
    client: TestSession,
    host_events: Recorder,
    client_events: Recorder,
    clock: ManualClock,
}

impl Peers {
    fn new() -> Self {
        Self::with(LinkConfig::default(), host_initial(), client_initial(), catalog(), catalog())
    }

    fn with(
        link: LinkConfig,
        host_init: InitialSettings,
        client_init: InitialSettings,
        host_catalog: ScenarioTable,
        client_catalog: ScenarioTable,
    ) -> Self {
        let (host_link, client_link) = MemoryConnection::pair(link);
        let clock = ManualClock::new();
        let config = SessionConfig::default();

        let mut host =
            Session::open(host_link, host_catalog, clock.clone(), config.clone(), host_init)
                .unwrap();
        let mut client =
            Session::open(client_link, client_catalog, clock.clone(), config, client_init)
                .unwrap();

        let host_events = Recorder::default();
        let client_events = Recorder::default();
        host.add_observer(Box::new(host_events.clone()));
        client.add_observer(Box::new(client_events.clone()));

        Self {
            host,
            client,
            host_events,
            client_events,
            clock,
        }
    }

    /// Advances the clock one tick at a time, polling both sides each tick.
    fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.clock.advance(1);
            self.host.poll().unwrap();
            self.client.poll().unwrap();
        }
    }
}

fn striped_portrait() -> Portrait {
    let mut pixels = [[0u8; PORTRAIT_SIZE]; PORTRAIT_SIZE];
    for (y, row) in pixels.iter_mut().enumerate() {
        row[..20].fill(3);
        row[20..].fill((y % 16) as u8);
    }
    Portrait::from_pixels(pixels)
}

// -- Raw peer helpers (a hand-driven client without a Session) --

fn raw_send(link: &mut MemoryConnection, message: SetupMessage) {
    let bytes = JsonCodec
        .encode(&Envelope {
            seq: 0,
            timestamp: 0,
            message,
        })
        .unwrap();
    link.send(&bytes).unwrap();
}

fn raw_drain(link: &mut MemoryConnection) -> Vec<SetupMessage> {
    let mut out = Vec::new();
    while let Ok(Some(bytes)) = link.try_recv() {
        let envelope: Envelope = JsonCodec.decode(&bytes).unwrap();
        out.push(envelope.message);
    }
    out
}

fn echoes(messages: &[SetupMessage]) -> Vec<EchoFrame> {
    messages
        .iter()
        .filter_map(|m| match m {
            SetupMessage::Echo(frame) => Some(*frame),
            _ => None,
        })
        .collect()
}

fn host_with_raw_client() -> (TestSession, MemoryConnection, Recorder, ManualClock) {
    let (host_link, mut raw) = MemoryConnection::pair(LinkConfig::default());
    let clock = ManualClock::new();
    let mut host = Session::open(
        host_link,
        catalog(),
        clock.clone(),
        SessionConfig::default(),
        host_initial(),
    )
    .unwrap();
    let events = Recorder::default();
    host.add_observer(Box::new(events.clone()));

    raw_send(&mut raw, SetupMessage::ReadyForSetup);
    clock.advance(1);
    host.poll().unwrap();
    (host, raw, events, clock)
}

// =========================================================================
// Arrival and settings replication
// =========================================================================

#[test]
fn test_arrival_converges_both_views() {
    let host_init = InitialSettings {
        level: ChapterId(3),
        race: RaceId(101),
        latency: Latency::new(12),
        registered: RegisteredMode::Always,
        resend_delay: ResendDelay::TwoSeconds,
        ..host_initial()
    };
    let mut peers = Peers::with(
        LinkConfig::default(),
        host_init,
        client_initial(),
        catalog(),
        catalog(),
    );
    peers.run(10);

    let host = *peers.host.settings();
    let client = *peers.client.settings();
    assert_eq!(client.level, ChapterId(3));
    assert_eq!(client.latency, Latency::new(12));
    assert_eq!(client.registered, RegisteredMode::Always);
    assert_eq!(client.resend_delay, ResendDelay::TwoSeconds);

    // 200 is not legal for the second seat on chapter 3; the client falls
    // back to that seat's default and tells the host.
    assert_eq!(client.my_race, RaceId(201));
    assert_eq!(host.opponent_race, client.my_race);
    assert_eq!(client.opponent_race, host.my_race);
    assert_eq!(host.my_slot, client.opponent_slot);
}

#[test]
fn test_arrival_exchanges_player_stats() {
    let mut peers = Peers::new();
    peers.run(3);

    assert_eq!(peers.host.opponent_stats(), Some(client_initial().stats));
    assert_eq!(peers.client.opponent_stats(), Some(host_initial().stats));
    assert_eq!(peers.host_events.events().arrived, 1);
    assert_eq!(peers.client_events.events().stats.len(), 1);
}

#[test]
fn test_set_setting_latency_reaches_client() {
    let mut peers = Peers::new();
    peers.run(3);

    assert!(peers.host.set_setting(Setting::Latency(Latency::new(24))).unwrap());
    peers.run(2);

    assert_eq!(peers.client.settings().latency, Latency::new(24));
    assert!(peers
        .client_events
        .events()
        .remote_settings
        .contains(&Setting::Latency(Latency::new(24))));
}

#[test]
fn test_client_edits_only_after_host_grants_rights() {
    let mut peers = Peers::new();
    peers.run(3);

    assert!(!peers.client.can_edit(SettingId::Latency));
    assert!(!peers.client.set_setting(Setting::Latency(Latency::new(6))).unwrap());

    peers.host.set_setting(Setting::ClientCanEdit(true)).unwrap();
    peers.run(2);

    assert!(peers.client.can_edit(SettingId::Latency));
    assert!(!peers.client.can_edit(SettingId::HostIsPlayer2));
    assert!(peers.client.set_setting(Setting::Latency(Latency::new(6))).unwrap());
    peers.run(2);
    assert_eq!(peers.host.settings().latency, Latency::new(6));
}

#[test]
fn test_host_is_player2_swaps_seats_on_both_sides() {
    let mut peers = Peers::new();
    peers.run(3);

    peers.host.set_setting(Setting::HostIsPlayer2(true)).unwrap();
    peers.run(3);

    let host = *peers.host.settings();
    let client = *peers.client.settings();
    assert_eq!(host.my_slot.index(), 1);
    assert_eq!(client.my_slot.index(), 0);
    // Both races were re-validated for their new seats.
    assert_eq!(host.my_race, RaceId(200));
    assert_eq!(client.my_race, RaceId(100));
    assert_eq!(host.opponent_race, client.my_race);
    assert_eq!(client.opponent_race, host.my_race);
}

#[test]
fn test_opponent_color_stays_local() {
    let mut peers = Peers::new();
    peers.run(3);

    peers.host.set_opponent_color(parley_protocol::ColorIndex(5)).unwrap();
    peers.run(2);

    assert_eq!(peers.host.settings().opponent_color.0, 5);
    assert_eq!(peers.client.settings().opponent_color.0, 0);
}

// =========================================================================
// Echo exchange and lag
// =========================================================================

#[test]
fn test_echo_exchange_records_lag_on_both_sides() {
    let mut peers = Peers::new();
    peers.run(40);

    assert!(peers.host.lag().recorded() > 10);
    assert!(peers.client.lag().recorded() > 10);
    let snapshot = *peers.host_events.events().lag.last().unwrap();
    assert_eq!(snapshot.latest, 1);
    assert_eq!(snapshot.recommended_latency % 6, 0);
    assert_eq!(peers.host.desync_count(), 0);
}

#[test]
fn test_lossy_link_delivers_chat_exactly_once() {
    let link = LinkConfig {
        loss_rate: 0.3,
        duplicate_rate: 0.2,
        seed: Some(7),
    };
    let mut peers = Peers::with(link, host_initial(), client_initial(), catalog(), catalog());
    peers.run(3);

    for &key in b"hello world" {
        peers.host.type_key(key).unwrap();
    }
    peers.run(3000);

    assert_eq!(peers.client.chat_line(Side::Opponent).text(), "hello world");
    assert!(peers.host.sequence().total_resends() + peers.client.sequence().total_resends() > 0);
    assert_eq!(peers.host.desync_count(), 0);
    assert_eq!(peers.client.desync_count(), 0);
}

#[test]
fn test_resend_is_identical_and_escalates_when_registered() {
    let (mut host, mut raw, _events, clock) = host_with_raw_client();
    host.set_setting(Setting::Registered(RegisteredMode::Resend)).unwrap();

    clock.set(62);
    host.poll().unwrap();
    assert_eq!(host.sequence().wait_ticks(), 600);

    let frames = echoes(&raw_drain(&mut raw));
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], frames[1]);

    // The escalated wait holds back the next resend.
    clock.set(300);
    host.poll().unwrap();
    assert!(echoes(&raw_drain(&mut raw)).is_empty());
}

#[test]
fn test_stale_duplicate_echo_has_no_effect() {
    let (mut host, mut raw, _events, clock) = host_with_raw_client();
    let first = echoes(&raw_drain(&mut raw))[0];

    raw_send(&mut raw, SetupMessage::Echo(EchoFrame::dummy(first.sample)));
    clock.advance(2);
    host.poll().unwrap();
    assert_eq!(host.lag().recorded(), 1);

    raw_send(&mut raw, SetupMessage::Echo(EchoFrame::dummy(first.sample)));
    clock.advance(1);
    host.poll().unwrap();
    assert_eq!(host.lag().recorded(), 1);
    assert_eq!(host.desync_count(), 0);
}

#[test]
fn test_echo_ahead_raises_connection_problem_once() {
    let (mut host, mut raw, events, clock) = host_with_raw_client();

    for _ in 0..4 {
        raw_send(&mut raw, SetupMessage::Echo(EchoFrame::dummy(SampleNumber(9))));
    }
    clock.advance(1);
    host.poll().unwrap();

    assert_eq!(host.desync_count(), 4);
    assert!(host.connection_troubled());
    assert_eq!(events.events().problems, vec![3]);
    assert_eq!(host.outcome(), None);
}

#[test]
fn test_undecodable_datagram_counts_as_desync() {
    let (mut host, mut raw, _events, clock) = host_with_raw_client();
    raw.send(b"\x00garbage").unwrap();
    clock.advance(1);
    host.poll().unwrap();
    assert_eq!(host.desync_count(), 1);
    assert_eq!(host.outcome(), None);
}

// =========================================================================
// Chat and portrait streams
// =========================================================================

#[test]
fn test_chat_reaches_peer_with_deletes_applied() {
    let mut peers = Peers::new();
    peers.run(3);

    for &key in b"gl hff" {
        peers.host.type_key(key).unwrap();
    }
    peers.host.type_key(DELETE).unwrap();
    for &key in b"ty" {
        peers.client.type_key(key).unwrap();
    }
    peers.run(20);

    assert_eq!(peers.host.chat_line(Side::Mine).text(), "gl hf");
    assert_eq!(peers.client.chat_line(Side::Opponent).text(), "gl hf");
    assert_eq!(peers.host.chat_line(Side::Opponent).text(), "ty");
    assert_eq!(
        peers.client_events.events().opponent_chat.as_deref(),
        Some("gl hf")
    );
}

#[test]
fn test_portrait_arrives_intact() {
    let mut peers = Peers::new();
    peers.run(3);

    let portrait = striped_portrait();
    peers.client.set_local_portrait(portrait.clone()).unwrap();
    peers.run(200);

    assert!(peers.client.local_portrait_sent());
    assert!(peers.host.remote_portrait_complete());
    assert_eq!(peers.host.remote_portrait(), &portrait);
    // Per row: 15 + 5 pixels of colour 3, then one run of 12.
    assert_eq!(peers.host_events.events().portrait_runs, 3 * PORTRAIT_SIZE);
}

#[test]
fn test_chat_overtakes_portrait() {
    let mut peers = Peers::new();
    peers.run(3);

    peers.host.set_local_portrait(striped_portrait()).unwrap();
    peers.run(2);
    peers.host.type_key(b'!').unwrap();
    peers.run(3);

    assert_eq!(peers.client.chat_line(Side::Opponent).text(), "!");
    assert!(!peers.client.remote_portrait_complete());
}

// =========================================================================
// Readiness and outcomes
// =========================================================================

#[test]
fn test_declare_ready_refused_before_peer_arrives() {
    let (host_link, _client_link) = MemoryConnection::pair(LinkConfig::default());
    let mut host = Session::open(
        host_link,
        catalog(),
        ManualClock::new(),
        SessionConfig::default(),
        host_initial(),
    )
    .unwrap();
    host.poll().unwrap();

    assert_eq!(host.readiness(), ReadinessState::NotArrived);
    assert!(!host.declare_ready().unwrap());
}

#[test]
fn test_both_ready_succeeds_exactly_once() {
    let mut peers = Peers::new();
    peers.run(3);

    assert!(peers.host.declare_ready().unwrap());
    assert!(!peers.host.can_edit(SettingId::Race));
    peers.run(2);
    assert_eq!(peers.client.readiness(), ReadinessState::WaitingOnSelf);

    assert!(peers.client.declare_ready().unwrap());
    peers.run(5);

    let Some(SessionOutcome::Success(host_settings)) = peers.host.outcome() else {
        panic!("host did not succeed: {:?}", peers.host.outcome());
    };
    let Some(SessionOutcome::Success(client_settings)) = peers.client.outcome() else {
        panic!("client did not succeed: {:?}", peers.client.outcome());
    };
    assert_eq!(host_settings.level, client_settings.level);
    assert_eq!(host_settings.my_race, client_settings.opponent_race);

    assert_eq!(peers.host_events.events().ready, 1);
    assert_eq!(peers.client_events.events().ready, 1);
    assert_eq!(peers.host_events.events().converged, vec![host_settings]);

    // The link stays up for the match.
    assert!(peers.host.connection().is_connected());
    assert!(matches!(
        peers.host.set_setting(Setting::Latency(Latency::new(6))),
        Err(SessionError::Ended)
    ));
}

#[test]
fn test_pulse_flashes_while_opponent_waits() {
    let mut peers = Peers::new();
    peers.run(3);
    peers.host.declare_ready().unwrap();
    peers.run(2);

    let phases: Vec<bool> = (0..24)
        .map(|_| {
            peers.clock.advance(1);
            peers.client.pulse()
        })
        .collect();
    assert!(phases.contains(&true));
    assert!(phases.contains(&false));
    assert!(!peers.host.pulse());
}

#[test]
fn test_client_cancel_restores_host_settings() {
    let mut peers = Peers::new();
    peers.run(3);
    peers.host.set_setting(Setting::Latency(Latency::new(30))).unwrap();
    peers.run(2);

    peers.client.cancel().unwrap();
    assert_eq!(
        peers.client.outcome(),
        Some(SessionOutcome::Cancelled(CancelReason::Local))
    );
    peers.run(2);

    assert_eq!(
        peers.host.outcome(),
        Some(SessionOutcome::Cancelled(CancelReason::PeerCancelled))
    );
    assert_eq!(peers.host.settings().latency, host_initial().latency);
    assert!(!peers.host.connection().is_connected());
    assert_eq!(
        peers.host_events.events().cancelled,
        vec![CancelReason::PeerCancelled]
    );
}

#[test]
fn test_leave_reports_peer_left() {
    let mut peers = Peers::new();
    peers.run(3);
    peers.host.leave().unwrap();
    peers.run(2);

    assert_eq!(
        peers.client.outcome(),
        Some(SessionOutcome::Cancelled(CancelReason::PeerLeft))
    );
    assert_eq!(
        peers.client_events.events().readiness.last(),
        Some(&ReadinessState::Cancelled)
    );
}

#[test]
fn test_peer_disconnect_is_connection_lost() {
    let mut peers = Peers::new();
    peers.run(3);

    let Peers {
        mut host,
        client,
        host_events,
        clock,
        ..
    } = peers;
    let mut link = client.into_connection();
    link.close().unwrap();

    clock.advance(1);
    assert_eq!(host.poll().unwrap(), Some(SessionOutcome::ConnectionLost));
    assert_eq!(host.poll().unwrap(), Some(SessionOutcome::ConnectionLost));
    assert_eq!(host_events.events().lost, 1);
    assert!(matches!(host.type_key(b'x'), Err(SessionError::Ended)));
}

// =========================================================================
// Scenario files
// =========================================================================

#[test]
fn test_open_scenario_accepted_by_matching_peer() {
    let file = scenario_file(2);
    let mut peers = Peers::with(
        LinkConfig::default(),
        host_initial(),
        client_initial(),
        catalog().with_installed(file.clone()),
        catalog().with_installed(file.clone()),
    );
    peers.run(3);

    assert!(peers.host.open_scenario_file(file.clone()).unwrap());
    assert!(!peers.host.scenario_loaded());
    assert!(!peers.host.declare_ready().unwrap());
    peers.run(3);

    assert!(peers.host.scenario_loaded());
    assert!(peers.client.scenario_loaded());
    assert_eq!(peers.client.catalog().active_external(), Some(&file));
    assert_eq!(peers.host_events.events().verdicts, vec![ScenarioVerdict::Accepted]);
    assert_eq!(peers.client_events.events().verdicts, vec![ScenarioVerdict::Accepted]);
    assert!(peers.host.declare_ready().unwrap());
}

#[test]
fn test_open_scenario_rejected_for_older_copy() {
    let mut peers = Peers::with(
        LinkConfig::default(),
        host_initial(),
        client_initial(),
        catalog().with_installed(scenario_file(3)),
        catalog().with_installed(scenario_file(1)),
    );
    peers.run(3);

    peers.host.open_scenario_file(scenario_file(3)).unwrap();
    peers.run(3);

    assert!(!peers.host.scenario_loaded());
    assert!(!peers.client.scenario_loaded());
    assert_eq!(
        peers.host_events.events().verdicts,
        vec![ScenarioVerdict::OlderVersion]
    );
    assert!(!peers.client.declare_ready().unwrap());
}

#[test]
fn test_open_scenario_needs_level_rights() {
    let mut peers = Peers::new();
    peers.run(3);
    assert!(!peers.client.open_scenario_file(scenario_file(1)).unwrap());
}

#[test]
fn test_cancel_resets_client_external_scenario() {
    let file = scenario_file(2);
    let mut peers = Peers::with(
        LinkConfig::default(),
        host_initial(),
        client_initial(),
        catalog().with_installed(file.clone()),
        catalog().with_installed(file.clone()),
    );
    peers.run(3);
    peers.host.open_scenario_file(file).unwrap();
    peers.run(3);

    peers.host.cancel().unwrap();
    peers.run(2);

    assert_eq!(peers.client.catalog().active_external(), None);
    assert!(matches!(
        peers.client.outcome(),
        Some(SessionOutcome::Cancelled(CancelReason::PeerCancelled))
    ));
}

#[test]
fn test_cancel_resets_host_external_scenario() {
    let file = scenario_file(2);
    let mut peers = Peers::with(
        LinkConfig::default(),
        host_initial(),
        client_initial(),
        catalog().with_installed(file.clone()),
        catalog().with_installed(file.clone()),
    );
    peers.run(3);
    peers.host.open_scenario_file(file).unwrap();
    peers.run(3);
    assert!(peers.host.catalog().active_external().is_some());

    peers.host.cancel().unwrap();
    peers.run(2);

    assert_eq!(peers.host.catalog().active_external(), None);
    assert_eq!(peers.host.settings().level, ChapterId(2));
}

// =========================================================================
// Peer hanging up
// =========================================================================

/// A link whose peer sends `Cancel` and hangs up just as this side sends
/// its next echo frame, i.e. after the inbox was checked for the poll.
struct HangsUpOnEcho {
    inner: MemoryConnection,
    peer: Option<MemoryConnection>,
}

impl Connection for HangsUpOnEcho {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.inner.send(data)
    }

    fn send_unreliable(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if let Some(mut peer) = self.peer.take() {
            raw_send(&mut peer, SetupMessage::Cancel);
            peer.close().unwrap();
        }
        self.inner.send_unreliable(data)
    }

    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        self.inner.try_recv()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn is_host(&self) -> bool {
        self.inner.is_host()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.inner.close()
    }

    fn id(&self) -> ConnectionId {
        self.inner.id()
    }
}

#[test]
fn test_cancel_queued_behind_failed_send_is_not_connection_lost() {
    let (host_link, mut raw) = MemoryConnection::pair(LinkConfig::default());
    raw_send(&mut raw, SetupMessage::ReadyForSetup);
    let link = HangsUpOnEcho {
        inner: host_link,
        peer: Some(raw),
    };
    let clock = ManualClock::new();
    let mut host = Session::open(
        link,
        catalog(),
        clock.clone(),
        SessionConfig::default(),
        host_initial(),
    )
    .unwrap();
    let events = Recorder::default();
    host.add_observer(Box::new(events.clone()));

    // Arrival starts the echo exchange; the first frame hits the closed link.
    clock.advance(1);
    let outcome = host.poll().unwrap();

    assert_eq!(
        outcome,
        Some(SessionOutcome::Cancelled(CancelReason::PeerCancelled))
    );
    assert_eq!(events.events().cancelled, vec![CancelReason::PeerCancelled]);
    assert_eq!(events.events().lost, 0);
}

// =========================================================================
// Raw wire checks
// =========================================================================

#[test]
fn test_host_arrival_messages_on_the_wire() {
    let (_host, mut raw, _events, _clock) = host_with_raw_client();
    let messages = raw_drain(&mut raw);

    assert_eq!(messages[0], SetupMessage::ReadyForSetup);
    assert!(matches!(messages[1], SetupMessage::AdmiralNumber { .. }));
    let settings: Vec<Setting> = messages
        .iter()
        .filter_map(|m| match m {
            SetupMessage::SettingChanged { setting } => Some(*setting),
            _ => None,
        })
        .collect();
    assert_eq!(settings.len(), 8);
    assert!(messages
        .iter()
        .any(|m| matches!(m, SetupMessage::PlayerStats(_))));
    assert_eq!(echoes(&messages).len(), 1);
    assert_eq!(echoes(&messages)[0].kind, EchoKind::Dummy);
}
