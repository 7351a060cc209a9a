//! The setup session: one object per pre-match screen.
//!
//! [`Session`] owns every piece of protocol state for one negotiation and is
//! driven by calling [`Session::poll`] once per tick. Each poll:
//!
//! 1. drains the transport and dispatches every message by kind,
//! 2. moves received chat into the opponent's visible line,
//! 3. resends the outstanding echo frame if it has waited too long, or
//!    begins the next sample if it is this side's turn.
//!
//! Nothing blocks and nothing runs in the background. Local UI actions
//! (`set_setting`, `type_key`, `declare_ready`, ...) are plain method calls
//! made between polls.
//!
//! # Lifecycle
//!
//! ```text
//!  open() ──→ poll() … poll() ──→ Some(SessionOutcome)
//!                                   ├── Success(settings)  link stays open
//!                                   ├── Cancelled(reason)  link closed
//!                                   └── ConnectionLost     link closed
//! ```
//!
//! Once an outcome is reached `poll` keeps returning it and every local
//! edit fails with [`SessionError::Ended`].

use parley_protocol::{
    Codec, ColorIndex, EchoFrame, Envelope, JsonCodec, PlayerStats, Role, ScenarioFileInfo,
    ScenarioVerdict, Setting, SettingId, SetupMessage,
};
use parley_tick::Clock;
use parley_transport::Connection;

use crate::chat::ChatLine;
use crate::lag::LagSampler;
use crate::mux::{Side, StreamEvent, StreamMultiplexer};
use crate::observer::{notify, SetupObserver};
use crate::portrait::Portrait;
use crate::readiness::{CancelReason, ReadinessCoordinator, ReadinessState};
use crate::scenario::{compare_scenario, ScenarioCatalog};
use crate::sequence::{EchoOutcome, SequenceEngine};
use crate::settings::{EditRights, InitialSettings, NegotiatedSettings, Origin, SettingsReplicator};
use crate::{SessionConfig, SessionError};

/// How a setup session ended. The only value that leaves the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Both players are ready; these are the settings to start the match
    /// with.
    Success(NegotiatedSettings),
    Cancelled(CancelReason),
    /// The transport reported the peer gone.
    ConnectionLost,
}

/// One pre-match negotiation with a single peer.
///
/// Generic over the transport `C`, the scenario collaborator `S`, and the
/// wire codec `K` (JSON unless chosen otherwise).
pub struct Session<C, S, K = JsonCodec> {
    role: Role,
    conn: C,
    catalog: S,
    codec: K,
    clock: Box<dyn Clock>,
    config: SessionConfig,
    initial: InitialSettings,

    sequence: SequenceEngine,
    lag: LagSampler,
    settings: SettingsReplicator,
    streams: StreamMultiplexer,
    readiness: ReadinessCoordinator,
    observers: Vec<Box<dyn SetupObserver>>,

    scenario_loaded: bool,
    /// External scenario this side opened and is waiting on a verdict for.
    pending_scenario: Option<ScenarioFileInfo>,
    opponent_stats: Option<PlayerStats>,
    desyncs: u32,
    connection_troubled: bool,
    next_seq: u64,
    outcome: Option<SessionOutcome>,
}

impl<C: Connection, S: ScenarioCatalog> Session<C, S> {
    /// Opens a session over `conn` using the JSON wire format.
    ///
    /// The role is taken from the connection: the side that accepted the
    /// link hosts. `ReadyForSetup` is sent immediately.
    ///
    /// # Errors
    /// Fails if the announcement cannot be sent.
    pub fn open(
        conn: C,
        catalog: S,
        clock: impl Clock + 'static,
        config: SessionConfig,
        initial: InitialSettings,
    ) -> Result<Self, SessionError> {
        Self::with_codec(conn, catalog, clock, config, initial, JsonCodec)
    }
}

impl<C: Connection, S: ScenarioCatalog, K: Codec> Session<C, S, K> {
    /// Like [`Session::open`], with an explicit codec.
    pub fn with_codec(
        conn: C,
        catalog: S,
        clock: impl Clock + 'static,
        config: SessionConfig,
        initial: InitialSettings,
        codec: K,
    ) -> Result<Self, SessionError> {
        let config = config.validated();
        let role = if conn.is_host() { Role::Host } else { Role::Client };
        let settings = SettingsReplicator::new(role, &initial, &catalog);

        let mut session = Self {
            role,
            catalog,
            codec,
            clock: Box::new(clock),
            sequence: SequenceEngine::new(role, config.resend),
            lag: LagSampler::new(),
            settings,
            streams: StreamMultiplexer::new(config.stream_capacity, config.visible_chat_limit),
            readiness: ReadinessCoordinator::new(config.pulse_interval_ticks),
            observers: Vec::new(),
            scenario_loaded: true,
            pending_scenario: None,
            opponent_stats: None,
            desyncs: 0,
            connection_troubled: false,
            next_seq: 0,
            outcome: None,
            config,
            initial,
            conn,
        };

        tracing::info!(
            role = %role,
            conn = %session.conn.id(),
            level = %session.settings.current().level,
            "setup session opened"
        );
        session.send(SetupMessage::ReadyForSetup)?;
        Ok(session)
    }

    /// Subscribes an observer. Observers are called in subscription order.
    pub fn add_observer(&mut self, observer: Box<dyn SetupObserver>) {
        self.observers.push(observer);
    }

    // -----------------------------------------------------------------
    // Poll loop
    // -----------------------------------------------------------------

    /// Runs one iteration of the protocol. Returns the outcome once the
    /// session has ended, `None` while it is still running.
    ///
    /// A lost transport is not an error here: it becomes
    /// [`SessionOutcome::ConnectionLost`].
    ///
    /// # Errors
    /// Only caller-side failures such as an unencodable message.
    pub fn poll(&mut self) -> Result<Option<SessionOutcome>, SessionError> {
        if self.outcome.is_some() {
            return Ok(self.outcome);
        }

        let now = self.clock.now_ticks();
        match self.step(now) {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                tracing::warn!(role = %self.role, error = %e, "link to peer lost");
                self.drain_after_loss(now);
                let outcome = match (self.readiness.state(), self.readiness.cancel_reason()) {
                    (ReadinessState::Cancelled, Some(reason)) => SessionOutcome::Cancelled(reason),
                    _ => SessionOutcome::ConnectionLost,
                };
                self.conclude(outcome);
                return Ok(self.outcome);
            }
            Err(e) => return Err(e),
        }

        match self.readiness.state() {
            ReadinessState::BothReady => {
                let settings = *self.settings.current();
                self.conclude(SessionOutcome::Success(settings));
            }
            ReadinessState::Cancelled => {
                let reason = self.readiness.cancel_reason().unwrap_or(CancelReason::Local);
                self.conclude(SessionOutcome::Cancelled(reason));
            }
            _ => {}
        }
        Ok(self.outcome)
    }

    fn step(&mut self, now: u64) -> Result<(), SessionError> {
        // Stop reading once terminal: anything after a Cancel or the final
        // StartMatch belongs to whatever runs next on this link.
        while !self.readiness.state().is_terminal() {
            let Some(datagram) = self.conn.try_recv()? else {
                break;
            };
            self.handle_datagram(&datagram, now)?;
        }

        if self.streams.drain_incoming_chat() {
            let text = self.streams.chat_line(Side::Opponent).text();
            notify(&mut self.observers, |o| o.on_chat_changed(Side::Opponent, &text));
        }

        if self.readiness.state().is_terminal() {
            return Ok(());
        }
        self.pump_echo(now)
    }

    /// A peer that backs out sends `Cancel` or `PeerLeft` and hangs up at
    /// once. When a send fails first, that message may still be queued.
    fn drain_after_loss(&mut self, now: u64) {
        while !self.readiness.state().is_terminal() {
            let Ok(Some(datagram)) = self.conn.try_recv() else {
                break;
            };
            if let Err(e) = self.handle_datagram(&datagram, now) {
                tracing::debug!(role = %self.role, error = %e, "reply to final message failed");
            }
        }
    }

    fn pump_echo(&mut self, now: u64) -> Result<(), SessionError> {
        let registered = self.settings.current().registered;

        if let Some(resend) = self.sequence.on_tick(now, registered) {
            return self.send_echo(resend.frame, registered.resend_reliable());
        }

        if self.sequence.may_begin() {
            let (kind, data) = self.streams.next_payload();
            let frame = self.sequence.begin_sample(kind, data, now)?;
            self.send_echo(frame, registered.first_send_reliable())?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Inbound dispatch
    // -----------------------------------------------------------------

    fn handle_datagram(&mut self, datagram: &[u8], now: u64) -> Result<(), SessionError> {
        let envelope: Envelope = match self.codec.decode(datagram) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(role = %self.role, error = %e, "undecodable message dropped");
                self.note_desync();
                return Ok(());
            }
        };
        tracing::trace!(
            role = %self.role,
            seq = envelope.seq,
            kind = envelope.message.kind(),
            "message received"
        );

        match envelope.message {
            SetupMessage::ReadyForSetup => self.on_peer_ready_for_setup()?,
            SetupMessage::AdmiralNumber { slot } => {
                tracing::debug!(role = %self.role, host_slot = %slot, "admiral number received");
                self.settings.apply_admiral_number(slot, &self.catalog);
            }
            SetupMessage::SettingChanged { setting } => self.on_remote_setting(setting)?,
            SetupMessage::PlayerStats(stats) => {
                self.opponent_stats = Some(stats);
                notify(&mut self.observers, |o| o.on_player_stats(stats));
            }
            SetupMessage::StartMatch => {
                if self.readiness.peer_ready() {
                    tracing::info!(role = %self.role, "opponent is ready");
                    self.notify_readiness();
                }
            }
            SetupMessage::Cancel => self.on_peer_gone(CancelReason::PeerCancelled),
            SetupMessage::PeerLeft => self.on_peer_gone(CancelReason::PeerLeft),
            SetupMessage::Echo(frame) => self.on_echo(frame, now),
            SetupMessage::OpenScenario(info) => self.on_open_scenario(info)?,
            SetupMessage::ScenarioReply { verdict } => self.on_scenario_reply(verdict)?,
        }
        Ok(())
    }

    fn on_peer_ready_for_setup(&mut self) -> Result<(), SessionError> {
        if !self.readiness.peer_arrived() {
            tracing::debug!(role = %self.role, "repeated ReadyForSetup ignored");
            return Ok(());
        }
        tracing::info!(role = %self.role, "peer arrived");
        self.notify_readiness();
        notify(&mut self.observers, |o| o.on_peer_arrived());

        if self.role.is_host() {
            let slot = self.settings.current().my_slot;
            self.send(SetupMessage::AdmiralNumber { slot })?;
        }
        for setting in self.settings.arrival_snapshot() {
            self.send(SetupMessage::SettingChanged { setting })?;
        }
        let stats = self.initial.stats;
        self.send(SetupMessage::PlayerStats(stats))?;

        if self.role.is_host() {
            self.sequence.start();
        }
        Ok(())
    }

    fn on_remote_setting(&mut self, setting: Setting) -> Result<(), SessionError> {
        let im_ready = self.readiness.im_ready();
        let replies = self.settings.apply_remote(setting, im_ready, &self.catalog);
        tracing::debug!(role = %self.role, ?setting, "remote setting applied");
        notify(&mut self.observers, |o| o.on_setting_changed(setting, Origin::Remote));

        for reply in replies {
            self.send(SetupMessage::SettingChanged { setting: reply })?;
        }
        Ok(())
    }

    fn on_peer_gone(&mut self, reason: CancelReason) {
        if self.readiness.cancel(reason) {
            tracing::info!(role = %self.role, ?reason, "peer ended setup");
            self.notify_readiness();
        }
    }

    fn on_echo(&mut self, frame: EchoFrame, now: u64) {
        match self.sequence.on_echo(frame.sample, now) {
            EchoOutcome::Completed { sample, round_trip } => {
                if let Some(ticks) = round_trip {
                    self.lag.record(sample, ticks);
                    let snapshot = self.lag.snapshot(sample);
                    notify(&mut self.observers, |o| o.on_lag_sample_recorded(&snapshot));
                }
                for event in self.streams.accept(&frame) {
                    match event {
                        StreamEvent::PortraitRun { run, at } => {
                            notify(&mut self.observers, |o| o.on_portrait_run_received(run, at));
                        }
                        StreamEvent::Desync(e) => {
                            tracing::warn!(role = %self.role, error = %e, "portrait run dropped");
                            self.note_desync();
                        }
                    }
                }
            }
            EchoOutcome::Stale { sample, expected } => {
                tracing::trace!(role = %self.role, %sample, %expected, "stale echo ignored");
            }
            EchoOutcome::Ahead { sample, expected } => {
                tracing::warn!(role = %self.role, %sample, %expected, "echo ahead of sequence");
                self.note_desync();
            }
        }
    }

    fn on_open_scenario(&mut self, info: ScenarioFileInfo) -> Result<(), SessionError> {
        let local = self.catalog.find_external(&info.file_name);
        let verdict = compare_scenario(local.as_ref(), &info);
        self.scenario_loaded = verdict.is_accepted();
        if self.scenario_loaded {
            self.catalog.activate_external(&info);
        }
        tracing::debug!(role = %self.role, file = %info.file_name, ?verdict, "peer opened scenario");

        self.send(SetupMessage::ScenarioReply { verdict })?;
        notify(&mut self.observers, |o| o.on_scenario_verdict(verdict, &info));
        Ok(())
    }

    fn on_scenario_reply(&mut self, verdict: ScenarioVerdict) -> Result<(), SessionError> {
        let Some(info) = self.pending_scenario.take() else {
            tracing::debug!(role = %self.role, ?verdict, "unsolicited scenario reply ignored");
            return Ok(());
        };
        tracing::debug!(role = %self.role, file = %info.file_name, ?verdict, "scenario verdict");
        notify(&mut self.observers, |o| o.on_scenario_verdict(verdict, &info));

        if verdict.is_accepted() {
            self.scenario_loaded = true;
            let level = self.catalog.first_networkable();
            self.edit(Setting::Level(level))?;
        }
        Ok(())
    }

    fn note_desync(&mut self) {
        self.desyncs += 1;
        if !self.connection_troubled && self.desyncs >= self.config.desync_alert_threshold {
            self.connection_troubled = true;
            let desyncs = self.desyncs;
            tracing::warn!(role = %self.role, desyncs, "connection problem");
            notify(&mut self.observers, |o| o.on_connection_problem(desyncs));
        }
    }

    // -----------------------------------------------------------------
    // Local actions
    // -----------------------------------------------------------------

    /// Changes a replicated setting from the local UI. Returns false when
    /// the local player may not edit it right now, or the value is illegal.
    ///
    /// # Errors
    /// [`SessionError::Ended`] after the outcome, or a send failure.
    pub fn set_setting(&mut self, setting: Setting) -> Result<bool, SessionError> {
        self.ensure_open()?;
        self.edit(setting)
    }

    fn edit(&mut self, setting: Setting) -> Result<bool, SessionError> {
        let rights = self.edit_rights();
        let sent = self.settings.set_local(setting, rights, &self.catalog);
        for &setting in &sent {
            tracing::debug!(role = %self.role, ?setting, "local setting changed");
            self.send(SetupMessage::SettingChanged { setting })?;
            notify(&mut self.observers, |o| o.on_setting_changed(setting, Origin::Local));
        }
        Ok(!sent.is_empty())
    }

    /// Feeds one chat keystroke. It shows up in the local line at once and
    /// reaches the peer with the next echo frames.
    pub fn type_key(&mut self, key: u8) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.streams.type_key(key);
        let text = self.streams.chat_line(Side::Mine).text();
        notify(&mut self.observers, |o| o.on_chat_changed(Side::Mine, &text));
        Ok(())
    }

    /// Starts streaming the local player's portrait to the peer.
    pub fn set_local_portrait(&mut self, portrait: Portrait) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.streams.set_local_portrait(portrait);
        Ok(())
    }

    /// Picks the colour the opponent is drawn in. Never sent to the peer.
    pub fn set_opponent_color(&mut self, color: ColorIndex) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.settings.set_opponent_color(color);
        Ok(())
    }

    /// Opens an external scenario file and asks the peer to load the same
    /// one. Readiness is blocked until the peer accepts it. Returns false
    /// without sending anything if the local player may not change the
    /// level.
    pub fn open_scenario_file(&mut self, info: ScenarioFileInfo) -> Result<bool, SessionError> {
        self.ensure_open()?;
        // A rejected file leaves the scenario unloaded; that must not stop
        // the player from trying another one.
        let rights = EditRights {
            scenario_loaded: true,
            ..self.edit_rights()
        };
        if !rights.may_edit(SettingId::Level) {
            tracing::debug!(role = %self.role, "may not open a scenario now");
            return Ok(false);
        }

        tracing::info!(role = %self.role, file = %info.file_name, version = info.version, "opening scenario");
        self.catalog.activate_external(&info);
        self.scenario_loaded = false;
        self.pending_scenario = Some(info.clone());
        self.send(SetupMessage::OpenScenario(info))?;
        Ok(true)
    }

    /// The local player pressed OK. Returns false if readiness is not
    /// possible yet (peer absent, scenario not loaded, already ready).
    pub fn declare_ready(&mut self) -> Result<bool, SessionError> {
        self.ensure_open()?;
        if !self.scenario_loaded {
            tracing::debug!(role = %self.role, "scenario not loaded, cannot be ready");
            return Ok(false);
        }
        if !self.readiness.declare_ready() {
            return Ok(false);
        }

        tracing::info!(role = %self.role, "ready");
        self.send(SetupMessage::StartMatch)?;
        self.notify_readiness();
        Ok(true)
    }

    /// The local player backed out. Tells the peer (best effort) and ends
    /// the session immediately.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        self.abort(SetupMessage::Cancel)
    }

    /// The local application is shutting down. Like [`Session::cancel`]
    /// but tells the peer the player is gone rather than merely declining.
    pub fn leave(&mut self) -> Result<(), SessionError> {
        self.abort(SetupMessage::PeerLeft)
    }

    fn abort(&mut self, message: SetupMessage) -> Result<(), SessionError> {
        self.ensure_open()?;
        if !self.readiness.cancel(CancelReason::Local) {
            // Both players were already ready; the next poll reports success.
            return Err(SessionError::Ended);
        }
        if let Err(e) = self.send(message) {
            tracing::debug!(role = %self.role, error = %e, "could not notify peer of cancel");
        }
        self.notify_readiness();
        self.conclude(SessionOutcome::Cancelled(CancelReason::Local));
        Ok(())
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn settings(&self) -> &NegotiatedSettings {
        self.settings.current()
    }

    pub fn readiness(&self) -> ReadinessState {
        self.readiness.state()
    }

    /// Whether the local UI should offer the control for `id`.
    pub fn can_edit(&self, id: SettingId) -> bool {
        self.outcome.is_none() && self.edit_rights().may_edit(id)
    }

    pub fn lag(&self) -> &LagSampler {
        &self.lag
    }

    pub fn sequence(&self) -> &SequenceEngine {
        &self.sequence
    }

    /// Flash phase of the "opponent is waiting for you" hint.
    pub fn pulse(&self) -> bool {
        self.readiness.pulse(self.clock.now_ticks())
    }

    pub fn chat_line(&self, side: Side) -> &ChatLine {
        self.streams.chat_line(side)
    }

    pub fn remote_portrait(&self) -> &Portrait {
        self.streams.remote_portrait()
    }

    pub fn remote_portrait_complete(&self) -> bool {
        self.streams.remote_portrait_complete()
    }

    pub fn local_portrait_sent(&self) -> bool {
        self.streams.local_portrait_sent()
    }

    pub fn opponent_stats(&self) -> Option<PlayerStats> {
        self.opponent_stats
    }

    pub fn scenario_loaded(&self) -> bool {
        self.scenario_loaded
    }

    pub fn desync_count(&self) -> u32 {
        self.desyncs
    }

    /// Sticky once the desync threshold has been reached.
    pub fn connection_troubled(&self) -> bool {
        self.connection_troubled
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    pub fn catalog(&self) -> &S {
        &self.catalog
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Hands the link over to whatever runs the match.
    pub fn into_connection(self) -> C {
        self.conn
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn ensure_open(&self) -> Result<(), SessionError> {
        match self.outcome {
            Some(_) => Err(SessionError::Ended),
            None => Ok(()),
        }
    }

    fn edit_rights(&self) -> EditRights {
        EditRights {
            role: self.role,
            client_can_edit: self.settings.current().client_can_edit,
            im_ready: self.readiness.im_ready(),
            peer_arrived: self.readiness.is_peer_arrived(),
            scenario_loaded: self.scenario_loaded,
        }
    }

    fn envelope(&mut self, message: SetupMessage) -> Result<Vec<u8>, SessionError> {
        let envelope = Envelope {
            seq: self.next_seq,
            timestamp: self.clock.now_ticks(),
            message,
        };
        self.next_seq += 1;
        Ok(self.codec.encode(&envelope)?)
    }

    /// Control messages always use the reliable channel.
    fn send(&mut self, message: SetupMessage) -> Result<(), SessionError> {
        let datagram = self.envelope(message)?;
        self.conn.send(&datagram)?;
        Ok(())
    }

    fn send_echo(&mut self, frame: EchoFrame, reliable: bool) -> Result<(), SessionError> {
        let datagram = self.envelope(SetupMessage::Echo(frame))?;
        if reliable {
            self.conn.send(&datagram)?;
        } else {
            self.conn.send_unreliable(&datagram)?;
        }
        Ok(())
    }

    fn notify_readiness(&mut self) {
        let state = self.readiness.state();
        notify(&mut self.observers, |o| o.on_readiness_changed(state));
    }

    fn conclude(&mut self, outcome: SessionOutcome) {
        self.sequence.abandon();
        self.outcome = Some(outcome);

        match outcome {
            SessionOutcome::Success(settings) => {
                tracing::info!(
                    role = %self.role,
                    level = %settings.level,
                    latency = settings.latency.ticks(),
                    registered = ?settings.registered,
                    "setup complete"
                );
                notify(&mut self.observers, |o| {
                    o.on_settings_converged(&settings);
                    o.on_ready();
                });
            }
            SessionOutcome::Cancelled(reason) => {
                tracing::info!(role = %self.role, ?reason, "setup cancelled");
                self.unwind();
                notify(&mut self.observers, |o| o.on_cancelled(reason));
            }
            SessionOutcome::ConnectionLost => {
                tracing::info!(role = %self.role, "setup ended, connection lost");
                self.unwind();
                notify(&mut self.observers, |o| o.on_connection_lost());
            }
        }
    }

    /// Both sides forget any external scenario opened during setup; the
    /// host also goes back to the settings it started with. Then the link
    /// is closed.
    fn unwind(&mut self) {
        self.catalog.reset_external();
        if self.role.is_host() {
            self.settings.restore(&self.initial, &self.catalog);
        }
        if let Err(e) = self.conn.close() {
            tracing::debug!(role = %self.role, error = %e, "closing link failed");
        }
    }
}

impl<C: Connection, S, K> std::fmt::Debug for Session<C, S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("conn", &self.conn.id())
            .field("readiness", &self.readiness.state())
            .field("settings", self.settings.current())
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}
