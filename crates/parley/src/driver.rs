//! `SetupDriver`: runs a setup session inside a Tokio task.
//!
//! The session is a synchronous state machine that must be polled at a
//! steady rate. The driver owns that loop:
//!
//! ```text
//!   SetupHandle ──(commands)──┐
//!                             ▼
//!   TickScheduler ──tick──→ apply commands → Session::poll() ──→ outcome?
//! ```
//!
//! The UI keeps a [`SetupHandle`] and sends player actions through it; the
//! driver applies them between polls, so every mutation of session state
//! still happens on the one task running the loop.

use parley_protocol::{ColorIndex, ScenarioFileInfo, Setting};
use parley_session::{
    InitialSettings, Portrait, ScenarioCatalog, Session, SessionConfig, SessionError,
    SessionOutcome, SetupObserver,
};
use parley_tick::{Clock, PollMetrics, TickConfig, TickScheduler};
use parley_transport::Connection;
use tokio::sync::mpsc;

use crate::ParleyError;

/// A player action forwarded to the running session.
#[derive(Debug, Clone)]
pub enum SetupCommand {
    SetSetting(Setting),
    TypeKey(u8),
    SetPortrait(Portrait),
    SetOpponentColor(ColorIndex),
    OpenScenario(ScenarioFileInfo),
    Ready,
    Cancel,
    Leave,
}

/// Cloneable sender for [`SetupCommand`]s.
#[derive(Debug, Clone)]
pub struct SetupHandle {
    commands: mpsc::UnboundedSender<SetupCommand>,
}

impl SetupHandle {
    /// Queues a command for the next poll.
    ///
    /// # Errors
    /// [`ParleyError::DriverStopped`] once the driver has been dropped.
    pub fn send(&self, command: SetupCommand) -> Result<(), ParleyError> {
        self.commands
            .send(command)
            .map_err(|_| ParleyError::DriverStopped)
    }

    pub fn set_setting(&self, setting: Setting) -> Result<(), ParleyError> {
        self.send(SetupCommand::SetSetting(setting))
    }

    /// Queues every byte of `text` as a keystroke.
    pub fn type_text(&self, text: &[u8]) -> Result<(), ParleyError> {
        text.iter()
            .try_for_each(|&key| self.send(SetupCommand::TypeKey(key)))
    }

    pub fn ready(&self) -> Result<(), ParleyError> {
        self.send(SetupCommand::Ready)
    }

    pub fn cancel(&self) -> Result<(), ParleyError> {
        self.send(SetupCommand::Cancel)
    }
}

/// Builder for a [`SetupDriver`].
///
/// # Example
///
/// ```rust,ignore
/// let driver = SetupDriver::builder()
///     .tick_config(TickConfig::with_rate(30))
///     .observer(MyLobbyScreen::new())
///     .build();
/// let handle = driver.handle();
/// let session = driver.run(conn, catalog, SystemClock::new(), initial).await?;
/// ```
pub struct SetupDriverBuilder {
    session_config: SessionConfig,
    tick_config: TickConfig,
    observers: Vec<Box<dyn SetupObserver>>,
}

impl SetupDriverBuilder {
    pub fn new() -> Self {
        Self {
            session_config: SessionConfig::default(),
            tick_config: TickConfig::default(),
            observers: Vec::new(),
        }
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets how often the session is polled.
    pub fn tick_config(mut self, config: TickConfig) -> Self {
        self.tick_config = config;
        self
    }

    /// Adds an observer to the session the driver will open.
    pub fn observer(mut self, observer: impl SetupObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn build(self) -> SetupDriver {
        let (tx, rx) = mpsc::unbounded_channel();
        SetupDriver {
            session_config: self.session_config,
            tick_config: self.tick_config.validated(),
            observers: self.observers,
            metrics: PollMetrics::default(),
            tx,
            rx,
        }
    }
}

impl Default for SetupDriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Opens a setup session and polls it until it ends.
pub struct SetupDriver {
    session_config: SessionConfig,
    tick_config: TickConfig,
    observers: Vec<Box<dyn SetupObserver>>,
    metrics: PollMetrics,
    tx: mpsc::UnboundedSender<SetupCommand>,
    rx: mpsc::UnboundedReceiver<SetupCommand>,
}

impl SetupDriver {
    pub fn builder() -> SetupDriverBuilder {
        SetupDriverBuilder::new()
    }

    /// A handle for sending player actions to this driver.
    pub fn handle(&self) -> SetupHandle {
        SetupHandle {
            commands: self.tx.clone(),
        }
    }

    /// Pacing counters of the last [`SetupDriver::drive`] run.
    pub fn poll_metrics(&self) -> PollMetrics {
        self.metrics
    }

    /// Opens a session over `conn` and drives it to its outcome.
    ///
    /// Returns the finished session: read [`Session::outcome`] for the
    /// result and, on success, take the link with
    /// [`Session::into_connection`].
    ///
    /// # Errors
    /// Fails if the session cannot be opened or a command fails for a
    /// reason other than the link going away.
    pub async fn run<C, S>(
        mut self,
        conn: C,
        catalog: S,
        clock: impl Clock + 'static,
        initial: InitialSettings,
    ) -> Result<Session<C, S>, ParleyError>
    where
        C: Connection,
        S: ScenarioCatalog,
    {
        let mut session = Session::open(
            conn,
            catalog,
            clock,
            self.session_config.clone(),
            initial,
        )?;
        for observer in std::mem::take(&mut self.observers) {
            session.add_observer(observer);
        }

        let outcome = self.drive(&mut session).await?;
        tracing::info!(role = %session.role(), ?outcome, "setup driver finished");
        Ok(session)
    }

    /// Polls an already open session until it reports an outcome.
    pub async fn drive<C, S>(
        &mut self,
        session: &mut Session<C, S>,
    ) -> Result<SessionOutcome, ParleyError>
    where
        C: Connection,
        S: ScenarioCatalog,
    {
        let mut pacer = TickScheduler::new(self.tick_config.clone());
        loop {
            let due = pacer.wait_for_tick().await;
            if due.late {
                tracing::debug!(poll = due.poll, skipped = due.skipped, "setup poll ran late");
            }

            while let Ok(command) = self.rx.try_recv() {
                apply(session, command)?;
            }
            if let Some(outcome) = session.poll()? {
                let metrics = pacer.metrics();
                self.metrics = metrics;
                tracing::debug!(
                    polls = metrics.polls,
                    late = metrics.late_wakeups,
                    skipped = metrics.skipped,
                    slow = metrics.slow_polls,
                    "setup poll loop finished"
                );
                return Ok(outcome);
            }

            pacer.record_poll_end();
        }
    }
}

/// Applies one command. A failure caused by the link going away is left
/// for the next poll to report as `ConnectionLost`.
fn apply<C, S>(session: &mut Session<C, S>, command: SetupCommand) -> Result<(), ParleyError>
where
    C: Connection,
    S: ScenarioCatalog,
{
    tracing::trace!(?command, "applying command");
    let result = match command {
        SetupCommand::SetSetting(setting) => session.set_setting(setting).map(|applied| {
            if !applied {
                tracing::debug!(?setting, "setting change refused");
            }
        }),
        SetupCommand::TypeKey(key) => session.type_key(key),
        SetupCommand::SetPortrait(portrait) => session.set_local_portrait(portrait),
        SetupCommand::SetOpponentColor(color) => session.set_opponent_color(color),
        SetupCommand::OpenScenario(info) => session.open_scenario_file(info).map(|_| ()),
        SetupCommand::Ready => session.declare_ready().map(|accepted| {
            if !accepted {
                tracing::debug!("ready refused");
            }
        }),
        SetupCommand::Cancel => session.cancel(),
        SetupCommand::Leave => session.leave(),
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => {
            tracing::debug!(error = %e, "command hit a closed link");
            Ok(())
        }
        // A cancel racing the final StartMatch; the poll reports the outcome.
        Err(SessionError::Ended) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
