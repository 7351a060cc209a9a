//! Observation hooks for the setup screen.
//!
//! A UI (or a test) subscribes a [`SetupObserver`] to the session and
//! overrides only the callbacks it cares about. Every callback runs on the
//! thread that calls `Session::poll` or the local edit methods.

use parley_protocol::{PlayerStats, ScenarioFileInfo, ScenarioVerdict, Setting};

use crate::lag::LagSnapshot;
use crate::mux::Side;
use crate::portrait::{PortraitRun, RunCursor};
use crate::readiness::{CancelReason, ReadinessState};
use crate::settings::{NegotiatedSettings, Origin};

/// Callbacks fired as the session progresses. All default to no-ops.
#[allow(unused_variables)]
pub trait SetupObserver: Send {
    fn on_peer_arrived(&mut self) {}

    fn on_lag_sample_recorded(&mut self, snapshot: &LagSnapshot) {}

    /// `setting` is the value as sent (local) or as received (remote).
    fn on_setting_changed(&mut self, setting: Setting, origin: Origin) {}

    fn on_chat_changed(&mut self, side: Side, text: &str) {}

    fn on_portrait_run_received(&mut self, run: PortraitRun, at: RunCursor) {}

    fn on_player_stats(&mut self, stats: PlayerStats) {}

    fn on_scenario_verdict(&mut self, verdict: ScenarioVerdict, info: &ScenarioFileInfo) {}

    fn on_readiness_changed(&mut self, state: ReadinessState) {}

    /// Raised once, when the desync count reaches the configured threshold.
    fn on_connection_problem(&mut self, desyncs: u32) {}

    /// The final settings, fired just before `on_ready`.
    fn on_settings_converged(&mut self, settings: &NegotiatedSettings) {}

    fn on_ready(&mut self) {}

    fn on_cancelled(&mut self, reason: CancelReason) {}

    fn on_connection_lost(&mut self) {}
}

pub(crate) fn notify(observers: &mut [Box<dyn SetupObserver>], mut f: impl FnMut(&mut dyn SetupObserver)) {
    for observer in observers.iter_mut() {
        f(observer.as_mut());
    }
}
