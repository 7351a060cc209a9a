//! Settings replication.
//!
//! Every setting is replicated as "sender's latest value wins": a local
//! change is applied and broadcast once, a remote change is applied after
//! it has been made legal for the active scenario. Applying the same
//! [`Setting`] twice leaves the state unchanged, so a duplicate delivery is
//! harmless.
//!
//! The replicator only decides values. Sending is the session's job: every
//! mutating call returns the settings that must go out.

use std::collections::HashMap;

use parley_protocol::{
    ChapterId, ColorIndex, Latency, PlayerSlot, PlayerStats, RaceId, RegisteredMode, ResendDelay,
    Role, Setting, SettingId,
};
use serde::{Deserialize, Serialize};

use crate::ScenarioCatalog;

// ---------------------------------------------------------------------------
// Setting values
// ---------------------------------------------------------------------------

/// What each player brings to the setup screen: the settings last used and
/// the local player's career numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialSettings {
    pub level: ChapterId,
    pub race: RaceId,
    pub opponent_color: ColorIndex,
    pub latency: Latency,
    pub registered: RegisteredMode,
    pub resend_delay: ResendDelay,
    pub lower_bandwidth: bool,
    pub client_can_edit: bool,
    pub host_is_player2: bool,
    pub stats: PlayerStats,
}

impl Default for InitialSettings {
    fn default() -> Self {
        Self {
            level: ChapterId(-1),
            race: RaceId(0),
            opponent_color: ColorIndex::NONE,
            latency: Latency::default(),
            registered: RegisteredMode::default(),
            resend_delay: ResendDelay::default(),
            lower_bandwidth: false,
            client_can_edit: false,
            host_is_player2: false,
            stats: PlayerStats::default(),
        }
    }
}

/// The settings both players leave setup with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiatedSettings {
    pub level: ChapterId,
    pub my_race: RaceId,
    pub opponent_race: RaceId,
    /// Local only, never replicated.
    pub opponent_color: ColorIndex,
    pub latency: Latency,
    pub registered: RegisteredMode,
    pub resend_delay: ResendDelay,
    pub lower_bandwidth: bool,
    pub client_can_edit: bool,
    pub host_is_player2: bool,
    pub my_slot: PlayerSlot,
    pub opponent_slot: PlayerSlot,
}

/// Where a setting change came from, for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

// ---------------------------------------------------------------------------
// Edit rights
// ---------------------------------------------------------------------------

/// Inputs to the "may the local player touch this control?" decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditRights {
    pub role: Role,
    pub client_can_edit: bool,
    pub im_ready: bool,
    pub peer_arrived: bool,
    pub scenario_loaded: bool,
}

impl EditRights {
    /// - Nothing is editable once the local player is ready.
    /// - A player may always pick their own race.
    /// - Host-only toggles need the host and an arrived peer.
    /// - Everything else needs the host (or a client granted edit rights),
    ///   an arrived peer, and a loaded scenario.
    pub fn may_edit(&self, id: SettingId) -> bool {
        if self.im_ready {
            return false;
        }
        match id {
            SettingId::Race => true,
            id if id.is_host_only() => self.role.is_host() && self.peer_arrived,
            _ => {
                (self.role.is_host() || self.client_can_edit)
                    && self.peer_arrived
                    && self.scenario_loaded
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SettingsReplicator
// ---------------------------------------------------------------------------

/// Local view of the replicated settings, plus the last value broadcast for
/// each one.
#[derive(Debug, Clone)]
pub struct SettingsReplicator {
    role: Role,
    current: NegotiatedSettings,
    last_broadcast: HashMap<SettingId, Setting>,
}

impl SettingsReplicator {
    /// Builds the starting state from the player's saved settings. Illegal
    /// saved values are replaced with the catalog's defaults.
    pub fn new(role: Role, initial: &InitialSettings, catalog: &impl ScenarioCatalog) -> Self {
        let host_is_player2 = initial.host_is_player2;
        let (my_slot, opponent_slot) = slots(role, host_is_player2);
        let level = if catalog.is_networkable(initial.level) {
            initial.level
        } else {
            catalog.first_networkable()
        };

        let mut replicator = Self {
            role,
            current: NegotiatedSettings {
                level,
                my_race: initial.race,
                opponent_race: catalog.default_race(level, opponent_slot),
                opponent_color: initial.opponent_color,
                latency: Latency::new(initial.latency.ticks()),
                registered: initial.registered,
                resend_delay: initial.resend_delay,
                lower_bandwidth: initial.lower_bandwidth,
                client_can_edit: initial.client_can_edit,
                host_is_player2,
                my_slot,
                opponent_slot,
            },
            last_broadcast: HashMap::new(),
        };
        replicator.revalidate_races(catalog);
        replicator
    }

    pub fn current(&self) -> &NegotiatedSettings {
        &self.current
    }

    /// The value this side last sent for `id`, if any.
    pub fn last_broadcast(&self, id: SettingId) -> Option<Setting> {
        self.last_broadcast.get(&id).copied()
    }

    /// Applies a local edit. Returns the settings to broadcast, which is
    /// empty when the edit is not allowed or changes nothing.
    pub fn set_local(
        &mut self,
        setting: Setting,
        rights: EditRights,
        catalog: &impl ScenarioCatalog,
    ) -> Vec<Setting> {
        if !rights.may_edit(setting.id()) {
            tracing::debug!(?setting, role = %self.role, "edit not permitted, ignoring");
            return Vec::new();
        }

        let s = &mut self.current;
        let mut out = Vec::new();
        match setting {
            Setting::Race(race) => {
                if !catalog.is_race_legal(s.level, race, s.my_slot) {
                    tracing::debug!(?race, slot = %s.my_slot, "race not legal for this seat");
                    return Vec::new();
                }
                s.my_race = race;
                out.push(Setting::Race(race));
            }
            Setting::Level(level) => {
                if !catalog.is_networkable(level) {
                    tracing::debug!(%level, "level is not networkable");
                    return Vec::new();
                }
                s.level = level;
                self.revalidate_races(catalog);
                out.push(Setting::Level(level));
                out.push(Setting::Race(self.current.my_race));
            }
            Setting::Latency(latency) => {
                let latency = Latency::new(latency.ticks());
                s.latency = latency;
                out.push(Setting::Latency(latency));
            }
            Setting::Registered(mode) => {
                s.registered = mode;
                out.push(setting);
            }
            Setting::ResendDelay(delay) => {
                s.resend_delay = delay;
                out.push(setting);
            }
            Setting::LowerBandwidth(on) => {
                s.lower_bandwidth = on;
                out.push(setting);
            }
            Setting::ClientCanEdit(on) => {
                s.client_can_edit = on;
                out.push(setting);
            }
            Setting::HostIsPlayer2(on) => {
                self.set_host_is_player2(on, catalog);
                out.push(setting);
                out.push(Setting::Race(self.current.my_race));
            }
        }
        self.record(&out);
        out
    }

    /// Applies a setting received from the peer, coercing it into a legal
    /// value. Returns settings this side must send in response (its own
    /// race after the level or seating changed).
    pub fn apply_remote(
        &mut self,
        setting: Setting,
        im_ready: bool,
        catalog: &impl ScenarioCatalog,
    ) -> Vec<Setting> {
        let s = &mut self.current;
        let mut out = Vec::new();
        match setting {
            Setting::Race(race) => {
                s.opponent_race = if catalog.is_race_legal(s.level, race, s.opponent_slot) {
                    race
                } else {
                    let fallback = catalog.default_race(s.level, s.opponent_slot);
                    tracing::debug!(?race, ?fallback, "opponent race illegal, using default");
                    fallback
                };
            }
            Setting::Level(level) => {
                s.level = if catalog.is_networkable(level) {
                    level
                } else {
                    let fallback = catalog.first_networkable();
                    tracing::debug!(%level, %fallback, "remote level not networkable");
                    fallback
                };
                self.revalidate_races(catalog);
                out.push(Setting::Race(self.current.my_race));
            }
            Setting::Latency(latency) => {
                if !latency.is_canonical() {
                    tracing::debug!(ticks = latency.ticks(), "remote latency off grid, snapping");
                }
                s.latency = Latency::new(latency.ticks());
            }
            Setting::Registered(mode) => s.registered = mode,
            Setting::ResendDelay(delay) => s.resend_delay = delay,
            Setting::LowerBandwidth(on) => s.lower_bandwidth = on,
            Setting::ClientCanEdit(on) => {
                if self.role == Role::Client && !im_ready {
                    s.client_can_edit = on;
                } else {
                    tracing::debug!(on, role = %self.role, im_ready, "ignoring edit-rights change");
                }
            }
            Setting::HostIsPlayer2(on) => {
                if self.role == Role::Client {
                    let before = self.current.my_race;
                    self.set_host_is_player2(on, catalog);
                    if self.current.my_race != before {
                        out.push(Setting::Race(self.current.my_race));
                    }
                } else {
                    tracing::debug!(on, "host ignores remote seating change");
                }
            }
        }
        self.record(&out);
        out
    }

    /// Applies the host's announced seat on the client.
    pub fn apply_admiral_number(&mut self, host_slot: PlayerSlot, catalog: &impl ScenarioCatalog) {
        if self.role == Role::Client {
            self.set_host_is_player2(host_slot == PlayerSlot::SECOND, catalog);
        }
    }

    /// Opponent colour is a local preference and is never broadcast.
    pub fn set_opponent_color(&mut self, color: ColorIndex) {
        self.current.opponent_color = color;
    }

    /// Settings sent when the peer arrives. The host sends the whole
    /// replicated state; the client sends only its race.
    ///
    /// Seating and level go out before the host's race so the client
    /// checks that race against the right seat and level.
    pub fn arrival_snapshot(&mut self) -> Vec<Setting> {
        let s = &self.current;
        let out = match self.role {
            Role::Host => vec![
                Setting::Latency(s.latency),
                Setting::Registered(s.registered),
                Setting::ResendDelay(s.resend_delay),
                Setting::LowerBandwidth(s.lower_bandwidth),
                Setting::ClientCanEdit(s.client_can_edit),
                Setting::HostIsPlayer2(s.host_is_player2),
                Setting::Level(s.level),
                Setting::Race(s.my_race),
            ],
            Role::Client => vec![Setting::Race(s.my_race)],
        };
        self.record(&out);
        out
    }

    /// Puts every setting back to `initial`.
    pub fn restore(&mut self, initial: &InitialSettings, catalog: &impl ScenarioCatalog) {
        *self = Self::new(self.role, initial, catalog);
    }

    fn set_host_is_player2(&mut self, on: bool, catalog: &impl ScenarioCatalog) {
        let (my_slot, opponent_slot) = slots(self.role, on);
        self.current.host_is_player2 = on;
        self.current.my_slot = my_slot;
        self.current.opponent_slot = opponent_slot;
        self.revalidate_races(catalog);
    }

    fn revalidate_races(&mut self, catalog: &impl ScenarioCatalog) {
        let s = &mut self.current;
        if !catalog.is_race_legal(s.level, s.my_race, s.my_slot) {
            s.my_race = catalog.default_race(s.level, s.my_slot);
        }
        if !catalog.is_race_legal(s.level, s.opponent_race, s.opponent_slot) {
            s.opponent_race = catalog.default_race(s.level, s.opponent_slot);
        }
    }

    fn record(&mut self, sent: &[Setting]) {
        for setting in sent {
            self.last_broadcast.insert(setting.id(), *setting);
        }
    }
}

fn slots(role: Role, host_is_player2: bool) -> (PlayerSlot, PlayerSlot) {
    let mine = if host_is_player2 {
        role.default_slot().other()
    } else {
        role.default_slot()
    };
    (mine, mine.other())
}
