//! The scenario collaborator: which levels can be played over the network,
//! which races each seat may pick, and which external scenario files are
//! installed.

use parley_protocol::{ChapterId, PlayerSlot, RaceId, ScenarioFileInfo, ScenarioVerdict};

/// Read access to the game's scenario data, plus the little state the
/// setup screen keeps about external scenario files.
pub trait ScenarioCatalog {
    /// Whether `level` can be played by two networked players.
    fn is_networkable(&self, level: ChapterId) -> bool;

    /// The level to fall back to when a requested one is not networkable.
    fn first_networkable(&self) -> ChapterId;

    /// Whether `race` may be played from `slot` on `level`.
    fn is_race_legal(&self, level: ChapterId, race: RaceId, slot: PlayerSlot) -> bool;

    /// The race a player in `slot` gets when their pick is illegal.
    fn default_race(&self, level: ChapterId, slot: PlayerSlot) -> RaceId;

    /// The locally installed copy of an external scenario file, if any.
    fn find_external(&self, file_name: &str) -> Option<ScenarioFileInfo>;

    /// Makes an external scenario file the active one. Called on both
    /// peers once they agree they hold the same file.
    fn activate_external(&mut self, info: &ScenarioFileInfo);

    /// Forgets any active external scenario file.
    fn reset_external(&mut self);
}

/// Compares the local copy of a scenario file with the one the peer opened.
pub fn compare_scenario(local: Option<&ScenarioFileInfo>, remote: &ScenarioFileInfo) -> ScenarioVerdict {
    let Some(local) = local else {
        return ScenarioVerdict::Missing;
    };
    if local.version < remote.version {
        ScenarioVerdict::OlderVersion
    } else if local.version > remote.version {
        ScenarioVerdict::NewerVersion
    } else if local.checksum != remote.checksum {
        ScenarioVerdict::WrongChecksum
    } else {
        ScenarioVerdict::Accepted
    }
}

// ---------------------------------------------------------------------------
// ScenarioTable
// ---------------------------------------------------------------------------

/// One level in a [`ScenarioTable`].
#[derive(Debug, Clone)]
pub struct ChapterEntry {
    pub id: ChapterId,
    pub networkable: bool,
    /// Legal races per seat. The first entry is that seat's default.
    pub races: [Vec<RaceId>; 2],
}

impl ChapterEntry {
    pub fn networked(id: ChapterId, first_seat: &[RaceId], second_seat: &[RaceId]) -> Self {
        Self {
            id,
            networkable: true,
            races: [first_seat.to_vec(), second_seat.to_vec()],
        }
    }

    pub fn solo(id: ChapterId) -> Self {
        Self {
            id,
            networkable: false,
            races: [Vec::new(), Vec::new()],
        }
    }
}

/// An in-memory [`ScenarioCatalog`] built from a list of chapters.
#[derive(Debug, Clone, Default)]
pub struct ScenarioTable {
    chapters: Vec<ChapterEntry>,
    installed: Vec<ScenarioFileInfo>,
    active_external: Option<ScenarioFileInfo>,
}

impl ScenarioTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chapter(mut self, chapter: ChapterEntry) -> Self {
        self.chapters.push(chapter);
        self
    }

    /// Registers an external scenario file as installed locally.
    pub fn with_installed(mut self, info: ScenarioFileInfo) -> Self {
        self.installed.push(info);
        self
    }

    pub fn active_external(&self) -> Option<&ScenarioFileInfo> {
        self.active_external.as_ref()
    }

    fn chapter(&self, level: ChapterId) -> Option<&ChapterEntry> {
        self.chapters.iter().find(|c| c.id == level)
    }
}

impl ScenarioCatalog for ScenarioTable {
    fn is_networkable(&self, level: ChapterId) -> bool {
        self.chapter(level).is_some_and(|c| c.networkable)
    }

    fn first_networkable(&self) -> ChapterId {
        self.chapters
            .iter()
            .find(|c| c.networkable)
            .map(|c| c.id)
            .unwrap_or(ChapterId(-1))
    }

    fn is_race_legal(&self, level: ChapterId, race: RaceId, slot: PlayerSlot) -> bool {
        self.chapter(level)
            .and_then(|c| c.races.get(slot.index()))
            .is_some_and(|races| races.contains(&race))
    }

    fn default_race(&self, level: ChapterId, slot: PlayerSlot) -> RaceId {
        self.chapter(level)
            .and_then(|c| c.races.get(slot.index()))
            .and_then(|races| races.first().copied())
            .unwrap_or(RaceId(0))
    }

    fn find_external(&self, file_name: &str) -> Option<ScenarioFileInfo> {
        self.installed.iter().find(|i| i.file_name == file_name).cloned()
    }

    fn activate_external(&mut self, info: &ScenarioFileInfo) {
        self.active_external = Some(info.clone());
    }

    fn reset_external(&mut self) {
        self.active_external = None;
    }
}
