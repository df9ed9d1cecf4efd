//! Room settings and the host-only negotiation that changes them.

use beatroom_protocol::PlayerId;
use serde::{Deserialize, Serialize};

use crate::event::{Effects, RoomEvent};
use crate::mods::{BeatmapRules, Mods};
use crate::{Room, RoomError, RoundPhase, round, teams};

/// Longest room name, in characters.
pub const MAX_NAME_LEN: usize = 50;
/// Fewest player slots a room may have.
pub const MIN_SLOTS: u8 = 2;
/// Most player slots a room may have.
pub const MAX_SLOTS: u8 = 8;
/// Allowed custom speed multipliers.
pub const SPEED_RANGE: std::ops::RangeInclusive<f64> = 0.5..=2.0;
/// Allowed forced approach rates.
pub const FORCE_AR_RANGE: std::ops::RangeInclusive<f64> = 0.0..=12.5;

/// Everyone for themselves, or two teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TeamMode {
    #[default]
    HeadToHead,
    TeamVs,
}

/// The metric used to rank results at the end of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WinCondition {
    #[default]
    ScoreV1,
    ScoreV2,
    Accuracy,
    MaxCombo,
    Most300,
    Least100,
    Least50,
    LeastMiss,
    LeastUnstableRate,
    MostDroidPp,
    MostPcPp,
}

impl WinCondition {
    /// Returns `true` if lower values rank higher.
    pub fn is_ascending(self) -> bool {
        matches!(
            self,
            Self::Least100 | Self::Least50 | Self::LeastMiss | Self::LeastUnstableRate
        )
    }
}

/// Host-configurable match settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSettings {
    pub team_mode: TeamMode,
    pub win_condition: WinCondition,
    /// Weight of the score component in ScoreV2, the rest is accuracy.
    pub score_portion: f64,
    pub speed_multiplier: f64,
    pub force_ar: Option<f64>,
    pub allow_slider_lock: bool,
    pub max_player_slot: u8,
    pub beatmap_hash: Option<String>,
    pub mods: Mods,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            team_mode: TeamMode::HeadToHead,
            win_condition: WinCondition::ScoreV1,
            score_portion: 0.4,
            speed_multiplier: 1.0,
            force_ar: None,
            allow_slider_lock: false,
            max_player_slot: MAX_SLOTS,
            beatmap_hash: None,
            mods: Mods::new(),
        }
    }
}

impl RoomSettings {
    /// An empty beatmap hash means no beatmap is picked.
    pub fn normalize(&mut self) {
        self.beatmap_hash = self.beatmap_hash.take().filter(|h| !h.is_empty());
    }

    /// Checks every value rule against a room of `player_count` members.
    pub fn validate(
        &self,
        player_count: usize,
        rules: &impl BeatmapRules,
    ) -> Result<(), RoomError> {
        if !(MIN_SLOTS..=MAX_SLOTS).contains(&self.max_player_slot) {
            return Err(RoomError::InvalidSlotCount(self.max_player_slot));
        }
        if usize::from(self.max_player_slot) < player_count {
            return Err(RoomError::SlotsBelowPlayerCount {
                requested: self.max_player_slot,
                players: player_count,
            });
        }
        if !(0.0..=1.0).contains(&self.score_portion) {
            return Err(RoomError::ScorePortionOutOfRange(self.score_portion));
        }
        if !SPEED_RANGE.contains(&self.speed_multiplier) {
            return Err(RoomError::SpeedOutOfRange(self.speed_multiplier));
        }
        if let Some(ar) = self.force_ar {
            if !FORCE_AR_RANGE.contains(&ar) {
                return Err(RoomError::ForceArOutOfRange(ar));
            }
        }
        rules
            .check_mods(&self.mods, self.speed_multiplier)
            .map_err(RoomError::IncompatibleMods)
    }
}

/// Trims and checks a room name.
pub fn validate_name(name: &str) -> Result<String, RoomError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RoomError::EmptyName);
    }
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(RoomError::NameTooLong(len));
    }
    Ok(name.to_string())
}

/// A partial update to a room's name, password, and settings.
///
/// Unset fields are left alone. Fields that can be cleared take an
/// `Option` inside the `Option`: `Some(None)` clears, `None` keeps.
#[derive(Debug, Clone, Default)]
pub struct SettingsChange {
    pub name: Option<String>,
    pub password: Option<Option<String>>,
    pub team_mode: Option<TeamMode>,
    pub win_condition: Option<WinCondition>,
    pub score_portion: Option<f64>,
    pub speed_multiplier: Option<f64>,
    pub force_ar: Option<Option<f64>>,
    pub allow_slider_lock: Option<bool>,
    pub max_player_slot: Option<u8>,
    pub beatmap_hash: Option<Option<String>>,
    pub mods: Option<Mods>,
}

impl SettingsChange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn password(mut self, password: Option<String>) -> Self {
        self.password = Some(password);
        self
    }

    pub fn team_mode(mut self, mode: TeamMode) -> Self {
        self.team_mode = Some(mode);
        self
    }

    pub fn win_condition(mut self, condition: WinCondition) -> Self {
        self.win_condition = Some(condition);
        self
    }

    pub fn score_portion(mut self, portion: f64) -> Self {
        self.score_portion = Some(portion);
        self
    }

    pub fn speed_multiplier(mut self, speed: f64) -> Self {
        self.speed_multiplier = Some(speed);
        self
    }

    pub fn force_ar(mut self, ar: Option<f64>) -> Self {
        self.force_ar = Some(ar);
        self
    }

    pub fn allow_slider_lock(mut self, allow: bool) -> Self {
        self.allow_slider_lock = Some(allow);
        self
    }

    pub fn max_player_slot(mut self, slots: u8) -> Self {
        self.max_player_slot = Some(slots);
        self
    }

    pub fn beatmap(mut self, hash: impl Into<String>) -> Self {
        self.beatmap_hash = Some(Some(hash.into()));
        self
    }

    pub fn clear_beatmap(mut self) -> Self {
        self.beatmap_hash = Some(None);
        self
    }

    pub fn mods(mut self, mods: Mods) -> Self {
        self.mods = Some(mods);
        self
    }
}

/// Applies a host's settings change to the room.
///
/// Everything is validated against the merged result before anything is
/// written, so a rejected change leaves the room untouched. A change
/// during the countdown cancels it.
pub fn negotiate(
    room: &mut Room,
    actor: PlayerId,
    change: SettingsChange,
    rules: &impl BeatmapRules,
) -> Result<Effects, RoomError> {
    room.require_host(actor)?;
    if room.status.is_playing() {
        return Err(RoomError::RoundInProgress);
    }

    let name = change.name.as_deref().map(validate_name).transpose()?;

    let mut next = room.settings.clone();
    if let Some(mode) = change.team_mode {
        next.team_mode = mode;
    }
    if let Some(condition) = change.win_condition {
        next.win_condition = condition;
    }
    if let Some(portion) = change.score_portion {
        next.score_portion = portion;
    }
    if let Some(speed) = change.speed_multiplier {
        next.speed_multiplier = speed;
    }
    if let Some(ar) = change.force_ar {
        next.force_ar = ar;
    }
    if let Some(allow) = change.allow_slider_lock {
        next.allow_slider_lock = allow;
    }
    if let Some(slots) = change.max_player_slot {
        next.max_player_slot = slots;
    }
    if let Some(hash) = change.beatmap_hash {
        next.beatmap_hash = hash;
    }
    if let Some(mods) = change.mods {
        next.mods = mods;
    }
    next.normalize();
    next.validate(room.players.len(), rules)?;

    let mut effects = Effects::default();
    let renamed = name.as_ref().is_some_and(|n| *n != room.name);
    let beatmap_changed = next.beatmap_hash != room.settings.beatmap_hash;
    let mode_changed = next.team_mode != room.settings.team_mode;

    if let Some(name) = name {
        room.name = name;
    }
    if let Some(password) = change.password {
        room.password = password.filter(|p| !p.is_empty());
    }
    room.settings = next;

    if mode_changed {
        let moved = teams::on_mode_change(room);
        effects.events.extend(
            moved
                .into_iter()
                .map(|(player, team)| RoomEvent::TeamChanged { player, team }),
        );
    }

    if room.status.phase == RoundPhase::Countdown {
        round::abort_countdown(room, "settings changed", &mut effects);
    }

    effects.events.push(RoomEvent::SettingsChanged {
        name: room.name.clone(),
        beatmap_hash: room.settings.beatmap_hash.clone(),
        retitle: renamed || beatmap_changed,
    });
    Ok(effects)
}
