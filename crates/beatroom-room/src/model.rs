//! The room document and its parts.

use beatroom_protocol::{ChannelId, PlayerId, RoomId};
use serde::{Deserialize, Serialize};

use crate::round::RoundState;
use crate::{RoomSettings, RoundPhase, TeamMode, teams};

/// One of the two sides in team versus mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    pub fn other(self) -> Self {
        match self {
            Self::Red => Self::Blue,
            Self::Blue => Self::Red,
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Red => write!(f, "Red"),
            Self::Blue => write!(f, "Blue"),
        }
    }
}

/// A player's personal progress through the round cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayerState {
    #[default]
    Idle,
    Ready,
    Playing,
    Finished,
}

/// A member of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub is_ready: bool,
    pub is_spectating: bool,
    pub team: Option<Team>,
    pub state: PlayerState,
}

impl Player {
    /// A freshly joined player: idle, not ready, not spectating, no team.
    pub fn new(id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_ready: false,
            is_spectating: false,
            team: None,
            state: PlayerState::Idle,
        }
    }
}

/// Round bookkeeping stored on the room.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoomStatus {
    pub phase: RoundPhase,
    /// Bumped every time a timed phase (Countdown, Playing) is entered.
    /// Timers carry the generation they were started for, so a timer from
    /// an earlier countdown or round can tell it's stale.
    pub generation: u64,
    pub countdown_deadline: Option<u64>,
    pub current_round: Option<RoundState>,
}

impl RoomStatus {
    /// Whether a round is live: Playing or Scoring.
    pub fn is_playing(&self) -> bool {
        self.phase.is_playing()
    }
}

/// Everything the registry needs to create a room.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub name: String,
    pub password: Option<String>,
    pub channel: ChannelId,
    pub host: Player,
    pub settings: RoomSettings,
}

/// The central aggregate: one multiplayer room.
///
/// Rooms are plain values. Every change is made on a copy read from the
/// registry and written back with a compare-and-swap on `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    /// Monotonic document version, owned by the registry.
    pub version: u64,
    pub name: String,
    /// `None` means anyone with the code can join.
    pub password: Option<String>,
    pub channel: ChannelId,
    pub host: PlayerId,
    pub settings: RoomSettings,
    pub status: RoomStatus,
    /// Members in join order.
    pub players: Vec<Player>,
}

impl Room {
    /// Builds the first version of a room from a creation request.
    pub fn open(id: RoomId, draft: NewRoom) -> Self {
        let host = draft.host.id;
        let mut room = Self {
            id,
            version: 1,
            name: draft.name,
            password: draft.password.filter(|p| !p.is_empty()),
            channel: draft.channel,
            host,
            settings: draft.settings,
            status: RoomStatus::default(),
            players: vec![Player {
                is_ready: false,
                team: None,
                state: PlayerState::Idle,
                ..draft.host
            }],
        };
        if room.settings.team_mode == TeamMode::TeamVs {
            teams::assign_all(&mut room);
        }
        room
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.player(id).is_some()
    }

    pub fn is_host(&self, id: PlayerId) -> bool {
        self.host == id
    }

    /// Members who are not spectating.
    pub fn active_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| !p.is_spectating)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= usize::from(self.settings.max_player_slot)
    }

    pub fn is_public(&self) -> bool {
        self.password.is_none()
    }

    /// Checks a supplied password against the room's.
    pub fn password_matches(&self, supplied: Option<&str>) -> bool {
        match &self.password {
            None => true,
            Some(expected) => supplied == Some(expected.as_str()),
        }
    }

    /// The player or fail with `PlayerNotInRoom`.
    pub(crate) fn member(&self, id: PlayerId) -> Result<&Player, crate::RoomError> {
        self.player(id)
            .ok_or_else(|| crate::RoomError::PlayerNotInRoom(id, self.id.clone()))
    }

    /// Fails with `NotHost` unless `id` is a member and the host.
    pub(crate) fn require_host(&self, id: PlayerId) -> Result<(), crate::RoomError> {
        self.member(id)?;
        if !self.is_host(id) {
            return Err(crate::RoomError::NotHost(id));
        }
        Ok(())
    }

    /// A summary for room browsers.
    pub fn listing(&self) -> RoomListing {
        RoomListing {
            room_id: self.id.clone(),
            name: self.name.clone(),
            player_count: self.players.len(),
            max_players: usize::from(self.settings.max_player_slot),
            has_password: !self.is_public(),
            is_playing: self.status.is_playing(),
            beatmap_hash: self.settings.beatmap_hash.clone(),
        }
    }

    /// Verifies the invariants every committed room must satisfy.
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.players.is_empty() {
            return Err("room has no players".into());
        }
        let hosts = self.players.iter().filter(|p| p.id == self.host).count();
        if hosts != 1 {
            return Err(format!("host {} appears {hosts} times in the roster", self.host));
        }
        for (i, p) in self.players.iter().enumerate() {
            if self.players[..i].iter().any(|q| q.id == p.id) {
                return Err(format!("player {} is listed twice", p.id));
            }
        }
        if self.players.len() > usize::from(self.settings.max_player_slot) {
            return Err(format!(
                "{} players exceed {} slots",
                self.players.len(),
                self.settings.max_player_slot
            ));
        }
        match self.settings.team_mode {
            TeamMode::HeadToHead => {
                if let Some(p) = self.players.iter().find(|p| p.team.is_some()) {
                    return Err(format!("player {} has a team in head-to-head", p.id));
                }
            }
            TeamMode::TeamVs => {
                if let Some(p) = self.active_players().find(|p| p.team.is_none()) {
                    return Err(format!("player {} has no team in team versus", p.id));
                }
                let counts = teams::counts(self);
                if counts.red.abs_diff(counts.blue) > 1 {
                    return Err(format!("teams are {}v{}", counts.red, counts.blue));
                }
            }
        }
        if self.status.is_playing() != self.status.current_round.is_some() {
            return Err(format!(
                "phase {} does not match round state presence",
                self.status.phase
            ));
        }
        if (self.status.phase == RoundPhase::Countdown) != self.status.countdown_deadline.is_some()
        {
            return Err("countdown deadline out of sync with phase".into());
        }
        Ok(())
    }
}

/// What a room browser shows about a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomListing {
    pub room_id: RoomId,
    pub name: String,
    pub player_count: usize,
    pub max_players: usize,
    pub has_password: bool,
    pub is_playing: bool,
    pub beatmap_hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(settings: RoomSettings) -> NewRoom {
        NewRoom {
            name: "friday lobby".into(),
            password: Some(String::new()),
            channel: ChannelId(10),
            host: Player::new(PlayerId(1), "alice"),
            settings,
        }
    }

    #[test]
    fn test_open_room_makes_creator_host() {
        let room = Room::open(RoomId::new("ABCDEF"), draft(RoomSettings::default()));
        assert_eq!(room.host, PlayerId(1));
        assert_eq!(room.players.len(), 1);
        assert_eq!(room.version, 1);
        assert!(room.check_invariants().is_ok());
    }

    #[test]
    fn test_open_room_treats_empty_password_as_public() {
        let room = Room::open(RoomId::new("ABCDEF"), draft(RoomSettings::default()));
        assert!(room.is_public());
        assert!(room.password_matches(None));
        assert!(room.password_matches(Some("anything")));
    }

    #[test]
    fn test_password_matches() {
        let mut d = draft(RoomSettings::default());
        d.password = Some("hunter2".into());
        let room = Room::open(RoomId::new("ABCDEF"), d);
        assert!(room.password_matches(Some("hunter2")));
        assert!(!room.password_matches(Some("hunter3")));
        assert!(!room.password_matches(None));
    }

    #[test]
    fn test_open_team_room_assigns_host_to_red() {
        let settings = RoomSettings {
            team_mode: TeamMode::TeamVs,
            ..RoomSettings::default()
        };
        let room = Room::open(RoomId::new("ABCDEF"), draft(settings));
        assert_eq!(room.players[0].team, Some(Team::Red));
        assert!(room.check_invariants().is_ok());
    }

    #[test]
    fn test_check_invariants_flags_missing_host() {
        let mut room = Room::open(RoomId::new("ABCDEF"), draft(RoomSettings::default()));
        room.host = PlayerId(99);
        assert!(room.check_invariants().is_err());
    }

    #[test]
    fn test_room_document_survives_json() {
        let room = Room::open(RoomId::new("ABCDEF"), draft(RoomSettings::default()));
        let json = serde_json::to_vec(&room).unwrap();
        let back: Room = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, room);
    }
}
