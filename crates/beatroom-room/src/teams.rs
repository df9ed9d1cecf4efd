//! Team balancing for team versus rooms.
//!
//! Only non-spectating players count towards a team. After every roster
//! change the two sides differ by at most one player.

use beatroom_protocol::PlayerId;

use crate::event::{Effects, RoomEvent};
use crate::{Room, RoomError, RoundPhase, Team, TeamMode, round};

/// Non-spectating players per team.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamCounts {
    pub red: usize,
    pub blue: usize,
}

impl TeamCounts {
    fn add(&mut self, team: Team) {
        match team {
            Team::Red => self.red += 1,
            Team::Blue => self.blue += 1,
        }
    }

    /// The team a newcomer goes to. Ties go to Red.
    fn smaller(&self) -> Team {
        if self.blue < self.red { Team::Blue } else { Team::Red }
    }

    fn is_balanced(&self) -> bool {
        self.red.abs_diff(self.blue) <= 1
    }
}

pub fn counts(room: &Room) -> TeamCounts {
    let mut counts = TeamCounts::default();
    for team in room.active_players().filter_map(|p| p.team) {
        counts.add(team);
    }
    counts
}

/// Puts a teamless, non-spectating player on the smaller team.
///
/// Does nothing outside team versus mode. Returns the team assigned.
pub(crate) fn auto_assign(room: &mut Room, player: PlayerId) -> Option<Team> {
    if room.settings.team_mode != TeamMode::TeamVs {
        return None;
    }
    let team = counts(room).smaller();
    let p = room.player_mut(player)?;
    if p.is_spectating || p.team.is_some() {
        return None;
    }
    p.team = Some(team);
    Some(team)
}

/// Reassigns every non-spectator in join order.
pub(crate) fn assign_all(room: &mut Room) -> Vec<(PlayerId, Team)> {
    let mut counts = TeamCounts::default();
    let mut assigned = Vec::new();
    for p in &mut room.players {
        p.team = None;
        if p.is_spectating {
            continue;
        }
        let team = counts.smaller();
        counts.add(team);
        p.team = Some(team);
        assigned.push((p.id, team));
    }
    assigned
}

pub(crate) fn clear(room: &mut Room) {
    for p in &mut room.players {
        p.team = None;
    }
}

/// Brings teams in line with a new team mode.
pub(crate) fn on_mode_change(room: &mut Room) -> Vec<(PlayerId, Team)> {
    match room.settings.team_mode {
        TeamMode::TeamVs => assign_all(room),
        TeamMode::HeadToHead => {
            clear(room);
            Vec::new()
        }
    }
}

/// Moves the most recently joined members of the larger team across
/// until the sides differ by at most one.
pub(crate) fn rebalance(room: &mut Room) -> Vec<(PlayerId, Team)> {
    let mut moved = Vec::new();
    if room.settings.team_mode != TeamMode::TeamVs {
        return moved;
    }
    let mut current = counts(room);
    while !current.is_balanced() {
        let larger = if current.red > current.blue { Team::Red } else { Team::Blue };
        let Some(p) = room
            .players
            .iter_mut()
            .rev()
            .find(|p| !p.is_spectating && p.team == Some(larger))
        else {
            break;
        };
        p.team = Some(larger.other());
        moved.push((p.id, larger.other()));
        current = counts(room);
    }
    moved
}

/// Handles an explicit team switch request.
///
/// The move is honored only if it keeps the teams within one player of
/// each other.
pub fn request_team(room: &mut Room, player: PlayerId, team: Team) -> Result<Effects, RoomError> {
    let member = room.member(player)?;
    if room.settings.team_mode != TeamMode::TeamVs {
        return Err(RoomError::NotTeamMode);
    }
    if member.is_spectating {
        return Err(RoomError::SpectatorHasNoTeam(player));
    }
    if room.status.is_playing() {
        return Err(RoomError::RoundInProgress);
    }
    let current = member.team;
    if current == Some(team) {
        return Ok(Effects::noop());
    }

    let mut after = counts(room);
    after.add(team);
    match current {
        Some(Team::Red) => after.red -= 1,
        Some(Team::Blue) => after.blue -= 1,
        None => {}
    }
    if !after.is_balanced() {
        return Err(RoomError::TeamImbalance);
    }
    if let Some(p) = room.player_mut(player) {
        p.team = Some(team);
    }
    let mut effects = Effects::default();
    effects.events.push(RoomEvent::TeamChanged { player, team });
    if room.status.phase == RoundPhase::Countdown {
        round::abort_countdown(room, "teams changed", &mut effects);
    }
    Ok(effects)
}
