//! Membership: joining, leaving, kicking, ready and spectate flags.

use beatroom_protocol::PlayerId;
use rand::Rng;

use crate::event::{DisbandReason, Effects, RoomEvent, TimerAction};
use crate::{Player, PlayerState, Room, RoomError, RoundPhase, host, round, teams};

/// Adds a player to the room.
///
/// Checking that the player isn't a member of some *other* room is the
/// registry's job; this only rejects a second join to the same room.
pub fn join(room: &mut Room, player: Player, password: Option<&str>) -> Result<Effects, RoomError> {
    if room.contains(player.id) {
        return Err(RoomError::AlreadyInARoom(player.id, room.id.clone()));
    }
    if room.status.is_playing() {
        return Err(RoomError::RoundInProgress);
    }
    if !room.password_matches(password) {
        return Err(RoomError::WrongPassword(room.id.clone()));
    }
    if room.is_full() {
        return Err(RoomError::RoomFull(room.id.clone()));
    }

    let id = player.id;
    let display_name = player.display_name.clone();
    room.players.push(Player::new(id, player.display_name));
    let team = teams::auto_assign(room, id);

    let mut effects = Effects::with_event(RoomEvent::PlayerJoined {
        player: id,
        display_name,
        team,
    });
    if room.status.phase == RoundPhase::Countdown {
        round::abort_countdown(room, "a player joined", &mut effects);
    }
    Ok(effects)
}

/// Removes a player of their own accord.
pub fn leave<R: Rng + ?Sized>(room: &mut Room, player: PlayerId, rng: &mut R) -> Result<Effects, RoomError> {
    room.member(player)?;
    Ok(remove_player(room, player, RoomEvent::PlayerLeft { player }, rng))
}

/// Removes `target` on the host's behalf.
pub fn kick<R: Rng + ?Sized>(
    room: &mut Room,
    actor: PlayerId,
    target: PlayerId,
    rng: &mut R,
) -> Result<Effects, RoomError> {
    room.require_host(actor)?;
    if actor == target {
        return Err(RoomError::CannotKickSelf);
    }
    room.member(target)?;
    Ok(remove_player(
        room,
        target,
        RoomEvent::PlayerKicked {
            player: target,
            by: actor,
        },
        rng,
    ))
}

/// Shared tail of leave and kick. Always succeeds, whatever the phase.
fn remove_player<R: Rng + ?Sized>(
    room: &mut Room,
    player: PlayerId,
    departure: RoomEvent,
    rng: &mut R,
) -> Effects {
    room.players.retain(|p| p.id != player);
    let mut effects = Effects::with_event(departure);

    if room.players.is_empty() {
        effects.disband = true;
        effects.timer = TimerAction::Cancel;
        effects.events.push(RoomEvent::RoomDisbanded {
            reason: DisbandReason::LastPlayerLeft,
        });
        return effects;
    }

    if let Some((from, to)) = host::migrate(room, rng) {
        effects.events.push(RoomEvent::HostChanged { from, to });
    }
    push_team_moves(&mut effects, teams::rebalance(room));

    match room.status.phase {
        RoundPhase::Idle => {}
        RoundPhase::Countdown => round::abort_countdown(room, "a player left", &mut effects),
        RoundPhase::Playing | RoundPhase::Scoring => {
            let playing = room.status.phase == RoundPhase::Playing;
            if let Some(state) = room.status.current_round.as_mut() {
                state.remove_participant(player);
                if playing && state.is_complete() {
                    effects.close_round = Some(state.generation);
                }
            }
        }
    }
    effects
}

/// Sets a player's ready flag.
///
/// Outside Idle and Countdown only the flag changes. A non-host flipping
/// their flag during the countdown cancels it; the host's own flag is
/// checked again when the countdown expires.
pub fn set_ready(room: &mut Room, player: PlayerId, ready: bool) -> Result<Effects, RoomError> {
    if room.member(player)?.is_ready == ready {
        return Ok(Effects::noop());
    }
    let accepts_changes = room.status.phase.accepts_changes();
    if let Some(p) = room.player_mut(player) {
        p.is_ready = ready;
        if accepts_changes {
            p.state = if ready { PlayerState::Ready } else { PlayerState::Idle };
        }
    }
    let mut effects = Effects::with_event(RoomEvent::ReadyChanged { player, ready });
    if room.status.phase == RoundPhase::Countdown && !room.is_host(player) {
        round::abort_countdown(room, "a player changed their ready state", &mut effects);
    }
    Ok(effects)
}

/// Toggles spectator mode.
///
/// A participant who is still playing the live round can't switch.
/// Spectators have no team; coming back from spectating puts the player
/// on the smaller team.
pub fn set_spectating(room: &mut Room, player: PlayerId, spectating: bool) -> Result<Effects, RoomError> {
    let member = room.member(player)?;
    if member.is_spectating == spectating {
        return Ok(Effects::noop());
    }
    if room.status.is_playing() && member.state == PlayerState::Playing {
        return Err(RoomError::MidRound(player));
    }

    if let Some(p) = room.player_mut(player) {
        p.is_spectating = spectating;
        if spectating {
            p.team = None;
        }
    }
    let mut effects = Effects::with_event(RoomEvent::SpectatingChanged { player, spectating });
    if spectating {
        push_team_moves(&mut effects, teams::rebalance(room));
    } else if let Some(team) = teams::auto_assign(room, player) {
        effects.events.push(RoomEvent::TeamChanged { player, team });
    }
    if room.status.phase == RoundPhase::Countdown {
        round::abort_countdown(room, "a player changed spectator mode", &mut effects);
    }
    Ok(effects)
}

/// Deletes the room on the host's request.
pub fn disband(room: &Room, actor: PlayerId) -> Result<Effects, RoomError> {
    room.require_host(actor)?;
    let mut effects = Effects::with_event(RoomEvent::RoomDisbanded {
        reason: DisbandReason::ByHost,
    });
    effects.disband = true;
    effects.timer = TimerAction::Cancel;
    Ok(effects)
}

fn push_team_moves(effects: &mut Effects, moves: Vec<(PlayerId, crate::Team)>) {
    effects.events.extend(
        moves
            .into_iter()
            .map(|(player, team)| RoomEvent::TeamChanged { player, team }),
    );
}
