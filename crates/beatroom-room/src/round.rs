//! Round transitions: countdown, play, score collection, summary.
//!
//! Each function takes the room read from the registry, mutates it and
//! returns the [`Effects`] to carry out once the write succeeds. Timer
//! driven transitions carry the `generation` they were scheduled for and
//! do nothing if the room has moved on since.

use beatroom_protocol::PlayerId;
use serde::{Deserialize, Serialize};

use crate::evaluate::{self, Entry, Ranking, ScoringParams, Winner};
use crate::event::{Effects, RoomEvent, TimerAction};
use crate::mods::Mods;
use crate::{PlayerState, Room, RoomError, RoundPhase, Team, TeamMode, WinCondition};

/// Fewest non-spectating players a round can start with.
pub const MIN_PLAYERS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Judgements {
    pub n300: u32,
    pub n100: u32,
    pub n50: u32,
}

/// A player's result as reported by the game service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawResult {
    pub score: u64,
    pub max_combo: u32,
    pub judgements: Judgements,
    pub misses: u32,
    pub mods: Mods,
    /// In `0.0..=1.0`.
    pub accuracy: f64,
    pub droid_pp: Option<f64>,
    pub pc_pp: Option<f64>,
    pub unstable_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedResult {
    pub player: PlayerId,
    pub result: RawResult,
    /// Lobby clock, milliseconds.
    pub submitted_at: u64,
    /// Arrival order within the round.
    pub seq: u64,
}

/// A player taking part in the round, fixed when the round starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub player: PlayerId,
    pub team: Option<Team>,
}

/// The live round. Present only while the room is Playing or Scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundState {
    pub generation: u64,
    pub beatmap_hash: String,
    pub mods: Mods,
    pub speed_multiplier: f64,
    pub force_ar: Option<f64>,
    pub started_at: u64,
    pub participants: Vec<Participant>,
    pub results: Vec<SubmittedResult>,
    next_seq: u64,
    pub timed_out: bool,
}

impl RoundState {
    pub fn is_participant(&self, player: PlayerId) -> bool {
        self.participants.iter().any(|p| p.player == player)
    }

    pub fn result_of(&self, player: PlayerId) -> Option<&SubmittedResult> {
        self.results.iter().find(|r| r.player == player)
    }

    /// Every remaining participant has reported.
    pub fn is_complete(&self) -> bool {
        self.participants
            .iter()
            .all(|p| self.result_of(p.player).is_some())
    }

    /// Drops a participant who left, along with any result they sent.
    pub(crate) fn remove_participant(&mut self, player: PlayerId) {
        self.participants.retain(|p| p.player != player);
        self.results.retain(|r| r.player != player);
    }
}

/// The record of a finished round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub generation: u64,
    pub beatmap_hash: String,
    pub mods: Mods,
    pub win_condition: WinCondition,
    pub team_mode: TeamMode,
    pub started_at: u64,
    pub finished_at: u64,
    pub timed_out: bool,
    pub ranking: Ranking,
    pub winner: Option<Winner>,
}

/// Why a result was not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscardReason {
    /// No round is accepting results (late, or never started).
    NotPlaying,
    NotParticipant,
    WrongBeatmap,
}

/// What happened to a submitted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Submission {
    Accepted,
    /// The player already reported for this round; the first result stands.
    Duplicate,
    Discarded(DiscardReason),
}

/// Checks the start preconditions and returns the picked beatmap.
pub fn check_quorum(room: &Room) -> Result<String, RoomError> {
    let actual = room.active_players().count();
    if actual < MIN_PLAYERS {
        return Err(RoomError::NotEnoughPlayers {
            required: MIN_PLAYERS,
            actual,
        });
    }
    let Some(hash) = room.settings.beatmap_hash.clone() else {
        return Err(RoomError::NoBeatmapPicked);
    };
    if let Some(p) = room.active_players().find(|p| !p.is_ready) {
        return Err(RoomError::PlayerNotReady(p.id));
    }
    Ok(hash)
}

/// Idle → Countdown, on the host's start command.
pub fn begin_countdown(room: &mut Room, actor: PlayerId, deadline_ms: u64) -> Result<Effects, RoomError> {
    room.require_host(actor)?;
    if room.status.phase != RoundPhase::Idle {
        return Err(RoomError::RoundInProgress);
    }
    check_quorum(room)?;

    room.status.phase = RoundPhase::Countdown;
    room.status.generation += 1;
    room.status.countdown_deadline = Some(deadline_ms);

    let mut effects = Effects::with_event(RoomEvent::CountdownStarted { deadline_ms });
    effects.timer = TimerAction::StartCountdown {
        generation: room.status.generation,
    };
    Ok(effects)
}

/// Countdown → Idle.
pub(crate) fn abort_countdown(room: &mut Room, reason: &str, effects: &mut Effects) {
    debug_assert_eq!(room.status.phase, RoundPhase::Countdown);
    room.status.phase = RoundPhase::Idle;
    room.status.countdown_deadline = None;
    effects.events.push(RoomEvent::CountdownAborted {
        reason: reason.to_string(),
    });
    effects.timer = TimerAction::Cancel;
}

/// Countdown → Playing, when the countdown timer fires.
///
/// The start preconditions are checked again against the room as it is
/// now; if they no longer hold the countdown is aborted instead.
pub fn countdown_elapsed(room: &mut Room, generation: u64, now_ms: u64) -> Effects {
    if room.status.phase != RoundPhase::Countdown || room.status.generation != generation {
        return Effects::noop();
    }
    let mut effects = Effects::default();
    let beatmap_hash = match check_quorum(room) {
        Ok(hash) => hash,
        Err(e) => {
            abort_countdown(room, &e.to_string(), &mut effects);
            return effects;
        }
    };

    room.status.phase = RoundPhase::Playing;
    room.status.generation += 1;
    room.status.countdown_deadline = None;

    let mut participants = Vec::new();
    for p in room.players.iter_mut().filter(|p| !p.is_spectating) {
        p.state = PlayerState::Playing;
        participants.push(Participant {
            player: p.id,
            team: p.team,
        });
    }

    let settings = &room.settings;
    effects.events.push(RoomEvent::RoundStarted {
        beatmap_hash: beatmap_hash.clone(),
        mods: settings.mods.clone(),
        speed_multiplier: settings.speed_multiplier,
        force_ar: settings.force_ar,
        participants: participants.iter().map(|p| p.player).collect(),
    });
    room.status.current_round = Some(RoundState {
        generation: room.status.generation,
        beatmap_hash,
        mods: settings.mods.clone(),
        speed_multiplier: settings.speed_multiplier,
        force_ar: settings.force_ar,
        started_at: now_ms,
        participants,
        results: Vec::new(),
        next_seq: 0,
        timed_out: false,
    });
    effects.timer = TimerAction::StartRoundTimeout {
        generation: room.status.generation,
    };
    effects
}

/// Records a player's result for the live round.
///
/// Only the first result per participant counts. Results that arrive
/// outside Playing, for another beatmap, or from a non-participant are
/// discarded without error.
pub fn submit(
    room: &mut Room,
    player: PlayerId,
    beatmap_hash: &str,
    result: RawResult,
    now_ms: u64,
) -> (Submission, Effects) {
    let discarded = |reason| (Submission::Discarded(reason), Effects::noop());
    if room.status.phase != RoundPhase::Playing {
        return discarded(DiscardReason::NotPlaying);
    }
    let Some(round) = room.status.current_round.as_mut() else {
        return discarded(DiscardReason::NotPlaying);
    };
    if !round.is_participant(player) {
        return discarded(DiscardReason::NotParticipant);
    }
    if round.beatmap_hash != beatmap_hash {
        return discarded(DiscardReason::WrongBeatmap);
    }
    if round.result_of(player).is_some() {
        return (Submission::Duplicate, Effects::noop());
    }

    round.results.push(SubmittedResult {
        player,
        result,
        submitted_at: now_ms,
        seq: round.next_seq,
    });
    round.next_seq += 1;
    let complete = round.is_complete().then_some(round.generation);

    if let Some(p) = room.player_mut(player) {
        p.state = PlayerState::Finished;
    }
    let mut effects = Effects::with_event(RoomEvent::ResultReceived { player });
    effects.close_round = complete;
    (Submission::Accepted, effects)
}

/// Playing → Scoring, once every result is in or the round timed out.
pub fn enter_scoring(room: &mut Room, generation: u64, timed_out: bool) -> Effects {
    if room.status.phase != RoundPhase::Playing || room.status.generation != generation {
        return Effects::noop();
    }
    let Some(round) = room.status.current_round.as_mut() else {
        return Effects::noop();
    };
    round.timed_out = timed_out;
    room.status.phase = RoundPhase::Scoring;
    Effects {
        timer: TimerAction::Cancel,
        ..Effects::default()
    }
}

/// Scoring → Idle: ranks the results and resets the room for the next
/// round. Returns `None` if the room is not scoring this generation.
pub fn finish_round(
    room: &mut Room,
    generation: u64,
    params: &ScoringParams,
    now_ms: u64,
) -> (Option<RoundSummary>, Effects) {
    if room.status.phase != RoundPhase::Scoring || room.status.generation != generation {
        return (None, Effects::noop());
    }
    let Some(round) = room.status.current_round.take() else {
        return (None, Effects::noop());
    };

    let entries: Vec<Entry<'_>> = round
        .participants
        .iter()
        .map(|p| Entry {
            player: p.player,
            team: p.team,
            result: round.result_of(p.player),
        })
        .collect();
    let ranking = evaluate::evaluate(
        &entries,
        room.settings.win_condition,
        room.settings.team_mode,
        params,
    );
    let summary = RoundSummary {
        generation,
        beatmap_hash: round.beatmap_hash.clone(),
        mods: round.mods.clone(),
        win_condition: room.settings.win_condition,
        team_mode: room.settings.team_mode,
        started_at: round.started_at,
        finished_at: now_ms,
        timed_out: round.timed_out,
        winner: ranking.winner(),
        ranking,
    };

    reset_players(room);
    room.status.phase = RoundPhase::Idle;

    let mut effects = Effects::with_event(RoomEvent::RoundFinished {
        summary: summary.clone(),
    });
    effects.timer = TimerAction::Cancel;
    (Some(summary), effects)
}

/// Playing → Scoring → Idle as one change: ranks the round of
/// `generation` and resets the room. Nothing ever observes the room in
/// Scoring, so a round can't be left half closed.
pub fn close_round(
    room: &mut Room,
    generation: u64,
    timed_out: bool,
    params: &ScoringParams,
    now_ms: u64,
) -> (Option<RoundSummary>, Effects) {
    if room.status.phase == RoundPhase::Playing && enter_scoring(room, generation, timed_out).noop {
        return (None, Effects::noop());
    }
    finish_round(room, generation, params, now_ms)
}

/// Host abort: Countdown or Playing straight back to Idle, discarding any
/// partial results.
pub fn abort_round(room: &mut Room, actor: PlayerId) -> Result<Effects, RoomError> {
    room.require_host(actor)?;
    let mut effects = Effects::default();
    match room.status.phase {
        RoundPhase::Countdown => abort_countdown(room, "aborted by host", &mut effects),
        RoundPhase::Playing => {
            room.status.current_round = None;
            room.status.phase = RoundPhase::Idle;
            reset_players(room);
            effects.events.push(RoomEvent::RoundAborted { by: actor });
            effects.timer = TimerAction::Cancel;
        }
        RoundPhase::Idle | RoundPhase::Scoring => return Err(RoomError::RoundNotInProgress),
    }
    Ok(effects)
}

/// Clears readiness so the next round needs fresh confirmation.
fn reset_players(room: &mut Room) {
    for p in &mut room.players {
        p.is_ready = false;
        p.state = PlayerState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewRoom, Player, RoomSettings};
    use beatroom_protocol::{ChannelId, RoomId};

    const PARAMS: ScoringParams = ScoringParams {
        score_portion: 0.4,
        max_score: 1_000_000.0,
        max_accuracy: 1.0,
    };

    fn ready_room() -> Room {
        let mut room = Room::open(
            RoomId::new("ROUND2"),
            NewRoom {
                name: "r".into(),
                password: None,
                channel: ChannelId(1),
                host: Player::new(PlayerId(1), "host"),
                settings: RoomSettings {
                    beatmap_hash: Some("map".into()),
                    ..RoomSettings::default()
                },
            },
        );
        room.players.push(Player::new(PlayerId(2), "guest"));
        for p in &mut room.players {
            p.is_ready = true;
            p.state = PlayerState::Ready;
        }
        room
    }

    fn playing_room() -> Room {
        let mut room = ready_room();
        begin_countdown(&mut room, PlayerId(1), 5_000).unwrap();
        let generation = room.status.generation;
        countdown_elapsed(&mut room, generation, 5_000);
        room
    }

    #[test]
    fn test_quorum_reports_first_failure() {
        let mut room = ready_room();
        room.players[1].is_spectating = true;
        assert_eq!(
            check_quorum(&room).unwrap_err(),
            RoomError::NotEnoughPlayers { required: 2, actual: 1 }
        );
        room.players[1].is_spectating = false;
        room.settings.beatmap_hash = None;
        assert_eq!(check_quorum(&room).unwrap_err(), RoomError::NoBeatmapPicked);
        room.settings.beatmap_hash = Some("map".into());
        room.players[1].is_ready = false;
        assert_eq!(check_quorum(&room).unwrap_err(), RoomError::PlayerNotReady(PlayerId(2)));
    }

    #[test]
    fn test_spectators_do_not_need_to_ready() {
        let mut room = ready_room();
        let mut spectator = Player::new(PlayerId(3), "watcher");
        spectator.is_spectating = true;
        room.players.push(spectator);
        assert!(check_quorum(&room).is_ok());
    }

    #[test]
    fn test_begin_countdown_requires_host() {
        let mut room = ready_room();
        assert_eq!(
            begin_countdown(&mut room, PlayerId(2), 1).unwrap_err(),
            RoomError::NotHost(PlayerId(2))
        );
        assert_eq!(room.status.phase, RoundPhase::Idle);
    }

    #[test]
    fn test_countdown_to_playing_snapshots_participants() {
        let room = playing_room();
        assert_eq!(room.status.phase, RoundPhase::Playing);
        let round = room.status.current_round.as_ref().unwrap();
        assert_eq!(round.participants.len(), 2);
        assert!(room.players.iter().all(|p| p.state == PlayerState::Playing));
        assert!(room.check_invariants().is_ok());
    }

    #[test]
    fn test_stale_countdown_is_ignored() {
        let mut room = ready_room();
        begin_countdown(&mut room, PlayerId(1), 5_000).unwrap();
        let stale = room.status.generation - 1;
        let effects = countdown_elapsed(&mut room, stale, 5_000);
        assert!(effects.noop);
        assert_eq!(room.status.phase, RoundPhase::Countdown);
    }

    #[test]
    fn test_countdown_aborts_when_quorum_lost() {
        let mut room = ready_room();
        begin_countdown(&mut room, PlayerId(1), 5_000).unwrap();
        room.players[0].is_ready = false;
        let generation = room.status.generation;
        let effects = countdown_elapsed(&mut room, generation, 5_000);
        assert_eq!(room.status.phase, RoundPhase::Idle);
        assert_eq!(room.status.countdown_deadline, None);
        assert_eq!(effects.timer, TimerAction::Cancel);
    }

    #[test]
    fn test_duplicate_submission_keeps_first() {
        let mut room = playing_room();
        let first = RawResult { score: 100, ..RawResult::default() };
        let second = RawResult { score: 999, ..RawResult::default() };
        assert_eq!(submit(&mut room, PlayerId(1), "map", first, 10).0, Submission::Accepted);
        assert_eq!(submit(&mut room, PlayerId(1), "map", second, 11).0, Submission::Duplicate);
        let round = room.status.current_round.as_ref().unwrap();
        assert_eq!(round.result_of(PlayerId(1)).unwrap().result.score, 100);
    }

    #[test]
    fn test_submission_discards() {
        let mut room = playing_room();
        assert_eq!(
            submit(&mut room, PlayerId(1), "other", RawResult::default(), 1).0,
            Submission::Discarded(DiscardReason::WrongBeatmap)
        );
        assert_eq!(
            submit(&mut room, PlayerId(9), "map", RawResult::default(), 1).0,
            Submission::Discarded(DiscardReason::NotParticipant)
        );
        let mut idle = ready_room();
        assert_eq!(
            submit(&mut idle, PlayerId(1), "map", RawResult::default(), 1).0,
            Submission::Discarded(DiscardReason::NotPlaying)
        );
    }

    #[test]
    fn test_last_submission_closes_round() {
        let mut room = playing_room();
        let (_, effects) = submit(&mut room, PlayerId(1), "map", RawResult::default(), 1);
        assert_eq!(effects.close_round, None);
        let (_, effects) = submit(&mut room, PlayerId(2), "map", RawResult::default(), 2);
        assert_eq!(effects.close_round, Some(room.status.generation));
    }

    #[test]
    fn test_scoring_to_idle_resets_readiness() {
        let mut room = playing_room();
        let generation = room.status.generation;
        submit(&mut room, PlayerId(1), "map", RawResult { score: 950_000, ..RawResult::default() }, 1);
        submit(&mut room, PlayerId(2), "map", RawResult { score: 980_000, ..RawResult::default() }, 2);
        enter_scoring(&mut room, generation, false);
        assert_eq!(room.status.phase, RoundPhase::Scoring);
        assert_eq!(
            submit(&mut room, PlayerId(1), "map", RawResult::default(), 3).0,
            Submission::Discarded(DiscardReason::NotPlaying)
        );

        let (summary, _) = finish_round(&mut room, generation, &PARAMS, 4);
        let summary = summary.unwrap();
        assert_eq!(summary.ranking.order(), vec![PlayerId(2), PlayerId(1)]);
        assert_eq!(room.status.phase, RoundPhase::Idle);
        assert!(room.status.current_round.is_none());
        assert!(room.players.iter().all(|p| !p.is_ready && p.state == PlayerState::Idle));
        assert!(room.check_invariants().is_ok());
    }

    #[test]
    fn test_close_round_goes_straight_to_idle() {
        let mut room = playing_room();
        let generation = room.status.generation;
        submit(&mut room, PlayerId(2), "map", RawResult { score: 700_000, ..RawResult::default() }, 1);

        let (summary, effects) = close_round(&mut room, generation, true, &PARAMS, 9);
        let summary = summary.unwrap();
        assert!(summary.timed_out);
        assert_eq!(summary.ranking.order(), vec![PlayerId(2), PlayerId(1)]);
        assert_eq!(effects.timer, TimerAction::Cancel);
        assert_eq!(room.status.phase, RoundPhase::Idle);
        assert!(room.status.current_round.is_none());

        // A second close for the same round changes nothing.
        let (again, effects) = close_round(&mut room, generation, false, &PARAMS, 10);
        assert!(again.is_none());
        assert!(effects.noop);
    }

    #[test]
    fn test_abort_round() {
        let mut room = playing_room();
        assert_eq!(
            abort_round(&mut room, PlayerId(2)).unwrap_err(),
            RoomError::NotHost(PlayerId(2))
        );
        let effects = abort_round(&mut room, PlayerId(1)).unwrap();
        assert_eq!(room.status.phase, RoundPhase::Idle);
        assert!(room.status.current_round.is_none());
        assert!(matches!(effects.events[0], RoomEvent::RoundAborted { by } if by == PlayerId(1)));
        assert_eq!(
            abort_round(&mut room, PlayerId(1)).unwrap_err(),
            RoomError::RoundNotInProgress
        );
    }
}
