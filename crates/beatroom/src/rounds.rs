//! Driving the round state machine: start, abort, results, and the
//! countdown and round timers.
//!
//! Timers are keyed by room. Each timer carries the room's `generation`
//! at the time it was scheduled; when it fires it goes through the same
//! compare-and-swap cycle as any command and does nothing if the room has
//! moved on. A timer that fires for a deleted room is ignored.

use std::time::Duration;

use beatroom_protocol::{PlayerId, RoomId};
use beatroom_room::{
    BeatmapRules, Effects, RawResult, Room, RoomError, RoomStore, RoundSummary, ScoringParams,
    Submission, round,
};
use beatroom_timer::TimerKind;
use tracing::{debug, info, warn};

use crate::{Lobby, LobbyError, Notifier};

impl<S, N, B> Lobby<S, N, B>
where
    S: RoomStore,
    N: Notifier,
    B: BeatmapRules,
{
    /// Starts the countdown to a new round. Host only; every
    /// non-spectator must be ready and a beatmap must be picked.
    pub async fn start_round(&self, room_id: &RoomId, actor: PlayerId) -> Result<Room, LobbyError> {
        let clock = &self.inner.clock;
        let countdown = self.inner.config.countdown;
        let done = self
            .apply(room_id, |room, _| {
                Ok(((), round::begin_countdown(room, actor, clock.after_ms(countdown))?))
            })
            .await?;
        self.committed_room(room_id, done.room)
    }

    /// Host abort of a countdown or a round in play.
    pub async fn abort_round(&self, room_id: &RoomId, actor: PlayerId) -> Result<Room, LobbyError> {
        let done = self
            .apply(room_id, |room, _| Ok(((), round::abort_round(room, actor)?)))
            .await?;
        self.committed_room(room_id, done.room)
    }

    /// Records a player's result for the round in play.
    ///
    /// Late, duplicate or misdirected results are reported through the
    /// returned [`Submission`], not as errors. The result that completes
    /// the round also scores it, in the same write.
    pub async fn submit_result(
        &self,
        room_id: &RoomId,
        player: PlayerId,
        beatmap_hash: &str,
        result: RawResult,
    ) -> Result<Submission, LobbyError> {
        let now = self.inner.clock.now_ms();
        let done = self
            .apply(room_id, |room, _| {
                let (submission, mut effects) =
                    round::submit(room, player, beatmap_hash, result.clone(), now);
                let summary = self.settle_round(room, &mut effects, now);
                Ok(((submission, summary), effects))
            })
            .await?;
        let (submission, summary) = done.value;
        if submission != Submission::Accepted {
            debug!(%room_id, %player, outcome = ?submission, "result not recorded");
        }
        self.log_summary(room_id, summary.as_ref());
        Ok(submission)
    }

    /// Scores the round an operation reported complete, on the same copy
    /// of the room, so the write that completes a round also ends it.
    pub(crate) fn settle_round(
        &self,
        room: &mut Room,
        effects: &mut Effects,
        now: u64,
    ) -> Option<RoundSummary> {
        let generation = effects.close_round.take()?;
        let params = self.scoring_params(room)?;
        let (summary, closed) = round::close_round(room, generation, false, &params, now);
        effects.absorb(closed);
        summary
    }

    pub(crate) fn log_summary(&self, room_id: &RoomId, summary: Option<&RoundSummary>) {
        if let Some(summary) = summary {
            info!(
                %room_id,
                generation = summary.generation,
                timed_out = summary.timed_out,
                winner = ?summary.winner,
                "round scored"
            );
        }
    }

    /// Ends the round of `generation` when its timeout fires. Returns
    /// `None` if that round is already over.
    async fn close_timed_out(
        &self,
        room_id: &RoomId,
        generation: u64,
    ) -> Result<Option<RoundSummary>, LobbyError> {
        let now = self.inner.clock.now_ms();
        let done = self
            .apply(room_id, |room, _| {
                let Some(params) = self.scoring_params(room) else {
                    return Ok((None, Effects::noop()));
                };
                Ok(round::close_round(room, generation, true, &params, now))
            })
            .await?;
        self.log_summary(room_id, done.value.as_ref());
        Ok(done.value)
    }

    /// Normalization for the round in `room`, or `None` if no round is in
    /// progress.
    fn scoring_params(&self, room: &Room) -> Option<ScoringParams> {
        let round = room.status.current_round.as_ref()?;
        let baseline = self.inner.config.normalization;
        Some(ScoringParams {
            score_portion: room.settings.score_portion,
            max_score: self
                .inner
                .rules
                .max_score(&round.beatmap_hash, &round.mods)
                .unwrap_or(baseline.max_score),
            max_accuracy: baseline.max_accuracy,
        })
    }

    /// How long the round in `room` may run: the beatmap's length at the
    /// round's speed plus the grace period, or the configured timeout.
    pub(crate) fn round_timeout(&self, room: &Room) -> Duration {
        let config = &self.inner.config;
        room.status
            .current_round
            .as_ref()
            .and_then(|round| {
                let length = self.inner.rules.beatmap_length(&round.beatmap_hash)?;
                Some(length.div_f64(round.speed_multiplier) + config.round_grace)
            })
            .unwrap_or(config.round_timeout)
    }

    pub(crate) fn schedule_countdown(&self, room_id: &RoomId, generation: u64) {
        let weak = self.downgrade();
        let key = room_id.clone();
        self.inner.timers.schedule(
            room_id.clone(),
            TimerKind::Countdown,
            generation,
            self.inner.config.countdown,
            async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let lobby = Lobby { inner };
                lobby.countdown_elapsed(&key, generation).await;
            },
        );
    }

    pub(crate) fn schedule_round_timeout(&self, room_id: &RoomId, generation: u64, timeout: Duration) {
        let weak = self.downgrade();
        let key = room_id.clone();
        self.inner.timers.schedule(
            room_id.clone(),
            TimerKind::RoundTimeout,
            generation,
            timeout,
            async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let lobby = Lobby { inner };
                lobby.round_timed_out(&key, generation).await;
            },
        );
    }

    async fn countdown_elapsed(&self, room_id: &RoomId, generation: u64) {
        let now = self.inner.clock.now_ms();
        let outcome = self
            .apply(room_id, |room, _| {
                Ok(((), round::countdown_elapsed(room, generation, now)))
            })
            .await;
        match outcome {
            Ok(_) => {}
            Err(LobbyError::Room(RoomError::RoomNotFound(_))) => {
                debug!(%room_id, generation, "countdown fired for a deleted room");
            }
            Err(e) => warn!(%room_id, generation, error = %e, "countdown transition failed"),
        }
    }

    async fn round_timed_out(&self, room_id: &RoomId, generation: u64) {
        info!(%room_id, generation, "round timed out");
        match self.close_timed_out(room_id, generation).await {
            Ok(_) => {}
            Err(LobbyError::Room(RoomError::RoomNotFound(_))) => {
                debug!(%room_id, generation, "round timeout fired for a deleted room");
            }
            Err(e) => warn!(%room_id, generation, error = %e, "failed to close timed out round"),
        }
    }
}
