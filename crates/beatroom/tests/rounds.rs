//! Round lifecycle through the lobby, on a paused clock so countdowns and
//! timeouts fire exactly when the test says.

mod common;

use std::time::Duration;

use beatroom::prelude::*;
use common::*;
use tokio::time::{sleep, timeout};

const PAST_COUNTDOWN: Duration = Duration::from_secs(6);

async fn phase<S: RoomStore, B: BeatmapRules>(lobby: &TestLobby<B, S>, room: &Room) -> RoundPhase {
    lobby.room(&room.id).await.unwrap().status.phase
}

/// Starts the round and lets the countdown run out.
async fn play<S: RoomStore, B: BeatmapRules>(lobby: &TestLobby<B, S>, room: &Room) {
    lobby.start_round(&room.id, room.host).await.unwrap();
    sleep(PAST_COUNTDOWN).await;
    assert_eq!(phase(lobby, room).await, RoundPhase::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_head_to_head_round_end_to_end() {
    let (lobby, notifier) = lobby();
    let room = room_with(&lobby, 2, RoomSettings::default()).await;
    ready_all(&lobby, &room).await;

    let started = lobby.start_round(&room.id, PlayerId(1)).await.unwrap();
    assert_eq!(started.status.phase, RoundPhase::Countdown);
    assert_eq!(started.status.countdown_deadline, Some(5_000));
    let timer = lobby.pending_timer(&room.id).unwrap();
    assert_eq!(timer.kind, TimerKind::Countdown);

    sleep(PAST_COUNTDOWN).await;
    assert_eq!(phase(&lobby, &room).await, RoundPhase::Playing);
    assert_eq!(lobby.pending_timer(&room.id).unwrap().kind, TimerKind::RoundTimeout);
    assert!(notifier.events().contains(&RoomEvent::RoundStarted {
        beatmap_hash: MAP.into(),
        mods: Mods::new(),
        speed_multiplier: 1.0,
        force_ar: None,
        participants: vec![PlayerId(1), PlayerId(2)],
    }));

    let first = lobby
        .submit_result(&room.id, PlayerId(1), MAP, score(950_000, 0.97))
        .await
        .unwrap();
    assert_eq!(first, Submission::Accepted);
    assert_eq!(phase(&lobby, &room).await, RoundPhase::Playing);

    lobby
        .submit_result(&room.id, PlayerId(2), MAP, score(980_000, 0.95))
        .await
        .unwrap();

    let after = lobby.room(&room.id).await.unwrap();
    assert_eq!(after.status.phase, RoundPhase::Idle);
    assert!(after.status.current_round.is_none());
    assert!(after.players.iter().all(|p| !p.is_ready));
    assert!(lobby.pending_timer(&room.id).is_none());

    let summaries = notifier.summaries();
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert!(!summary.timed_out);
    assert_eq!(summary.ranking.order(), vec![PlayerId(2), PlayerId(1)]);
    assert_eq!(summary.winner, Some(Winner::Player(PlayerId(2))));
}

#[tokio::test(start_paused = true)]
async fn test_team_vs_score_v2_uses_beatmap_max_score() {
    let (lobby, notifier) = lobby_with_rules(FixedRules {
        length: None,
        max_score: Some(600_000.0),
    });
    let settings = RoomSettings {
        team_mode: TeamMode::TeamVs,
        win_condition: WinCondition::ScoreV2,
        score_portion: 0.5,
        ..RoomSettings::default()
    };
    // Joins alternate teams: Red 1, 3 and Blue 2, 4.
    let room = room_with(&lobby, 4, settings).await;
    ready_all(&lobby, &room).await;
    play(&lobby, &room).await;

    for (id, points, accuracy) in [
        (1, 500_000, 0.90),
        (3, 480_000, 0.88),
        (2, 510_000, 0.85),
        (4, 490_000, 0.91),
    ] {
        lobby
            .submit_result(&room.id, PlayerId(id), MAP, score(points, accuracy))
            .await
            .unwrap();
    }

    let summary = notifier.summaries().pop().unwrap();
    assert_eq!(summary.winner, Some(Winner::Team(Team::Blue)));
    let blue = summary.ranking.teams[0].value.unwrap();
    let red = summary.ranking.teams[1].value.unwrap();
    assert!((blue - 856_666.67).abs() < 1.0, "blue = {blue}");
    assert!((red - 853_333.33).abs() < 1.0, "red = {red}");
    assert_eq!(summary.ranking.order()[0], PlayerId(1));
}

#[tokio::test(start_paused = true)]
async fn test_start_preconditions() {
    let (lobby, _) = lobby();
    let room = room_with(&lobby, 2, RoomSettings::default()).await;

    let err = lobby.start_round(&room.id, PlayerId(2)).await.unwrap_err();
    assert!(matches!(err, LobbyError::Room(RoomError::NotHost(PlayerId(2)))));

    let err = lobby.start_round(&room.id, PlayerId(1)).await.unwrap_err();
    assert!(matches!(err, LobbyError::Room(RoomError::NoBeatmapPicked)));

    lobby
        .update_settings(&room.id, PlayerId(1), SettingsChange::new().beatmap(MAP))
        .await
        .unwrap();
    lobby.set_ready(&room.id, PlayerId(1), true).await.unwrap();
    let err = lobby.start_round(&room.id, PlayerId(1)).await.unwrap_err();
    assert!(matches!(err, LobbyError::Room(RoomError::PlayerNotReady(PlayerId(2)))));

    // A spectator doesn't count towards the quorum.
    lobby.set_spectating(&room.id, PlayerId(2), true).await.unwrap();
    let err = lobby.start_round(&room.id, PlayerId(1)).await.unwrap_err();
    assert!(matches!(
        err,
        LobbyError::Room(RoomError::NotEnoughPlayers { required: 2, actual: 1 })
    ));
    assert!(lobby.pending_timer(&room.id).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_join_during_countdown_aborts_it() {
    let (lobby, notifier) = lobby();
    let room = room_with(&lobby, 2, RoomSettings::default()).await;
    ready_all(&lobby, &room).await;
    lobby.start_round(&room.id, PlayerId(1)).await.unwrap();

    sleep(Duration::from_secs(2)).await;
    let joined = lobby.join(&room.id, player(3), None).await.unwrap();
    assert_eq!(joined.status.phase, RoundPhase::Idle);
    assert_eq!(joined.status.countdown_deadline, None);
    assert!(lobby.pending_timer(&room.id).is_none());

    // The cancelled countdown never starts the round.
    sleep(Duration::from_secs(10)).await;
    assert_eq!(phase(&lobby, &room).await, RoundPhase::Idle);
    let events = notifier.events();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, RoomEvent::CountdownAborted { .. }))
    );
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, RoomEvent::RoundStarted { .. }))
    );
}

fn round_started(notifier: &RecordingNotifier) -> bool {
    notifier
        .events()
        .iter()
        .any(|e| matches!(e, RoomEvent::RoundStarted { .. }))
}

#[tokio::test(start_paused = true)]
async fn test_leave_during_countdown_aborts_it() {
    let (lobby, notifier) = lobby();
    let room = room_with(&lobby, 3, RoomSettings::default()).await;
    ready_all(&lobby, &room).await;

    lobby.start_round(&room.id, PlayerId(1)).await.unwrap();
    sleep(Duration::from_secs(2)).await;
    let left = lobby.leave(&room.id, PlayerId(3)).await.unwrap().unwrap();
    assert_eq!(left.status.phase, RoundPhase::Idle);
    assert_eq!(left.status.countdown_deadline, None);
    assert!(lobby.pending_timer(&room.id).is_none());

    // The host leaving hands the room over and still stops the countdown.
    lobby.start_round(&room.id, PlayerId(1)).await.unwrap();
    sleep(Duration::from_secs(2)).await;
    let left = lobby.leave(&room.id, PlayerId(1)).await.unwrap().unwrap();
    assert_eq!(left.host, PlayerId(2));
    assert_eq!(left.status.phase, RoundPhase::Idle);
    assert_eq!(left.status.countdown_deadline, None);
    assert!(lobby.pending_timer(&room.id).is_none());

    sleep(Duration::from_secs(10)).await;
    assert_eq!(phase(&lobby, &room).await, RoundPhase::Idle);
    assert!(!round_started(&notifier));
    let aborted = notifier
        .events()
        .iter()
        .filter(|e| matches!(e, RoomEvent::CountdownAborted { .. }))
        .count();
    assert_eq!(aborted, 2);
}

#[tokio::test(start_paused = true)]
async fn test_kick_during_countdown_aborts_it() {
    let (lobby, notifier) = lobby();
    let room = room_with(&lobby, 3, RoomSettings::default()).await;
    ready_all(&lobby, &room).await;
    lobby.start_round(&room.id, PlayerId(1)).await.unwrap();

    sleep(Duration::from_secs(2)).await;
    let kicked = lobby.kick(&room.id, PlayerId(1), PlayerId(3)).await.unwrap();
    assert_eq!(kicked.status.phase, RoundPhase::Idle);
    assert_eq!(kicked.status.countdown_deadline, None);
    assert!(lobby.pending_timer(&room.id).is_none());

    sleep(Duration::from_secs(10)).await;
    assert_eq!(phase(&lobby, &room).await, RoundPhase::Idle);
    assert!(!round_started(&notifier));
}

#[tokio::test(start_paused = true)]
async fn test_restarted_countdown_ignores_the_old_deadline() {
    let (lobby, _) = lobby();
    let room = room_with(&lobby, 2, RoomSettings::default()).await;
    ready_all(&lobby, &room).await;

    lobby.start_round(&room.id, PlayerId(1)).await.unwrap();
    sleep(Duration::from_secs(3)).await;
    lobby.abort_round(&room.id, PlayerId(1)).await.unwrap();
    lobby.start_round(&room.id, PlayerId(1)).await.unwrap();

    // Past the first deadline, short of the second.
    sleep(Duration::from_secs(3)).await;
    assert_eq!(phase(&lobby, &room).await, RoundPhase::Countdown);
    sleep(Duration::from_secs(3)).await;
    assert_eq!(phase(&lobby, &room).await, RoundPhase::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_settings_change_during_countdown_aborts_it() {
    let (lobby, _) = lobby();
    let room = room_with(&lobby, 2, RoomSettings::default()).await;
    ready_all(&lobby, &room).await;
    lobby.start_round(&room.id, PlayerId(1)).await.unwrap();

    let room = lobby
        .update_settings(&room.id, PlayerId(1), SettingsChange::new().speed_multiplier(1.5))
        .await
        .unwrap();
    assert_eq!(room.status.phase, RoundPhase::Idle);
    assert!(lobby.pending_timer(&room.id).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_submissions_that_are_not_recorded() {
    let (lobby, _) = lobby();
    let room = room_with(&lobby, 3, RoomSettings::default()).await;

    let outcome = lobby
        .submit_result(&room.id, PlayerId(1), MAP, score(1, 0.5))
        .await
        .unwrap();
    assert_eq!(outcome, Submission::Discarded(DiscardReason::NotPlaying));

    let missing = RoomId::new("NOROOM");
    let err = lobby
        .submit_result(&missing, PlayerId(1), MAP, score(1, 0.5))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    ready_all(&lobby, &room).await;
    play(&lobby, &room).await;

    let outcome = lobby
        .submit_result(&room.id, PlayerId(1), "other-map", score(1, 0.5))
        .await
        .unwrap();
    assert_eq!(outcome, Submission::Discarded(DiscardReason::WrongBeatmap));

    let outcome = lobby
        .submit_result(&room.id, PlayerId(9), MAP, score(1, 0.5))
        .await
        .unwrap();
    assert_eq!(outcome, Submission::Discarded(DiscardReason::NotParticipant));

    lobby
        .submit_result(&room.id, PlayerId(1), MAP, score(700_000, 0.9))
        .await
        .unwrap();
    let outcome = lobby
        .submit_result(&room.id, PlayerId(1), MAP, score(900_000, 0.99))
        .await
        .unwrap();
    assert_eq!(outcome, Submission::Duplicate);

    let current = lobby.room(&room.id).await.unwrap();
    let round = current.status.current_round.unwrap();
    assert_eq!(round.results.len(), 1);
    assert_eq!(round.result_of(PlayerId(1)).unwrap().result.score, 700_000);
}

#[tokio::test(start_paused = true)]
async fn test_round_timeout_scores_what_arrived() {
    // 60s beatmap at 1.0x plus 30s grace.
    let (lobby, notifier) = lobby_with_rules(FixedRules {
        length: Some(Duration::from_secs(60)),
        max_score: None,
    });
    let room = room_with(&lobby, 3, RoomSettings::default()).await;
    ready_all(&lobby, &room).await;
    play(&lobby, &room).await;

    let timer = lobby.pending_timer(&room.id).unwrap();
    assert_eq!(timer.kind, TimerKind::RoundTimeout);
    assert!(timer.remaining <= Duration::from_secs(90));
    assert!(timer.remaining > Duration::from_secs(80));

    lobby
        .submit_result(&room.id, PlayerId(3), MAP, score(400_000, 0.8))
        .await
        .unwrap();
    lobby
        .submit_result(&room.id, PlayerId(1), MAP, score(600_000, 0.9))
        .await
        .unwrap();

    sleep(Duration::from_secs(88)).await;
    assert_eq!(phase(&lobby, &room).await, RoundPhase::Playing);
    sleep(Duration::from_secs(2)).await;
    assert_eq!(phase(&lobby, &room).await, RoundPhase::Idle);

    let summary = notifier.summaries().pop().unwrap();
    assert!(summary.timed_out);
    assert_eq!(
        summary.ranking.order(),
        vec![PlayerId(1), PlayerId(3), PlayerId(2)]
    );
    let missing = summary.ranking.players.last().unwrap();
    assert_eq!(missing.value, None);
    assert_eq!(missing.submitted_at, None);

    // A result after scoring finds the room idle.
    let late = lobby
        .submit_result(&room.id, PlayerId(2), MAP, score(990_000, 1.0))
        .await
        .unwrap();
    assert_eq!(late, Submission::Discarded(DiscardReason::NotPlaying));
}

#[tokio::test(start_paused = true)]
async fn test_host_abort_discards_partial_results() {
    let (lobby, notifier) = lobby();
    let room = room_with(&lobby, 2, RoomSettings::default()).await;

    let err = lobby.abort_round(&room.id, PlayerId(1)).await.unwrap_err();
    assert!(matches!(err, LobbyError::Room(RoomError::RoundNotInProgress)));

    ready_all(&lobby, &room).await;
    play(&lobby, &room).await;
    lobby
        .submit_result(&room.id, PlayerId(2), MAP, score(500_000, 0.9))
        .await
        .unwrap();

    let err = lobby.abort_round(&room.id, PlayerId(2)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let aborted = lobby.abort_round(&room.id, PlayerId(1)).await.unwrap();
    assert_eq!(aborted.status.phase, RoundPhase::Idle);
    assert!(aborted.status.current_round.is_none());
    assert!(lobby.pending_timer(&room.id).is_none());
    assert!(notifier.events().contains(&RoomEvent::RoundAborted { by: PlayerId(1) }));
    assert!(notifier.summaries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_kicking_the_last_holdout_closes_the_round() {
    let (lobby, notifier) = lobby();
    let room = room_with(&lobby, 3, RoomSettings::default()).await;
    ready_all(&lobby, &room).await;
    play(&lobby, &room).await;

    lobby
        .submit_result(&room.id, PlayerId(1), MAP, score(800_000, 0.95))
        .await
        .unwrap();
    lobby
        .submit_result(&room.id, PlayerId(2), MAP, score(850_000, 0.93))
        .await
        .unwrap();
    assert_eq!(phase(&lobby, &room).await, RoundPhase::Playing);

    lobby.kick(&room.id, PlayerId(1), PlayerId(3)).await.unwrap();
    assert_eq!(phase(&lobby, &room).await, RoundPhase::Idle);

    let summary = notifier.summaries().pop().unwrap();
    assert_eq!(summary.ranking.order(), vec![PlayerId(2), PlayerId(1)]);
    assert!(lobby.pending_timer(&room.id).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_everyone_leaving_mid_round_deletes_the_room() {
    let (lobby, notifier) = lobby();
    let room = room_with(&lobby, 2, RoomSettings::default()).await;
    ready_all(&lobby, &room).await;
    play(&lobby, &room).await;

    lobby.leave(&room.id, PlayerId(1)).await.unwrap();
    assert!(lobby.leave(&room.id, PlayerId(2)).await.unwrap().is_none());
    assert!(lobby.pending_timer(&room.id).is_none());

    // Nothing fires for the deleted room.
    sleep(Duration::from_secs(700)).await;
    assert!(notifier.summaries().is_empty());
    assert_eq!(notifier.deleted(), vec![room.channel]);
}

#[tokio::test(start_paused = true)]
async fn test_final_submission_dropped_after_its_write_still_ends_the_round() {
    let (lobby, store, _) = slow_lobby();
    let room = room_with(&lobby, 2, RoomSettings::default()).await;
    ready_all(&lobby, &room).await;
    play(&lobby, &room).await;
    lobby
        .submit_result(&room.id, PlayerId(1), MAP, score(900_000, 0.96))
        .await
        .unwrap();

    store.stall_next_write(Stall::AfterWrite, Duration::from_millis(50));
    let last = lobby.submit_result(&room.id, PlayerId(2), MAP, score(920_000, 0.94));
    assert!(timeout(Duration::from_millis(25), last).await.is_err());

    // The write that completed the round also scored it.
    let after = lobby.room(&room.id).await.unwrap();
    assert_eq!(after.status.phase, RoundPhase::Idle);
    assert!(after.status.current_round.is_none());
    assert!(after.players.iter().all(|p| !p.is_ready));

    // The leftover round timeout finds nothing to close.
    sleep(Duration::from_secs(700)).await;
    assert_eq!(phase(&lobby, &room).await, RoundPhase::Idle);
    ready_all(&lobby, &room).await;
    play(&lobby, &room).await;
}

#[tokio::test(start_paused = true)]
async fn test_final_submission_dropped_before_its_write_leaves_the_round_open() {
    let (lobby, store, notifier) = slow_lobby();
    let room = room_with(&lobby, 2, RoomSettings::default()).await;
    ready_all(&lobby, &room).await;
    play(&lobby, &room).await;
    lobby
        .submit_result(&room.id, PlayerId(1), MAP, score(900_000, 0.96))
        .await
        .unwrap();

    store.stall_next_write(Stall::BeforeWrite, Duration::from_millis(50));
    let last = lobby.submit_result(&room.id, PlayerId(2), MAP, score(920_000, 0.94));
    assert!(timeout(Duration::from_millis(25), last).await.is_err());

    assert_eq!(phase(&lobby, &room).await, RoundPhase::Playing);
    assert_eq!(lobby.pending_timer(&room.id).unwrap().kind, TimerKind::RoundTimeout);

    let again = lobby
        .submit_result(&room.id, PlayerId(2), MAP, score(920_000, 0.94))
        .await
        .unwrap();
    assert_eq!(again, Submission::Accepted);
    assert_eq!(phase(&lobby, &room).await, RoundPhase::Idle);
    assert!(lobby.pending_timer(&room.id).is_none());
    let summary = notifier.summaries().pop().unwrap();
    assert_eq!(summary.ranking.order(), vec![PlayerId(2), PlayerId(1)]);
}
