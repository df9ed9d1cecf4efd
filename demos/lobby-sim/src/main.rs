use std::time::Duration;

use beatroom::prelude::*;
use rand::Rng;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// ---------------------------------------------------------------------------
// A scripted team match
// ---------------------------------------------------------------------------

const BEATMAP: &str = "8e1b0d3f";

const ROSTER: [(u64, &str); 4] = [(1, "alice"), (2, "bob"), (3, "carol"), (4, "dave")];

fn random_result(rng: &mut impl Rng) -> RawResult {
    let score = rng.random_range(600_000..1_000_000);
    RawResult {
        score,
        max_combo: rng.random_range(300..900),
        misses: rng.random_range(0..12),
        accuracy: rng.random_range(0.85..1.0),
        ..RawResult::default()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = LobbyConfig {
        countdown: Duration::from_secs(1),
        ..LobbyConfig::default()
    };
    let lobby = Lobby::builder()
        .config(config)
        .build(MemoryStore::new(), LogNotifier::new(), StandardRules);

    let (host_id, host_name) = ROSTER[0];
    let settings = RoomSettings {
        team_mode: TeamMode::TeamVs,
        win_condition: WinCondition::ScoreV2,
        ..RoomSettings::default()
    };
    let room = lobby
        .create_room(Player::new(PlayerId(host_id), host_name), "friday night", None, settings)
        .await?;
    for (id, name) in &ROSTER[1..] {
        lobby.join(&room.id, Player::new(PlayerId(*id), *name), None).await?;
    }

    lobby
        .update_settings(&room.id, room.host, SettingsChange::new().beatmap(BEATMAP))
        .await?;
    for (id, _) in ROSTER {
        lobby.set_ready(&room.id, PlayerId(id), true).await?;
    }

    lobby.start_round(&room.id, room.host).await?;
    tokio::time::sleep(lobby.config().countdown + Duration::from_millis(100)).await;

    let mut rng = rand::rng();
    for (id, name) in ROSTER {
        let result = random_result(&mut rng);
        info!(player = name, score = result.score, accuracy = result.accuracy, "submitting");
        lobby
            .submit_result(&room.id, PlayerId(id), BEATMAP, result)
            .await?;
    }

    let room = lobby.room(&room.id).await?;
    info!(room = %room.id, phase = ?room.status.phase, "match over");

    for (id, _) in ROSTER {
        lobby.leave(&room.id, PlayerId(id)).await?;
    }
    Ok(())
}
