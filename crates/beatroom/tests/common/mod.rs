//! Shared fixtures for the lobby integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use beatroom::prelude::*;
use beatroom_room::{NewRoom, StoreError};

/// A notifier that remembers everything it was asked to do.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    state: Arc<Mutex<Recorded>>,
    next_channel: Arc<AtomicU64>,
}

#[derive(Default)]
struct Recorded {
    events: Vec<(ChannelId, RoomEvent)>,
    titles: Vec<(ChannelId, String)>,
    deleted: Vec<ChannelId>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<RoomEvent> {
        self.state.lock().unwrap().events.iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn events_for(&self, channel: ChannelId) -> Vec<RoomEvent> {
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn titles(&self) -> Vec<(ChannelId, String)> {
        self.state.lock().unwrap().titles.clone()
    }

    pub fn deleted(&self) -> Vec<ChannelId> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// The summaries of every finished round, oldest first.
    pub fn summaries(&self) -> Vec<RoundSummary> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RoomEvent::RoundFinished { summary } => Some(summary),
                _ => None,
            })
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    async fn create_channel(&self, title: &str) -> Result<ChannelId, NotifyError> {
        let channel = ChannelId(self.next_channel.fetch_add(1, Ordering::Relaxed) + 100);
        self.state.lock().unwrap().titles.push((channel, title.to_string()));
        Ok(channel)
    }

    async fn update_channel(&self, channel: ChannelId, title: &str) -> Result<(), NotifyError> {
        self.state.lock().unwrap().titles.push((channel, title.to_string()));
        Ok(())
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), NotifyError> {
        self.state.lock().unwrap().deleted.push(channel);
        Ok(())
    }

    async fn publish(&self, channel: ChannelId, event: &RoomEvent) -> Result<(), NotifyError> {
        self.state.lock().unwrap().events.push((channel, event.clone()));
        Ok(())
    }
}

/// Standard mod rules plus fixed beatmap numbers.
#[derive(Clone, Copy)]
pub struct FixedRules {
    pub length: Option<Duration>,
    pub max_score: Option<f64>,
}

impl BeatmapRules for FixedRules {
    fn check_mods(&self, mods: &Mods, speed_multiplier: f64) -> Result<(), String> {
        StandardRules.check_mods(mods, speed_multiplier)
    }

    fn max_score(&self, _beatmap_hash: &str, _mods: &Mods) -> Option<f64> {
        self.max_score
    }

    fn beatmap_length(&self, _beatmap_hash: &str) -> Option<Duration> {
        self.length
    }
}

/// Where a stalled write hangs relative to the write itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stall {
    BeforeWrite,
    AfterWrite,
}

/// A [`MemoryStore`] whose next compare-and-swap can be made to hang, so
/// a test can drop the caller's future at a chosen point.
#[derive(Clone)]
pub struct SlowStore {
    inner: Arc<MemoryStore>,
    stall: Arc<Mutex<Option<(Stall, Duration)>>>,
}

impl SlowStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryStore::new()),
            stall: Arc::default(),
        }
    }

    /// Makes only the next compare-and-swap hang for `delay`.
    pub fn stall_next_write(&self, stall: Stall, delay: Duration) {
        *self.stall.lock().unwrap() = Some((stall, delay));
    }
}

impl RoomStore for SlowStore {
    async fn create(&self, draft: NewRoom) -> Result<Room, StoreError> {
        self.inner.create(draft).await
    }

    async fn get(&self, id: &RoomId) -> Result<Room, StoreError> {
        self.inner.get(id).await
    }

    async fn get_by_channel(&self, channel: ChannelId) -> Result<Option<Room>, StoreError> {
        self.inner.get_by_channel(channel).await
    }

    async fn get_by_player(&self, player: PlayerId) -> Result<Option<Room>, StoreError> {
        self.inner.get_by_player(player).await
    }

    async fn compare_and_swap(&self, id: &RoomId, expected: u64, room: Room) -> Result<Room, StoreError> {
        let stall = self.stall.lock().unwrap().take();
        match stall {
            Some((Stall::BeforeWrite, delay)) => {
                tokio::time::sleep(delay).await;
                self.inner.compare_and_swap(id, expected, room).await
            }
            Some((Stall::AfterWrite, delay)) => {
                let stored = self.inner.compare_and_swap(id, expected, room).await;
                tokio::time::sleep(delay).await;
                stored
            }
            None => self.inner.compare_and_swap(id, expected, room).await,
        }
    }

    async fn delete(&self, id: &RoomId, expected: Option<u64>) -> Result<(), StoreError> {
        self.inner.delete(id, expected).await
    }

    async fn list(&self) -> Result<Vec<Room>, StoreError> {
        self.inner.list().await
    }
}

pub type TestLobby<B = StandardRules, S = MemoryStore> = Lobby<S, RecordingNotifier, B>;

pub fn lobby() -> (TestLobby, RecordingNotifier) {
    let notifier = RecordingNotifier::default();
    let lobby = Lobby::builder()
        .seed(7)
        .build(MemoryStore::new(), notifier.clone(), StandardRules);
    (lobby, notifier)
}

pub fn lobby_with_rules(rules: FixedRules) -> (TestLobby<FixedRules>, RecordingNotifier) {
    let notifier = RecordingNotifier::default();
    let lobby = Lobby::builder()
        .seed(7)
        .build(MemoryStore::new(), notifier.clone(), rules);
    (lobby, notifier)
}

pub fn slow_lobby() -> (TestLobby<StandardRules, SlowStore>, SlowStore, RecordingNotifier) {
    let notifier = RecordingNotifier::default();
    let store = SlowStore::new();
    let lobby = Lobby::builder()
        .seed(7)
        .build(store.clone(), notifier.clone(), StandardRules);
    (lobby, store, notifier)
}

pub fn player(id: u64) -> Player {
    Player::new(PlayerId(id), format!("player{id}"))
}

pub const MAP: &str = "4f2c9a";

/// Creates a room hosted by player 1 and joins players `2..=count`.
pub async fn room_with<S: RoomStore, B: BeatmapRules>(
    lobby: &TestLobby<B, S>,
    count: u64,
    settings: RoomSettings,
) -> Room {
    let room = lobby
        .create_room(player(1), "test room", None, settings)
        .await
        .unwrap();
    for id in 2..=count {
        lobby.join(&room.id, player(id), None).await.unwrap();
    }
    lobby.room(&room.id).await.unwrap()
}

/// Picks the test beatmap and readies everyone.
pub async fn ready_all<S: RoomStore, B: BeatmapRules>(lobby: &TestLobby<B, S>, room: &Room) {
    lobby
        .update_settings(&room.id, room.host, SettingsChange::new().beatmap(MAP))
        .await
        .unwrap();
    let room = lobby.room(&room.id).await.unwrap();
    for p in &room.players {
        lobby.set_ready(&room.id, p.id, true).await.unwrap();
    }
}

pub fn score(score: u64, accuracy: f64) -> RawResult {
    RawResult {
        score,
        accuracy,
        ..RawResult::default()
    }
}
