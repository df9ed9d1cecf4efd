//! The lobby service: rooms, rosters and settings.
//!
//! [`Lobby`] is the entry point for every room command. It reads the room
//! from the registry, runs the rule in `beatroom_room` on a copy, and
//! writes the result back with a compare-and-swap, retrying from a fresh
//! read when another writer got there first. Side effects (channel
//! messages, timers) run only after the write succeeded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use beatroom_protocol::{ChannelId, PlayerId, RoomId};
use beatroom_room::{
    BeatmapRules, Effects, NewRoom, Player, Room, RoomError, RoomEvent, RoomListing, RoomSettings,
    RoomStore, RoundPhase, SettingsChange, StandardRules, StoreError, Team, TimerAction, roster,
    settings, teams,
};
use beatroom_timer::{MonotonicClock, PendingTimer, TimerRegistry};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::{LobbyConfig, LobbyError, Notifier};

pub(crate) struct Inner<S, N, B> {
    pub(crate) store: S,
    pub(crate) notifier: N,
    pub(crate) rules: B,
    pub(crate) config: LobbyConfig,
    pub(crate) timers: TimerRegistry<RoomId>,
    pub(crate) clock: MonotonicClock,
    rng: Mutex<StdRng>,
}

impl<S, N, B> Inner<S, N, B> {
    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The result of one committed (or skipped) room operation.
pub(crate) struct Committed<T> {
    pub(crate) value: T,
    /// The room as stored afterwards, `None` if it was deleted.
    pub(crate) room: Option<Room>,
}

/// Builder for a [`Lobby`].
///
/// # Example
///
/// ```rust,ignore
/// use beatroom::prelude::*;
///
/// let lobby = Lobby::builder()
///     .config(LobbyConfig::default())
///     .seed(42)
///     .build(MemoryStore::new(), LogNotifier::new(), StandardRules);
/// ```
pub struct LobbyBuilder {
    config: LobbyConfig,
    seed: Option<u64>,
}

impl LobbyBuilder {
    pub fn new() -> Self {
        Self {
            config: LobbyConfig::default(),
            seed: None,
        }
    }

    pub fn config(mut self, config: LobbyConfig) -> Self {
        self.config = config;
        self
    }

    /// Seeds the random source used for host migration, making picks
    /// repeatable.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build<S, N, B>(self, store: S, notifier: N, rules: B) -> Lobby<S, N, B>
    where
        S: RoomStore,
        N: Notifier,
        B: BeatmapRules,
    {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Lobby {
            inner: Arc::new(Inner {
                store,
                notifier,
                rules,
                config: self.config,
                timers: TimerRegistry::new(),
                clock: MonotonicClock::new(),
                rng: Mutex::new(rng),
            }),
        }
    }
}

impl Default for LobbyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Coordinates every room in one registry.
///
/// Cheap to clone; clones share the registry, timers and random source.
/// Operations on different rooms never wait on each other.
pub struct Lobby<S, N, B = StandardRules> {
    pub(crate) inner: Arc<Inner<S, N, B>>,
}

impl<S, N, B> Clone for Lobby<S, N, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Lobby<(), (), StandardRules> {
    pub fn builder() -> LobbyBuilder {
        LobbyBuilder::new()
    }
}

impl<S, N, B> Lobby<S, N, B>
where
    S: RoomStore,
    N: Notifier,
    B: BeatmapRules,
{
    pub fn config(&self) -> &LobbyConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Milliseconds since the lobby was built, on the lobby's clock.
    pub fn now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    /// The timer pending for a room, if any.
    pub fn pending_timer(&self, room_id: &RoomId) -> Option<PendingTimer> {
        self.inner.timers.pending(room_id)
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner<S, N, B>> {
        Arc::downgrade(&self.inner)
    }

    // -----------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------

    pub async fn room(&self, room_id: &RoomId) -> Result<Room, LobbyError> {
        match self.inner.store.get(room_id).await {
            Ok(room) => Ok(room),
            Err(StoreError::NotFound(id)) => Err(RoomError::RoomNotFound(id).into()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn room_by_channel(&self, channel: ChannelId) -> Result<Option<Room>, LobbyError> {
        Ok(self.inner.store.get_by_channel(channel).await?)
    }

    pub async fn room_of_player(&self, player: PlayerId) -> Result<Option<Room>, LobbyError> {
        Ok(self.inner.store.get_by_player(player).await?)
    }

    /// Rooms a stranger could join right now: public, between rounds, with
    /// a free slot.
    pub async fn list_rooms(&self) -> Result<Vec<RoomListing>, LobbyError> {
        let rooms = self.inner.store.list().await?;
        Ok(rooms
            .iter()
            .filter(|r| r.is_public() && r.status.phase == RoundPhase::Idle && !r.is_full())
            .map(Room::listing)
            .collect())
    }

    // -----------------------------------------------------------------
    // Room lifecycle
    // -----------------------------------------------------------------

    /// Opens a room with `host` as its only member and binds a fresh
    /// channel to it.
    pub async fn create_room(
        &self,
        host: Player,
        name: &str,
        password: Option<&str>,
        mut settings: RoomSettings,
    ) -> Result<Room, LobbyError> {
        let name = settings::validate_name(name)?;
        settings.normalize();
        settings.validate(1, &self.inner.rules)?;
        if let Some(current) = self.inner.store.get_by_player(host.id).await? {
            return Err(RoomError::AlreadyInARoom(host.id, current.id).into());
        }

        let title = channel_title(&name, settings.beatmap_hash.as_deref());
        let channel = self.inner.notifier.create_channel(&title).await?;
        let draft = NewRoom {
            name,
            password: password.map(str::to_owned),
            channel,
            host,
            settings,
        };
        let room = match self.inner.store.create(draft).await {
            Ok(room) => room,
            Err(e) => {
                if let Err(notify) = self.inner.notifier.delete_channel(channel).await {
                    warn!(%channel, error = %notify, "failed to delete orphaned channel");
                }
                return Err(match e {
                    StoreError::PlayerTaken(player, room_id) => {
                        RoomError::AlreadyInARoom(player, room_id).into()
                    }
                    e => e.into(),
                });
            }
        };

        info!(room_id = %room.id, host = %room.host, %channel, "room created");
        self.publish(
            room.channel,
            &RoomEvent::RoomCreated {
                room_id: room.id.clone(),
                name: room.name.clone(),
                host: room.host,
            },
        )
        .await;
        Ok(room)
    }

    /// Deletes the room on the host's request.
    pub async fn disband(&self, room_id: &RoomId, actor: PlayerId) -> Result<(), LobbyError> {
        self.apply(room_id, |room, _| Ok(((), roster::disband(room, actor)?)))
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Roster
    // -----------------------------------------------------------------

    pub async fn join(
        &self,
        room_id: &RoomId,
        player: Player,
        password: Option<&str>,
    ) -> Result<Room, LobbyError> {
        if let Some(current) = self.inner.store.get_by_player(player.id).await? {
            return Err(RoomError::AlreadyInARoom(player.id, current.id).into());
        }
        let done = self
            .apply(room_id, |room, _| {
                Ok(((), roster::join(room, player.clone(), password)?))
            })
            .await?;
        self.committed_room(room_id, done.room)
    }

    /// Removes the player. Returns the room, or `None` if they were the
    /// last member and the room was deleted.
    pub async fn leave(&self, room_id: &RoomId, player: PlayerId) -> Result<Option<Room>, LobbyError> {
        let now = self.inner.clock.now_ms();
        let done = self
            .apply(room_id, |room, rng| {
                let mut effects = roster::leave(room, player, rng)?;
                Ok((self.settle_round(room, &mut effects, now), effects))
            })
            .await?;
        self.log_summary(room_id, done.value.as_ref());
        Ok(done.room)
    }

    pub async fn kick(
        &self,
        room_id: &RoomId,
        actor: PlayerId,
        target: PlayerId,
    ) -> Result<Room, LobbyError> {
        let now = self.inner.clock.now_ms();
        let done = self
            .apply(room_id, |room, rng| {
                let mut effects = roster::kick(room, actor, target, rng)?;
                Ok((self.settle_round(room, &mut effects, now), effects))
            })
            .await?;
        self.log_summary(room_id, done.value.as_ref());
        self.committed_room(room_id, done.room)
    }

    pub async fn set_ready(
        &self,
        room_id: &RoomId,
        player: PlayerId,
        ready: bool,
    ) -> Result<Room, LobbyError> {
        let done = self
            .apply(room_id, |room, _| Ok(((), roster::set_ready(room, player, ready)?)))
            .await?;
        self.committed_room(room_id, done.room)
    }

    pub async fn set_spectating(
        &self,
        room_id: &RoomId,
        player: PlayerId,
        spectating: bool,
    ) -> Result<Room, LobbyError> {
        let done = self
            .apply(room_id, |room, _| {
                Ok(((), roster::set_spectating(room, player, spectating)?))
            })
            .await?;
        self.committed_room(room_id, done.room)
    }

    pub async fn set_team(
        &self,
        room_id: &RoomId,
        player: PlayerId,
        team: Team,
    ) -> Result<Room, LobbyError> {
        let done = self
            .apply(room_id, |room, _| Ok(((), teams::request_team(room, player, team)?)))
            .await?;
        self.committed_room(room_id, done.room)
    }

    /// Applies a host's settings change.
    pub async fn update_settings(
        &self,
        room_id: &RoomId,
        actor: PlayerId,
        change: SettingsChange,
    ) -> Result<Room, LobbyError> {
        let rules = &self.inner.rules;
        let done = self
            .apply(room_id, |room, _| {
                Ok(((), settings::negotiate(room, actor, change.clone(), rules)?))
            })
            .await?;
        self.committed_room(room_id, done.room)
    }

    // -----------------------------------------------------------------
    // The compare-and-swap loop
    // -----------------------------------------------------------------

    /// Runs `op` against a fresh copy of the room until the write sticks.
    ///
    /// `op` may run several times and must not have side effects of its
    /// own. Rejections from `op` are returned as-is; version conflicts are
    /// retried up to `max_retries` times.
    pub(crate) async fn apply<T, F>(&self, room_id: &RoomId, mut op: F) -> Result<Committed<T>, LobbyError>
    where
        T: Send,
        F: FnMut(&mut Room, &mut StdRng) -> Result<(T, Effects), RoomError> + Send,
    {
        let store = &self.inner.store;
        for attempt in 0..=self.inner.config.max_retries {
            let current = match store.get(room_id).await {
                Ok(room) => room,
                Err(StoreError::NotFound(id)) => return Err(RoomError::RoomNotFound(id).into()),
                Err(e) => return Err(e.into()),
            };

            let mut next = current.clone();
            let (value, effects) = {
                let mut rng = self.inner.rng();
                op(&mut next, &mut rng)?
            };

            if effects.noop {
                return Ok(Committed {
                    value,
                    room: Some(current),
                });
            }

            let written = if effects.disband {
                store
                    .delete(room_id, Some(current.version))
                    .await
                    .map(|()| None)
            } else {
                store
                    .compare_and_swap(room_id, current.version, next)
                    .await
                    .map(Some)
            };

            match written {
                Ok(room) => {
                    if let Some(room) = &room {
                        debug_assert!(
                            room.check_invariants().is_ok(),
                            "invariant broken: {:?}",
                            room.check_invariants()
                        );
                    }
                    self.after_commit(&current, room.as_ref(), &effects).await;
                    return Ok(Committed { value, room });
                }
                Err(StoreError::VersionConflict { expected, actual }) => {
                    debug!(%room_id, attempt, expected, actual, "room changed underneath, retrying");
                }
                Err(StoreError::NotFound(id)) => return Err(RoomError::RoomNotFound(id).into()),
                Err(StoreError::PlayerTaken(player, other)) => {
                    return Err(RoomError::AlreadyInARoom(player, other).into());
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(%room_id, retries = self.inner.config.max_retries, "gave up after repeated conflicts");
        Err(LobbyError::Contention(room_id.clone()))
    }

    /// Carries out an operation's effects once its write has landed.
    async fn after_commit(&self, before: &Room, after: Option<&Room>, effects: &Effects) {
        let room_id = &before.id;
        let channel = before.channel;

        // Concurrent commits reach this point in any order; the registry
        // ignores requests older than the timer it holds.
        let generation = after.map_or(before.status.generation, |room| room.status.generation);
        match (effects.disband, effects.timer) {
            (true, _) => {
                self.inner.timers.cancel(room_id);
            }
            (false, TimerAction::Cancel) => {
                self.inner.timers.cancel_through(room_id, generation);
            }
            (false, TimerAction::Keep) => {}
            (false, TimerAction::StartCountdown { generation }) => {
                self.schedule_countdown(room_id, generation);
            }
            (false, TimerAction::StartRoundTimeout { generation }) => {
                let timeout = after
                    .map(|room| self.round_timeout(room))
                    .unwrap_or(self.inner.config.round_timeout);
                self.schedule_round_timeout(room_id, generation, timeout);
            }
        }

        for event in &effects.events {
            info!(%room_id, event = event.name(), "room event");
            if let RoomEvent::SettingsChanged {
                name,
                beatmap_hash,
                retitle: true,
            } = event
            {
                let title = channel_title(name, beatmap_hash.as_deref());
                if let Err(e) = self.inner.notifier.update_channel(channel, &title).await {
                    warn!(%room_id, %channel, error = %e, "failed to rename channel");
                }
            }
            self.publish(channel, event).await;
        }

        if effects.disband {
            info!(%room_id, %channel, "room deleted");
            if let Err(e) = self.inner.notifier.delete_channel(channel).await {
                warn!(%room_id, %channel, error = %e, "failed to delete channel");
            }
        }
    }

    pub(crate) async fn publish(&self, channel: ChannelId, event: &RoomEvent) {
        if let Err(e) = self.inner.notifier.publish(channel, event).await {
            warn!(%channel, event = event.name(), error = %e, "failed to publish");
        }
    }

    pub(crate) fn committed_room(&self, room_id: &RoomId, room: Option<Room>) -> Result<Room, LobbyError> {
        room.ok_or_else(|| RoomError::RoomNotFound(room_id.clone()).into())
    }
}

/// How a room's channel is titled.
pub(crate) fn channel_title(name: &str, beatmap_hash: Option<&str>) -> String {
    match beatmap_hash {
        Some(hash) => format!("{name} [{hash}]"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_title() {
        assert_eq!(channel_title("lobby", None), "lobby");
        assert_eq!(channel_title("lobby", Some("abc")), "lobby [abc]");
    }
}
