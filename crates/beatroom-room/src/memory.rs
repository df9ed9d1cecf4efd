//! In-process [`RoomStore`] backed by encoded documents.

use std::collections::{HashMap, HashSet};

use beatroom_protocol::{ChannelId, Codec, JsonCodec, PlayerId, RoomId};
use tokio::sync::Mutex;

use crate::{NewRoom, Room, RoomStore, StoreError};

/// What the store keeps per room: the encoded document plus the fields
/// it indexes, so the indexes can be fixed up without decoding.
struct Stored {
    version: u64,
    bytes: Vec<u8>,
    channel: ChannelId,
    members: Vec<PlayerId>,
}

#[derive(Default)]
struct Inner {
    docs: HashMap<RoomId, Stored>,
    by_channel: HashMap<ChannelId, RoomId>,
    by_player: HashMap<PlayerId, RoomId>,
    /// Channels of deleted rooms. Never bound again.
    retired_channels: HashSet<ChannelId>,
}

impl Inner {
    fn decode<C: Codec>(&self, codec: &C, id: &RoomId) -> Result<Room, StoreError> {
        let stored = self.docs.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        Ok(codec.decode(&stored.bytes)?)
    }

    /// Fails if any of `members` is indexed to a room other than `id`.
    fn check_members(&self, id: &RoomId, members: &[PlayerId]) -> Result<(), StoreError> {
        for player in members {
            if let Some(other) = self.by_player.get(player) {
                if other != id {
                    return Err(StoreError::PlayerTaken(*player, other.clone()));
                }
            }
        }
        Ok(())
    }

    fn unindex_members(&mut self, id: &RoomId, members: &[PlayerId]) {
        for player in members {
            if self.by_player.get(player) == Some(id) {
                self.by_player.remove(player);
            }
        }
    }
}

/// A registry that lives in memory, for tests, demos and single-process
/// deployments.
///
/// Rooms are stored encoded with `C`, so every read hands out a fresh
/// copy and nothing outside the store can alias a stored room.
pub struct MemoryStore<C: Codec = JsonCodec> {
    codec: C,
    inner: Mutex<Inner>,
}

impl MemoryStore<JsonCodec> {
    pub fn new() -> Self {
        Self::with_codec(JsonCodec)
    }
}

impl Default for MemoryStore<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> MemoryStore<C> {
    pub fn with_codec(codec: C) -> Self {
        Self {
            codec,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Number of stored rooms.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.docs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<C: Codec> RoomStore for MemoryStore<C> {
    async fn create(&self, draft: NewRoom) -> Result<Room, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.by_channel.contains_key(&draft.channel)
            || inner.retired_channels.contains(&draft.channel)
        {
            return Err(StoreError::ChannelInUse(draft.channel));
        }
        if let Some(other) = inner.by_player.get(&draft.host.id) {
            return Err(StoreError::PlayerTaken(draft.host.id, other.clone()));
        }

        let id = loop {
            let candidate = RoomId::generate(&mut rand::rng());
            if !inner.docs.contains_key(&candidate) {
                break candidate;
            }
        };
        let room = Room::open(id.clone(), draft);
        let bytes = self.codec.encode(&room)?;

        inner.by_channel.insert(room.channel, id.clone());
        inner.by_player.insert(room.host, id.clone());
        inner.docs.insert(
            id,
            Stored {
                version: room.version,
                bytes,
                channel: room.channel,
                members: vec![room.host],
            },
        );
        tracing::debug!(room_id = %room.id, channel = %room.channel, "room stored");
        Ok(room)
    }

    async fn get(&self, id: &RoomId) -> Result<Room, StoreError> {
        self.inner.lock().await.decode(&self.codec, id)
    }

    async fn get_by_channel(&self, channel: ChannelId) -> Result<Option<Room>, StoreError> {
        let inner = self.inner.lock().await;
        match inner.by_channel.get(&channel) {
            Some(id) => inner.decode(&self.codec, id).map(Some),
            None => Ok(None),
        }
    }

    async fn get_by_player(&self, player: PlayerId) -> Result<Option<Room>, StoreError> {
        let inner = self.inner.lock().await;
        match inner.by_player.get(&player) {
            Some(id) => inner.decode(&self.codec, id).map(Some),
            None => Ok(None),
        }
    }

    async fn compare_and_swap(
        &self,
        id: &RoomId,
        expected: u64,
        mut room: Room,
    ) -> Result<Room, StoreError> {
        let mut inner = self.inner.lock().await;
        let stored = inner.docs.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if stored.version != expected {
            return Err(StoreError::VersionConflict {
                expected,
                actual: stored.version,
            });
        }
        if room.id != *id {
            return Err(StoreError::InvalidDocument(format!(
                "document for {id} carries id {}",
                room.id
            )));
        }
        if room.channel != stored.channel {
            return Err(StoreError::InvalidDocument(format!(
                "room {id} cannot be rebound from {} to {}",
                stored.channel, room.channel
            )));
        }
        let members: Vec<PlayerId> = room.players.iter().map(|p| p.id).collect();
        inner.check_members(id, &members)?;

        room.version = expected + 1;
        let bytes = self.codec.encode(&room)?;

        let previous = inner
            .docs
            .get(id)
            .map(|s| s.members.clone())
            .unwrap_or_default();
        inner.unindex_members(id, &previous);
        for player in &members {
            inner.by_player.insert(*player, id.clone());
        }
        if let Some(stored) = inner.docs.get_mut(id) {
            stored.version = room.version;
            stored.bytes = bytes;
            stored.members = members;
        }
        Ok(room)
    }

    async fn delete(&self, id: &RoomId, expected: Option<u64>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let stored = inner.docs.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if let Some(expected) = expected {
            if stored.version != expected {
                return Err(StoreError::VersionConflict {
                    expected,
                    actual: stored.version,
                });
            }
        }
        let Some(stored) = inner.docs.remove(id) else {
            return Err(StoreError::NotFound(id.clone()));
        };
        inner.unindex_members(id, &stored.members);
        inner.by_channel.remove(&stored.channel);
        inner.retired_channels.insert(stored.channel);
        tracing::debug!(room_id = %id, channel = %stored.channel, "room deleted from store");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Room>, StoreError> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<&RoomId> = inner.docs.keys().collect();
        ids.sort();
        ids.into_iter().map(|id| inner.decode(&self.codec, id)).collect()
    }
}
