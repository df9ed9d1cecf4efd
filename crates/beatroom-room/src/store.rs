//! The Room Registry contract.

use beatroom_protocol::{ChannelId, PlayerId, RoomId};

use crate::{NewRoom, Room, StoreError};

/// Durable storage for room documents.
///
/// Every room carries a version. Callers read a room, compute the new
/// value and write it back with [`compare_and_swap`](RoomStore::compare_and_swap);
/// if someone else wrote in between they get `VersionConflict` and start
/// over from a fresh read. No lock is held between the read and the write.
///
/// The registry also enforces the cross-room rules a single document
/// can't: a player is a member of at most one room, and a channel is bound
/// to at most one room ever.
pub trait RoomStore: Send + Sync + 'static {
    /// Stores a new room under a fresh unique id, with `version = 1`.
    ///
    /// # Errors
    /// `PlayerTaken` if the host is already in a room, `ChannelInUse` if
    /// the channel is or was bound to another room.
    fn create(&self, draft: NewRoom) -> impl std::future::Future<Output = Result<Room, StoreError>> + Send;

    /// # Errors
    /// `NotFound` if no room has this id.
    fn get(&self, id: &RoomId) -> impl std::future::Future<Output = Result<Room, StoreError>> + Send;

    fn get_by_channel(
        &self,
        channel: ChannelId,
    ) -> impl std::future::Future<Output = Result<Option<Room>, StoreError>> + Send;

    fn get_by_player(
        &self,
        player: PlayerId,
    ) -> impl std::future::Future<Output = Result<Option<Room>, StoreError>> + Send;

    /// Replaces the room if its stored version is still `expected`.
    ///
    /// Returns the room as stored, with its version bumped.
    ///
    /// # Errors
    /// `VersionConflict` if the room changed since it was read,
    /// `PlayerTaken` if a member of `room` belongs to another room.
    fn compare_and_swap(
        &self,
        id: &RoomId,
        expected: u64,
        room: Room,
    ) -> impl std::future::Future<Output = Result<Room, StoreError>> + Send;

    /// Deletes the room, optionally only if it is still at `expected`.
    /// The room's channel is retired and can't be bound again.
    fn delete(
        &self,
        id: &RoomId,
        expected: Option<u64>,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Every stored room, ordered by id.
    fn list(&self) -> impl std::future::Future<Output = Result<Vec<Room>, StoreError>> + Send;
}
