//! The messaging platform boundary.
//!
//! Each room is bound to one channel (a chat thread) on some messaging
//! platform. The lobby creates the channel with the room, renames it when
//! the room's name or beatmap changes, publishes [`RoomEvent`]s to it and
//! deletes it with the room.
//!
//! Only channel creation is allowed to fail an operation. Every other
//! call is a side effect of a change that has already been committed, so
//! failures are logged and otherwise ignored.

use std::sync::atomic::{AtomicU64, Ordering};

use beatroom_protocol::{ChannelId, Codec, JsonCodec};
use beatroom_room::RoomEvent;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The platform could not be reached or refused the request.
    #[error("messaging platform unavailable: {0}")]
    Unavailable(String),

    /// The channel no longer exists on the platform.
    #[error("channel {0} is gone")]
    ChannelGone(ChannelId),
}

/// Sends room traffic to the messaging platform.
pub trait Notifier: Send + Sync + 'static {
    /// Creates the channel a new room will be bound to.
    fn create_channel(
        &self,
        title: &str,
    ) -> impl std::future::Future<Output = Result<ChannelId, NotifyError>> + Send;

    /// Updates the channel's display title.
    fn update_channel(
        &self,
        channel: ChannelId,
        title: &str,
    ) -> impl std::future::Future<Output = Result<(), NotifyError>> + Send;

    fn delete_channel(
        &self,
        channel: ChannelId,
    ) -> impl std::future::Future<Output = Result<(), NotifyError>> + Send;

    fn publish(
        &self,
        channel: ChannelId,
        event: &RoomEvent,
    ) -> impl std::future::Future<Output = Result<(), NotifyError>> + Send;
}

/// A [`Notifier`] that writes everything to the `tracing` log.
///
/// Useful for local runs and demos. Channel ids are handed out from a
/// counter.
#[derive(Debug)]
pub struct LogNotifier {
    next_channel: AtomicU64,
    codec: JsonCodec,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self {
            next_channel: AtomicU64::new(1),
            codec: JsonCodec,
        }
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for LogNotifier {
    async fn create_channel(&self, title: &str) -> Result<ChannelId, NotifyError> {
        let channel = ChannelId(self.next_channel.fetch_add(1, Ordering::Relaxed));
        tracing::info!(%channel, title, "channel created");
        Ok(channel)
    }

    async fn update_channel(&self, channel: ChannelId, title: &str) -> Result<(), NotifyError> {
        tracing::info!(%channel, title, "channel renamed");
        Ok(())
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), NotifyError> {
        tracing::info!(%channel, "channel deleted");
        Ok(())
    }

    async fn publish(&self, channel: ChannelId, event: &RoomEvent) -> Result<(), NotifyError> {
        let payload = self
            .codec
            .encode(event)
            .map_err(|e| NotifyError::Unavailable(e.to_string()))?;
        tracing::info!(%channel, payload = %String::from_utf8_lossy(&payload), "published");
        Ok(())
    }
}
