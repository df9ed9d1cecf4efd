//! # Beatroom
//!
//! Multiplayer room orchestration for rhythm game lobbies.
//!
//! Players gather in a room, the host picks a beatmap and settings,
//! everyone readies up, and the room runs a timed round: a countdown, the
//! play itself while results come in from the game service, then scoring
//! by the room's win condition. Many players act on the same room at
//! once; every change goes through an optimistic compare-and-swap on the
//! room registry so concurrent commands can't leave a room in a broken
//! state.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use beatroom::prelude::*;
//!
//! # async fn demo() -> Result<(), LobbyError> {
//! let lobby = Lobby::builder().build(MemoryStore::new(), LogNotifier::new(), StandardRules);
//!
//! let room = lobby
//!     .create_room(Player::new(PlayerId(1), "alice"), "friday night", None, RoomSettings::default())
//!     .await?;
//! lobby.join(&room.id, Player::new(PlayerId(2), "bob"), None).await?;
//! lobby
//!     .update_settings(&room.id, PlayerId(1), SettingsChange::new().beatmap("4f2c9a"))
//!     .await?;
//! lobby.set_ready(&room.id, PlayerId(1), true).await?;
//! lobby.set_ready(&room.id, PlayerId(2), true).await?;
//! lobby.start_round(&room.id, PlayerId(1)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! ```text
//! Lobby (this crate) → beatroom-room (rules, registry) → beatroom-protocol (ids, codec)
//!                    → beatroom-timer (per-room timers, clock)
//! ```

mod config;
mod error;
mod lobby;
mod notify;
mod rounds;

pub use config::LobbyConfig;
pub use error::LobbyError;
pub use lobby::{Lobby, LobbyBuilder};
pub use notify::{LogNotifier, Notifier, NotifyError};

/// Everything needed to run a lobby.
pub mod prelude {
    pub use crate::{Lobby, LobbyBuilder, LobbyConfig, LobbyError, LogNotifier, Notifier, NotifyError};
    pub use beatroom_protocol::{ChannelId, PlayerId, RoomId};
    pub use beatroom_room::{
        BeatmapRules, DiscardReason, DisbandReason, ErrorKind, Judgements, MemoryStore, Mod, Mods,
        Player, RawResult, Room, RoomError, RoomEvent, RoomListing, RoomSettings, RoomStore,
        RoundPhase, RoundSummary, SettingsChange, StandardRules, Submission, Team, TeamMode,
        WinCondition, Winner,
    };
    pub use beatroom_timer::{PendingTimer, TimerKind};
}
