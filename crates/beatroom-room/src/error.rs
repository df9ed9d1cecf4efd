//! Error types for the room layer.

use beatroom_protocol::{ChannelId, PlayerId, ProtocolError, RoomId};

/// Coarse classification shared by every Beatroom error.
///
/// The command layer uses this to pick how to render a rejection; the
/// error's `Display` carries the specific reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The room or player does not exist.
    NotFound,
    /// The caller is not the host.
    PermissionDenied,
    /// A rule of the room rejected the request.
    PreconditionFailed,
    /// A registry version mismatch. Retried internally.
    Conflict,
    /// Storage, messaging, or scoring collaborators failed.
    ExternalFailure,
}

/// Rejections produced by room rules.
///
/// Every variant names the exact precondition that failed so it can be
/// shown to players as-is.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoomError {
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    #[error("player {0} is not in room {1}")]
    PlayerNotInRoom(PlayerId, RoomId),

    /// Only the host may do this.
    #[error("player {0} is not the host")]
    NotHost(PlayerId),

    #[error("the host cannot kick themselves; leave or disband instead")]
    CannotKickSelf,

    #[error("room {0} is full")]
    RoomFull(RoomId),

    #[error("wrong password for room {0}")]
    WrongPassword(RoomId),

    /// A player can be in at most one room at a time.
    #[error("player {0} is already in room {1}")]
    AlreadyInARoom(PlayerId, RoomId),

    #[error("moving to that team would leave the teams uneven")]
    TeamImbalance,

    #[error("teams are only used in team versus mode")]
    NotTeamMode,

    #[error("player {0} is spectating and has no team")]
    SpectatorHasNoTeam(PlayerId),

    #[error("a round is already in progress")]
    RoundInProgress,

    #[error("no round is in progress")]
    RoundNotInProgress,

    #[error("at least {required} playing members are needed, found {actual}")]
    NotEnoughPlayers { required: usize, actual: usize },

    #[error("no beatmap has been picked")]
    NoBeatmapPicked,

    #[error("player {0} is not ready")]
    PlayerNotReady(PlayerId),

    /// The player is playing the current round and can't switch to spectating.
    #[error("player {0} is in the middle of a round")]
    MidRound(PlayerId),

    #[error("room name is empty")]
    EmptyName,

    #[error("room name is {0} characters, the limit is {max}", max = crate::MAX_NAME_LEN)]
    NameTooLong(usize),

    #[error("slot count {0} is outside {min}..={max}", min = crate::MIN_SLOTS, max = crate::MAX_SLOTS)]
    InvalidSlotCount(u8),

    #[error("cannot shrink to {requested} slots with {players} players in the room")]
    SlotsBelowPlayerCount { requested: u8, players: usize },

    #[error("score portion {0} is outside 0..=1")]
    ScorePortionOutOfRange(f64),

    #[error("speed multiplier {0} is outside the allowed range")]
    SpeedOutOfRange(f64),

    #[error("forced AR {0} is outside the allowed range")]
    ForceArOutOfRange(f64),

    #[error("incompatible mods: {0}")]
    IncompatibleMods(String),
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RoomNotFound(_) | Self::PlayerNotInRoom(..) => ErrorKind::NotFound,
            Self::NotHost(_) | Self::CannotKickSelf => ErrorKind::PermissionDenied,
            _ => ErrorKind::PreconditionFailed,
        }
    }
}

/// Errors from a [`RoomStore`](crate::RoomStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room changed since it was read. The caller re-reads and retries.
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    /// The channel is bound to another room, or was bound to one before.
    #[error("channel {0} is already bound to a room")]
    ChannelInUse(ChannelId),

    /// Writing this document would put a player in two rooms.
    #[error("player {0} is already in room {1}")]
    PlayerTaken(PlayerId, RoomId),

    /// The document contradicts what the store already knows about the
    /// room, e.g. a changed id or channel binding.
    #[error("invalid room document: {0}")]
    InvalidDocument(String),

    #[error(transparent)]
    Codec(#[from] ProtocolError),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::VersionConflict { .. } => ErrorKind::Conflict,
            Self::PlayerTaken(..) => ErrorKind::PreconditionFailed,
            Self::ChannelInUse(_) | Self::InvalidDocument(_) | Self::Codec(_) => {
                ErrorKind::ExternalFailure
            }
        }
    }
}
