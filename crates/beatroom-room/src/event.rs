//! What a room operation produces besides the new room value.
//!
//! Operations in this crate are pure: they change a `Room` in place and
//! describe the side effects (messages to publish, timers to start or
//! cancel) in an [`Effects`]. The lobby commits the room first and only
//! then carries the effects out.

use beatroom_protocol::{PlayerId, RoomId};
use serde::{Deserialize, Serialize};

use crate::mods::Mods;
use crate::round::RoundSummary;
use crate::Team;

/// Why a room was deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisbandReason {
    LastPlayerLeft,
    ByHost,
}

/// A notification for the room's bound channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RoomEvent {
    RoomCreated {
        room_id: RoomId,
        name: String,
        host: PlayerId,
    },
    PlayerJoined {
        player: PlayerId,
        display_name: String,
        team: Option<Team>,
    },
    PlayerLeft {
        player: PlayerId,
    },
    PlayerKicked {
        player: PlayerId,
        by: PlayerId,
    },
    HostChanged {
        from: PlayerId,
        to: PlayerId,
    },
    TeamChanged {
        player: PlayerId,
        team: Team,
    },
    ReadyChanged {
        player: PlayerId,
        ready: bool,
    },
    SpectatingChanged {
        player: PlayerId,
        spectating: bool,
    },
    /// `retitle` is set when the channel's display metadata (name or
    /// beatmap) needs updating.
    SettingsChanged {
        name: String,
        beatmap_hash: Option<String>,
        retitle: bool,
    },
    CountdownStarted {
        deadline_ms: u64,
    },
    CountdownAborted {
        reason: String,
    },
    /// Everything a client needs to load the same content.
    RoundStarted {
        beatmap_hash: String,
        mods: Mods,
        speed_multiplier: f64,
        force_ar: Option<f64>,
        participants: Vec<PlayerId>,
    },
    ResultReceived {
        player: PlayerId,
    },
    RoundAborted {
        by: PlayerId,
    },
    RoundFinished {
        summary: RoundSummary,
    },
    RoomDisbanded {
        reason: DisbandReason,
    },
}

impl RoomEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomCreated { .. } => "room created",
            Self::PlayerJoined { .. } => "player joined",
            Self::PlayerLeft { .. } => "player left",
            Self::PlayerKicked { .. } => "player kicked",
            Self::HostChanged { .. } => "host changed",
            Self::TeamChanged { .. } => "team changed",
            Self::ReadyChanged { .. } => "ready changed",
            Self::SpectatingChanged { .. } => "spectating changed",
            Self::SettingsChanged { .. } => "settings changed",
            Self::CountdownStarted { .. } => "countdown started",
            Self::CountdownAborted { .. } => "countdown aborted",
            Self::RoundStarted { .. } => "round started",
            Self::ResultReceived { .. } => "result received",
            Self::RoundAborted { .. } => "round aborted",
            Self::RoundFinished { .. } => "round finished",
            Self::RoomDisbanded { .. } => "room disbanded",
        }
    }
}

/// What to do with the room's pending timer after a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerAction {
    #[default]
    Keep,
    Cancel,
    StartCountdown { generation: u64 },
    StartRoundTimeout { generation: u64 },
}

/// Side effects of one room operation.
#[derive(Debug, Clone, Default)]
pub struct Effects {
    pub events: Vec<RoomEvent>,
    pub timer: TimerAction,
    /// The room is empty or was disbanded and must be deleted.
    pub disband: bool,
    /// The round of this generation has every result it will get.
    pub close_round: Option<u64>,
    /// Nothing changed; skip the write.
    pub noop: bool,
}

impl Effects {
    pub fn noop() -> Self {
        Self {
            noop: true,
            ..Self::default()
        }
    }

    pub fn with_event(event: RoomEvent) -> Self {
        Self {
            events: vec![event],
            ..Self::default()
        }
    }

    /// Folds the effects of a follow-up step into these. The later step's
    /// timer action wins unless it keeps the timer as is.
    pub fn absorb(&mut self, later: Effects) {
        if later.noop {
            return;
        }
        self.events.extend(later.events);
        if later.timer != TimerAction::Keep {
            self.timer = later.timer;
        }
        self.disband |= later.disband;
        self.close_round = later.close_round;
        self.noop = false;
    }
}
