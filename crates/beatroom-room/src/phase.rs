//! The round state machine.

use serde::{Deserialize, Serialize};

/// Where a room is in its round cycle.
///
/// ```text
///        ┌──────────── abort ─────────────┐
///        ▼                                 │
///      Idle → Countdown → Playing → Scoring → Idle
///        ▲        │          │
///        └─ abort ┘          └── abort ──→ Idle
/// ```
///
/// - **Idle**: Between rounds. Players join, leave, ready up, and the
///   host changes settings.
/// - **Countdown**: The host pressed start. Any roster change sends the
///   room back to Idle; otherwise the round begins when the countdown
///   expires.
/// - **Playing**: Participants are playing the beatmap and reporting
///   results. Joins and settings changes are refused.
/// - **Scoring**: Every participant has reported (or the round timed out).
///   The ranking is computed in the same change, so a stored room is never
///   left in this phase.
///
/// There is no terminal state: a room leaves the cycle only by being
/// deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoundPhase {
    #[default]
    Idle,
    Countdown,
    Playing,
    Scoring,
}

impl RoundPhase {
    /// Returns `true` while a round is live.
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing | Self::Scoring)
    }

    /// Returns `true` if players may join and settings may change.
    pub fn accepts_changes(&self) -> bool {
        matches!(self, Self::Idle | Self::Countdown)
    }

    /// Returns `true` if the host may force this phase back to Idle.
    pub fn is_abortable(&self) -> bool {
        matches!(self, Self::Countdown | Self::Playing)
    }

    /// The phase that follows this one in the normal cycle.
    pub fn next(self) -> Self {
        match self {
            Self::Idle => Self::Countdown,
            Self::Countdown => Self::Playing,
            Self::Playing => Self::Scoring,
            Self::Scoring => Self::Idle,
        }
    }

    /// Returns `true` if moving to `target` is a legal transition: the
    /// next phase in the cycle, or an abort back to Idle.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == target || (self.is_abortable() && target == Self::Idle)
    }
}

impl std::fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Countdown => write!(f, "Countdown"),
            Self::Playing => write!(f, "Playing"),
            Self::Scoring => write!(f, "Scoring"),
        }
    }
}
