//! Room rules and storage for Beatroom.
//!
//! Everything in this crate except the registry is pure logic over a
//! [`Room`] value: an operation takes a room read from the registry,
//! changes it, and returns [`Effects`] describing what should happen once
//! the change is committed. The lobby service in the `beatroom` crate runs
//! the compare-and-swap loop and carries out the effects.
//!
//! # Key types
//!
//! - [`Room`]: the room document (roster, host, settings, round status)
//! - [`RoomStore`]: the registry contract, with [`MemoryStore`] in memory
//! - [`RoundPhase`]: Idle → Countdown → Playing → Scoring → Idle
//! - [`RoomSettings`] / [`SettingsChange`]: host-configurable settings
//! - [`evaluate()`]: ranks a round's results by its [`WinCondition`]
//! - [`RoomEvent`]: what gets published to the room's channel
//!
//! # Modules
//!
//! - [`roster`]: join, leave, kick, ready and spectate flags, disband
//! - [`teams`]: team versus balancing
//! - [`settings`]: settings validation and negotiation
//! - [`round`]: countdown, play, result collection and summary
//! - [`host`]: host migration

mod error;
mod event;
mod evaluate;
mod memory;
mod model;
mod mods;
mod phase;
mod store;

pub mod host;
pub mod roster;
pub mod round;
pub mod settings;
pub mod teams;

pub use error::{ErrorKind, RoomError, StoreError};
pub use evaluate::{
    Entry, PlayerStanding, Ranking, ScoreNormalization, ScoringParams, TeamStanding, Winner,
    evaluate, metric,
};
pub use event::{DisbandReason, Effects, RoomEvent, TimerAction};
pub use memory::MemoryStore;
pub use model::{NewRoom, Player, PlayerState, Room, RoomListing, RoomStatus, Team};
pub use mods::{BeatmapRules, Mod, Mods, StandardRules, acronyms};
pub use phase::RoundPhase;
pub use round::{
    DiscardReason, Judgements, Participant, RawResult, RoundState, RoundSummary, Submission,
    SubmittedResult,
};
pub use settings::{
    MAX_NAME_LEN, MAX_SLOTS, MIN_SLOTS, RoomSettings, SettingsChange, TeamMode, WinCondition,
};
pub use store::RoomStore;
