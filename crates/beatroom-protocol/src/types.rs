//! Identity types shared by every Beatroom layer.
//!
//! Three things need names: the people playing, the rooms they play in,
//! and the messaging-platform thread each room is bound to. Each gets its
//! own newtype so a `ChannelId` can never be passed where a `PlayerId` is
//! expected, even though both wrap a `u64`.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// PlayerId
// ---------------------------------------------------------------------------

/// A unique identifier for a player (the messaging platform's user id).
///
/// `#[serde(transparent)]` stores `PlayerId(42)` as plain `42` inside room
/// documents instead of `{ "0": 42 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ChannelId
// ---------------------------------------------------------------------------

/// The messaging-platform thread bound to a room.
///
/// One channel belongs to exactly one room for that room's whole life and
/// is never handed to another room afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomId
// ---------------------------------------------------------------------------

/// A short, human-typeable room code such as `K4Z9QX`.
///
/// Players type this code to join, so the alphabet leaves out characters
/// that are easy to confuse when read aloud or in a chat font
/// (`0`/`O`, `1`/`I`/`L`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Characters a generated room code may contain.
    pub const ALPHABET: &'static [u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

    /// Length of a generated room code.
    pub const LENGTH: usize = 6;

    /// Wraps an existing code without validating it.
    ///
    /// Used for codes that came out of the store; user input should go
    /// through [`str::parse`] instead.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Generates a fresh random code.
    ///
    /// Uniqueness is the registry's job: it calls this again if the code
    /// is already taken.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..Self::LENGTH)
            .map(|_| {
                let idx = rng.random_range(0..Self::ALPHABET.len());
                Self::ALPHABET[idx] as char
            })
            .collect();
        Self(code)
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// Parses user input into a room code.
///
/// Input is trimmed and upper-cased, so `" k4z9qx "` finds room `K4Z9QX`.
impl FromStr for RoomId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        if code.len() != Self::LENGTH {
            return Err(ProtocolError::InvalidValue(format!(
                "room code must be {} characters, got {}",
                Self::LENGTH,
                code.len()
            )));
        }
        if let Some(bad) = code.bytes().find(|b| !Self::ALPHABET.contains(b)) {
            return Err(ProtocolError::InvalidValue(format!(
                "room code contains invalid character {:?}",
                bad as char
            )));
        }
        Ok(Self(code))
    }
}
