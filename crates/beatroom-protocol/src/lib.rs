//! Shared vocabulary for Beatroom.
//!
//! This crate defines the pieces every other layer agrees on:
//!
//! - **Identities** ([`PlayerId`], [`RoomId`], [`ChannelId`]): who is
//!   playing, which room they're in, and which messaging-platform thread
//!   that room is bound to.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how room documents are
//!   turned into bytes for the document store and back.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding or
//!   decoding.
//!
//! # Architecture
//!
//! The protocol layer sits underneath the room layer. It knows nothing
//! about rosters, rounds, or scores. Only how to name things and how to
//! serialize them.
//!
//! ```text
//! Lobby (service) → Room (rules + registry) → Protocol (ids, codec)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{ChannelId, PlayerId, RoomId};
