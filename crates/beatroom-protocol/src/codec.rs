//! Codec trait and implementations for room documents.
//!
//! The document store persists rooms as opaque byte blobs. The store
//! doesn't care HOW a room becomes bytes; it only needs something that
//! implements [`Codec`]. Swapping JSON for a binary format later only
//! touches the codec, not the registry.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust values to bytes and decode them back.
///
/// `Send + Sync + 'static` because a codec lives inside a shared store
/// that is accessed from many Tokio tasks at once.
///
/// `DeserializeOwned` (instead of `Deserialize<'de>`) means the decoded
/// value owns its data, so the stored bytes can be dropped or overwritten
/// right after decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// don't match the expected shape.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// JSON documents are easy to inspect when debugging a stuck room, which
/// is worth more than compactness for a few hundred rooms.
///
/// ## Example
///
/// ```rust
/// use beatroom_protocol::{Codec, JsonCodec, RoomId};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&RoomId::new("K4Z9QX")).unwrap();
/// let decoded: RoomId = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded.as_str(), "K4Z9QX");
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
