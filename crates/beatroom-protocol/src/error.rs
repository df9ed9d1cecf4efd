//! Error types for the protocol layer.
//!
//! Each crate in Beatroom defines its own error enum. When you see a
//! `ProtocolError`, the problem is in turning a document into bytes (or
//! back), not in room rules or storage bookkeeping.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    ///
    /// The inner `serde_json::Error` is kept so the cause shows up in logs.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust value).
    ///
    /// Common causes: a document written by an older schema, truncated
    /// bytes, or a field with the wrong type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// An identifier or value that parses but is not acceptable,
    /// e.g. a room code with characters outside the code alphabet.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}
