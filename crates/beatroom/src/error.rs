//! Unified error type for the lobby service.

use beatroom_protocol::RoomId;
use beatroom_room::{ErrorKind, RoomError, StoreError};

use crate::NotifyError;

/// Top-level error that wraps every layer's errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls,
/// so `?` converts layer errors automatically. Use [`kind`](Self::kind)
/// to decide how to present a failure.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// A room rule rejected the request.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The registry failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The messaging platform couldn't create the room's channel.
    #[error(transparent)]
    Notify(#[from] NotifyError),

    /// Every retry of a read-modify-write lost to a concurrent writer.
    #[error("room {0} is too busy, try again")]
    Contention(RoomId),
}

impl LobbyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Room(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Notify(_) | Self::Contention(_) => ErrorKind::ExternalFailure,
        }
    }

    /// The underlying room rule, if that's what failed.
    pub fn as_room_error(&self) -> Option<&RoomError> {
        match self {
            Self::Room(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beatroom_protocol::PlayerId;

    #[test]
    fn test_from_room_error() {
        let err: LobbyError = RoomError::NotHost(PlayerId(3)).into();
        assert!(matches!(err, LobbyError::Room(_)));
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(err.to_string(), "player P-3 is not the host");
    }

    #[test]
    fn test_from_store_error() {
        let err: LobbyError = StoreError::NotFound(RoomId::new("ABCDEF")).into();
        assert!(matches!(err, LobbyError::Store(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.as_room_error().is_none());
    }

    #[test]
    fn test_contention_is_external_failure() {
        let err = LobbyError::Contention(RoomId::new("ABCDEF"));
        assert_eq!(err.kind(), ErrorKind::ExternalFailure);
        assert!(err.to_string().contains("R-ABCDEF"));
    }

    #[test]
    fn test_notify_error_is_external_failure() {
        let err: LobbyError = NotifyError::Unavailable("down".into()).into();
        assert_eq!(err.kind(), ErrorKind::ExternalFailure);
    }
}
