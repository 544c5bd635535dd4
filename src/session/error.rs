//! Session-level error taxonomy.

use std::time::Duration;

use thiserror::Error;

use crate::capability::{EngineError, TransportError};
use crate::session::AvatarSelection;

/// Reasons a live session could not be established (or was lost while
/// starting up).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// A required credential (named in the payload) is empty.
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    /// The relay-token endpoint answered with a non-success status or could
    /// not be reached (`status` is `None`).
    #[error("failed to fetch relay credentials: {detail}")]
    CredentialFetchFailed { status: Option<u16>, detail: String },

    /// The avatar did not report readiness within the startup timeout.
    #[error("avatar {avatar} did not start within {timeout:?}")]
    StartupTimeout {
        avatar: AvatarSelection,
        timeout: Duration,
    },

    /// No video arrived for the selection; it is probably not provisioned in
    /// this region.
    #[error("avatar {avatar} is not available in this region (no video received)")]
    AvatarUnavailable { avatar: AvatarSelection },

    /// A session is already connecting, live, or settling.
    #[error("a session is already active")]
    SessionActive,

    /// The connect was given up (the user stopped) before it finished.
    #[error("connect abandoned")]
    Abandoned,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Reasons an utterance was not spoken to completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeakError {
    /// The engine canceled synthesis.
    #[error("speech canceled: {detail}")]
    Canceled { detail: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// There is no live session to speak through.
    #[error("no live session")]
    NoSession,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_timeout_names_the_avatar() {
        let err = ConnectError::StartupTimeout {
            avatar: AvatarSelection::new("lisa", "casual-sitting"),
            timeout: Duration::from_secs(30),
        };
        let message = err.to_string();
        assert!(message.contains("lisa/casual-sitting"), "{message}");
        assert!(message.contains("30s"), "{message}");
    }

    #[test]
    fn speak_canceled_carries_detail() {
        let err = SpeakError::Canceled {
            detail: "websocket closed".into(),
        };
        assert_eq!(err.to_string(), "speech canceled: websocket closed");
    }
}
