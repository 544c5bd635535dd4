//! Real-time media transport capability.
//!
//! The ICE/SDP handshake is opaque here: a [`TransportSession`] is opened
//! from relay credentials, exposes its media tracks for explicit release,
//! and reports inbound tracks and connection-state changes through
//! [`TransportEvents`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::controller::Event;
use crate::session::SessionId;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Failures reported by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to open transport session: {0}")]
    Open(String),

    #[error("failed to add {kind} transceiver: {detail}")]
    Transceiver { kind: MediaKind, detail: String },

    #[error("failed to stop {kind} track: {detail}")]
    Track { kind: MediaKind, detail: String },

    #[error("failed to close transport session: {0}")]
    Close(String),
}

// ---------------------------------------------------------------------------
// Media / connection types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransceiverDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
}

/// Connection states reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Events emitted by an open transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// An inbound media track arrived.
    TrackReceived(MediaKind),
    /// The connection moved to a new state.
    StateChanged(ConnectionState),
}

/// Relay (TURN) server credentials issued for one transport session.
///
/// Deserialises the relay-token endpoint's response body
/// `{"Urls": [...], "Username": "...", "Password": "..."}`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayCredentials {
    #[serde(rename = "Urls")]
    pub urls: Vec<String>,
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Password")]
    pub credential: String,
}

impl fmt::Debug for RelayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayCredentials")
            .field("urls", &self.urls)
            .field("username", &self.username)
            .field("credential", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TransportEvents
// ---------------------------------------------------------------------------

/// Subscriber handed to a transport session when it is opened.
#[derive(Clone)]
pub struct TransportEvents {
    session: SessionId,
    tx: mpsc::UnboundedSender<Event>,
}

impl TransportEvents {
    pub(crate) fn new(session: SessionId, tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Deliver one transport event to the turn controller.
    pub fn emit(&self, event: TransportEvent) {
        let session = self.session;
        if self.tx.send(Event::Transport { session, event }).is_err() {
            log::debug!("session {session}: controller gone, transport event dropped");
        }
    }
}

impl fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEvents")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One inbound or outbound media track.
pub trait MediaTrack: Send + Sync {
    fn kind(&self) -> MediaKind;

    /// Stop the track.  Stopping an already-stopped track is not an error.
    fn stop(&self) -> Result<(), TransportError>;
}

/// An open peer-to-peer media session.
pub trait TransportSession: Send + Sync {
    fn add_transceiver(
        &self,
        kind: MediaKind,
        direction: TransceiverDirection,
    ) -> Result<(), TransportError>;

    /// Every inbound and outbound track currently attached to the session.
    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;

    fn close(&self) -> Result<(), TransportError>;
}

/// Opens transport sessions against a relay.
pub trait TransportFactory: Send + Sync {
    fn open(
        &self,
        relay: &RelayCredentials,
        events: TransportEvents,
    ) -> Result<Arc<dyn TransportSession>, TransportError>;
}

const _: fn() = || {
    fn _assert_object_safe(
        _: Box<dyn MediaTrack>,
        _: Box<dyn TransportSession>,
        _: Box<dyn TransportFactory>,
    ) {
    }
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_credentials_parse_token_response() {
        let body = r#"{
            "Urls": ["turn:relay.communication.microsoft.com:3478"],
            "Username": "user-1",
            "Password": "secret"
        }"#;
        let creds: RelayCredentials = serde_json::from_str(body).unwrap();
        assert_eq!(creds.urls.len(), 1);
        assert_eq!(creds.username, "user-1");
        assert_eq!(creds.credential, "secret");
    }

    #[test]
    fn relay_credentials_debug_redacts_password() {
        let creds = RelayCredentials {
            urls: vec![],
            username: "u".into(),
            credential: "secret".into(),
        };
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[test]
    fn transport_events_tag_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = TransportEvents::new(SessionId::new(3), tx);
        events.emit(TransportEvent::StateChanged(ConnectionState::Connected));

        match rx.try_recv().unwrap() {
            Event::Transport { session, event } => {
                assert_eq!(session, SessionId::new(3));
                assert_eq!(event, TransportEvent::StateChanged(ConnectionState::Connected));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
