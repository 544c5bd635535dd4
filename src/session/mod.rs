//! Live avatar session: relay credentials, transport, and speech output.
//!
//! [`LiveSessionManager`] owns the single [`LiveSession`] and enforces that a
//! new one is only created after the previous one is fully released and the
//! settle delay has elapsed.

pub mod avatar;
pub mod error;
pub mod manager;
pub mod relay;

pub use avatar::{AvatarSelection, FALLBACK_CHARACTER, FALLBACK_STYLE};
pub use error::{ConnectError, SpeakError};
pub use manager::{
    ConnectJob, ConnectRequest, LiveSession, LiveSessionManager, ReplyCredentials, SessionId,
    SessionPhase, SessionTiming, Speaker, SpeechCredentials, TransportNotice,
};
pub use relay::{HttpRelayTokenProvider, RelayTokenProvider};
