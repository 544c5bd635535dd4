//! Events emitted towards the rendering surface.

use crate::capability::MediaKind;
use crate::controller::Mode;
use crate::conversation::Turn;

/// Connection status of the avatar, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl AvatarStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AvatarStatus::Disconnected => "Disconnected",
            AvatarStatus::Connecting => "Connecting...",
            AvatarStatus::Connected => "Connected",
            AvatarStatus::Error => "Error",
        }
    }
}

/// Microphone status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicStatus {
    Off,
    Listening,
}

impl MicStatus {
    pub fn label(&self) -> &'static str {
        match self {
            MicStatus::Off => "Off",
            MicStatus::Listening => "Listening...",
        }
    }
}

/// Visual state of the conversation indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Ready,
    Listening,
    Thinking,
    Speaking,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Which controls are currently usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Controls {
    pub start: bool,
    pub stop: bool,
    /// Push-to-talk, continuous toggle and typed text.
    pub voice: bool,
}

/// One presentation update.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Mode(Mode),
    Avatar(AvatarStatus),
    Mic(MicStatus),
    /// Indicator state plus its text; live partial transcripts arrive here.
    Indicator { state: IndicatorState, text: String },
    Controls(Controls),
    VoiceHint(String),
    TurnAdded(Turn),
    HistoryCleared,
    Notice { level: NoticeLevel, message: String },
    /// A connect failed; the configuration should be reopened.
    ConfigurationRequired { reason: String },
    TrackReceived(MediaKind),
}

/// Renders turn-loop status.
///
/// Implementations must not block; they are called from the controller's
/// event loop.
pub trait PresentationSink: Send + Sync {
    fn notify(&self, event: SinkEvent);
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn PresentationSink>) {}
};
