//! Turn-loop modes and shared conversation state.
//!
//! [`Mode`] drives the controller's state machine.  A UI reads it via
//! [`SharedState`] alongside the latest indicator text and session phase.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<ConversationState>>`:
//! cheap to clone and safe to share across threads.

use std::sync::{Arc, Mutex};

use crate::session::SessionPhase;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Input/output mode of the turn loop.  Exactly one holds at any instant.
///
/// ```text
/// Idle ──ptt down──▶ ListeningPushToTalk ──ptt up──▶ Thinking
/// Idle ──toggle────▶ ListeningContinuous ──final───▶ Thinking
/// Idle ──typed text──────────────────────────────────▶ Thinking
/// Thinking ──reply──▶ Speaking ──done──▶ ListeningContinuous (continuous on)
///                                   └──▶ Idle
/// any ──error / stop──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Idle,
    ListeningPushToTalk,
    ListeningContinuous,
    /// An utterance is being finalized or a reply is being generated.
    Thinking,
    /// The avatar is speaking; no capture may be live.
    Speaking,
}

impl Mode {
    /// ```
    /// use voice_avatar::controller::Mode;
    ///
    /// assert!(Mode::ListeningPushToTalk.is_listening());
    /// assert!(Mode::ListeningContinuous.is_listening());
    /// assert!(!Mode::Speaking.is_listening());
    /// ```
    pub fn is_listening(&self) -> bool {
        matches!(self, Mode::ListeningPushToTalk | Mode::ListeningContinuous)
    }

    /// `true` while a turn is being answered.
    pub fn is_busy(&self) -> bool {
        matches!(self, Mode::Thinking | Mode::Speaking)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Idle => "Ready",
            Mode::ListeningPushToTalk => "Listening (push-to-talk)",
            Mode::ListeningContinuous => "Listening",
            Mode::Thinking => "Thinking",
            Mode::Speaking => "Speaking",
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationState
// ---------------------------------------------------------------------------

/// Snapshot of the turn loop for readers outside the controller task.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub mode: Mode,
    pub session: SessionPhase,
    /// Continuous listening is switched on (it may be paused).
    pub continuous: bool,
    /// Text of the conversation indicator.
    pub indicator: String,
    /// Last surfaced error, cleared when a new turn starts.
    pub error_message: Option<String>,
    /// Completed turns in the current history.
    pub turns: usize,
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            mode: Mode::Idle,
            session: SessionPhase::Disconnected,
            continuous: false,
            indicator: "Ready".into(),
            error_message: None,
            turns: 0,
        }
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`ConversationState`].
///
/// Do **not** hold the lock across `.await` points.
pub type SharedState = Arc<Mutex<ConversationState>>;

pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(ConversationState::new()))
}
