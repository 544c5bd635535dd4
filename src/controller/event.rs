//! Inputs to the turn controller's event loop.

use crate::capability::{DeviceError, RecognitionEvent, TransportEvent};
use crate::capture::{CaptureId, CaptureSession};
use crate::controller::timers::TimerPurpose;
use crate::llm::GenerationError;
use crate::session::{ConnectError, LiveSession, SessionId, SpeakError};

/// Commands issued by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Connect the avatar session.
    Start,
    /// Tear everything down.
    Stop,
    /// Push-to-talk pressed.  Pressing again while capturing submits.
    PushToTalkDown,
    PushToTalkUp,
    ToggleContinuous,
    SubmitText(String),
    ClearHistory,
}

/// Internal events delivered to the controller: completions of spawned
/// work, capability callbacks, and timers.
///
/// Completions of spawned work carry the id they were started for; the
/// controller drops any whose id is no longer current.
#[derive(Debug)]
pub enum Event {
    ConnectFinished {
        session: SessionId,
        result: Result<LiveSession, ConnectError>,
    },
    Transport {
        session: SessionId,
        event: TransportEvent,
    },

    Recognition {
        capture: CaptureId,
        event: RecognitionEvent,
    },
    CaptureStarted {
        capture: CaptureId,
        result: Result<CaptureSession, DeviceError>,
    },
    /// A push-to-talk capture finished stopping; `Ok` carries the utterance.
    CaptureFinished {
        capture: CaptureId,
        result: Result<String, DeviceError>,
    },
    /// A capture was released without producing an utterance.
    CaptureReleased { capture: CaptureId },

    ReplyReady {
        turn: u64,
        result: Result<String, GenerationError>,
    },
    SpeechFinished {
        turn: u64,
        result: Result<(), SpeakError>,
    },

    Timer { purpose: TimerPurpose, epoch: u64 },
}
