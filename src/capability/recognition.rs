//! Speech-recognition capability.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::capture::CaptureId;
use crate::controller::Event;
use crate::conversation::TranscriptAccumulator;

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Microphone / recognizer failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// No usable input device, or the engine refused to open it.
    #[error("microphone unavailable: {0}")]
    Unavailable(String),

    /// The user or the platform denied microphone access.
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    /// The recognizer did not acknowledge a stop request.
    #[error("recognizer failed to stop: {0}")]
    Stop(String),
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Outcome attached to a final recognition result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionReason {
    /// Speech was recognized; the text is usable.
    RecognizedSpeech,
    /// Audio was heard but nothing could be matched.
    NoMatch,
}

/// Why a recognition stream was canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationReason {
    /// The audio source ended (normal stop).
    EndOfStream,
    /// The engine hit an internal error; `detail` explains it.
    Error,
}

/// Events emitted by a running recognizer, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Intermediate hypothesis for the utterance in progress.
    Recognizing(String),
    /// A completed segment.
    Recognized {
        reason: RecognitionReason,
        text: String,
    },
    /// The stream was canceled.
    Canceled {
        reason: CancellationReason,
        detail: Option<String>,
    },
}

/// Subscriber handed to a recognizer when it is created.
///
/// Every emitted event updates the owning capture's pending utterance and
/// is forwarded to the turn controller tagged with the capture id.  Cheap
/// to clone.
#[derive(Clone)]
pub struct RecognitionEvents {
    capture: CaptureId,
    transcript: Arc<Mutex<TranscriptAccumulator>>,
    tx: mpsc::UnboundedSender<Event>,
}

impl RecognitionEvents {
    pub(crate) fn new(
        capture: CaptureId,
        transcript: Arc<Mutex<TranscriptAccumulator>>,
        tx: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            capture,
            transcript,
            tx,
        }
    }

    /// Capture this subscriber belongs to.
    pub fn capture(&self) -> CaptureId {
        self.capture
    }

    /// Deliver one recognizer event.
    pub fn emit(&self, event: RecognitionEvent) {
        {
            let mut acc = self
                .transcript
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match &event {
                RecognitionEvent::Recognizing(text) if !text.is_empty() => acc.on_partial(text),
                RecognitionEvent::Recognized { reason, text } if !text.is_empty() => {
                    acc.on_final_segment(*reason, text)
                }
                _ => {}
            }
        }

        let capture = self.capture;
        if self.tx.send(Event::Recognition { capture, event }).is_err() {
            log::debug!("capture {capture}: controller gone, recognition event dropped");
        }
    }
}

impl std::fmt::Debug for RecognitionEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionEvents")
            .field("capture", &self.capture)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Recognizer
// ---------------------------------------------------------------------------

/// One continuous-recognition stream bound to the default microphone.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Begin continuous recognition.  Resolves once the engine acknowledges
    /// the start.
    async fn start_continuous(&self) -> Result<(), DeviceError>;

    /// Stop continuous recognition.  Resolves once the engine acknowledges
    /// the stop; trailing events may still arrive afterwards.
    async fn stop_continuous(&self) -> Result<(), DeviceError>;

    /// Release the underlying stream.  Must be safe to call more than once.
    fn close(&self);
}

/// Creates a fresh [`Recognizer`] for every capture.
pub trait RecognizerFactory: Send + Sync {
    fn create(&self, events: RecognitionEvents) -> Result<Arc<dyn Recognizer>, DeviceError>;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Recognizer>, _: Box<dyn RecognizerFactory>) {}
};
