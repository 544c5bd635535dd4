//! One open microphone-recognition stream bound to a transcript.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::capability::{
    CancellationReason, DeviceError, RecognitionEvents, Recognizer, RecognizerFactory,
};
use crate::controller::Event;
use crate::conversation::TranscriptAccumulator;

/// Wait between the recognizer's stop acknowledgement and finalizing the
/// transcript.  Recognizers may deliver one more final segment after
/// acknowledging a stop; finalizing earlier loses trailing words.
pub const DEFAULT_CAPTURE_GRACE: Duration = Duration::from_millis(300);

// ---------------------------------------------------------------------------
// CaptureId / CaptureKind
// ---------------------------------------------------------------------------

/// Identifies one capture; events tagged with an older id are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaptureId(u64);

impl CaptureId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which input mode opened the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    /// Held (or toggled) by the user; finalized into one utterance on release.
    PushToTalk,
    /// Always listening; every final segment is dispatched on its own.
    Continuous,
}

// ---------------------------------------------------------------------------
// CaptureSession
// ---------------------------------------------------------------------------

/// One microphone-recognition stream and its pending utterance.
///
/// The transcript is written only by this session's [`RecognitionEvents`]
/// subscriber and read only by [`stop`](Self::stop).
pub struct CaptureSession {
    id: CaptureId,
    kind: CaptureKind,
    recognizer: Arc<dyn Recognizer>,
    transcript: Arc<Mutex<TranscriptAccumulator>>,
    grace: Duration,
    active: bool,
}

impl CaptureSession {
    /// Create the recognizer for a new capture and subscribe it to `tx`.
    ///
    /// The session is not listening yet; call [`start`](Self::start).
    pub fn open(
        id: CaptureId,
        kind: CaptureKind,
        recognizers: &dyn RecognizerFactory,
        tx: mpsc::UnboundedSender<Event>,
        grace: Duration,
    ) -> Result<Self, DeviceError> {
        let transcript = Arc::new(Mutex::new(TranscriptAccumulator::new()));
        let events = RecognitionEvents::new(id, Arc::clone(&transcript), tx);
        let recognizer = recognizers.create(events)?;

        log::debug!("capture {id}: opened ({kind:?})");

        Ok(Self {
            id,
            kind,
            recognizer,
            transcript,
            grace,
            active: false,
        })
    }

    pub fn id(&self) -> CaptureId {
        self.id
    }

    pub fn kind(&self) -> CaptureKind {
        self.kind
    }

    /// `true` once the recognizer acknowledged the start.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Request continuous recognition.
    ///
    /// On failure the recognizer is closed and the session stays inactive.
    pub async fn start(&mut self) -> Result<(), DeviceError> {
        self.lock_transcript().reset();

        match self.recognizer.start_continuous().await {
            Ok(()) => {
                self.active = true;
                log::info!("capture {}: recognition started", self.id);
                Ok(())
            }
            Err(e) => {
                log::warn!("capture {}: recognizer rejected start: {e}", self.id);
                self.recognizer.close();
                Err(e)
            }
        }
    }

    /// Stop recognition and return the finalized utterance.
    ///
    /// Ordering is strict: stop acknowledged → grace interval → finalize.
    /// The recognizer is closed whatever the outcome.
    pub async fn stop(mut self) -> Result<String, DeviceError> {
        self.active = false;

        if let Err(e) = self.recognizer.stop_continuous().await {
            log::warn!("capture {}: stop failed: {e}", self.id);
            self.recognizer.close();
            return Err(e);
        }

        tokio::time::sleep(self.grace).await;

        let text = self.lock_transcript().finalize();
        self.recognizer.close();
        log::debug!("capture {}: finalized {:?}", self.id, text);
        Ok(text)
    }

    /// Stop (best effort) and close without producing an utterance.
    pub async fn release(mut self) {
        self.active = false;
        if let Err(e) = self.recognizer.stop_continuous().await {
            log::warn!("capture {}: stop during release failed: {e}", self.id);
        }
        self.recognizer.close();
        self.lock_transcript().reset();
        log::debug!("capture {}: released", self.id);
    }

    /// React to a cancellation reported by the recognizer.
    ///
    /// Returns the user-visible message for engine errors (and closes the
    /// recognizer); normal cancellations return `None`.
    pub fn on_cancel(&mut self, reason: CancellationReason, detail: Option<&str>) -> Option<String> {
        match reason {
            CancellationReason::Error => {
                self.active = false;
                self.recognizer.close();
                let detail = detail.unwrap_or("unknown error");
                log::error!("capture {}: recognition canceled: {detail}", self.id);
                Some(format!("Speech recognition error: {detail}"))
            }
            CancellationReason::EndOfStream => {
                log::debug!("capture {}: recognition canceled (end of stream)", self.id);
                None
            }
        }
    }

    fn lock_transcript(&self) -> std::sync::MutexGuard<'_, TranscriptAccumulator> {
        self.transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        // `close` is idempotent; this covers sessions dropped on stale paths.
        self.recognizer.close();
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
