//! Speech-output / avatar capability.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::capability::TransportSession;
use crate::session::{AvatarSelection, SpeechCredentials};

/// Failure reported by the speech-output engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("speech engine error: {0}")]
pub struct EngineError(pub String);

/// Result of one `speak_text` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// All audio/video for the text was produced.
    Completed,
    /// The engine canceled synthesis; `detail` is its explanation.
    Canceled { detail: String },
}

/// Everything needed to build a synthesizer for one session.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub speech: &'a SpeechCredentials,
    pub voice: &'a str,
    pub avatar: &'a AvatarSelection,
}

/// Talking-avatar engine producing media over a transport session.
#[async_trait]
pub trait AvatarSynthesizer: Send + Sync {
    /// Start streaming the avatar over `transport`.  Resolves once the
    /// engine reports it is ready.
    async fn start_avatar(&self, transport: Arc<dyn TransportSession>) -> Result<(), EngineError>;

    /// Speak `text`.  Resolves when the utterance finishes or is canceled.
    async fn speak_text(&self, text: &str) -> Result<SpeakOutcome, EngineError>;

    /// Interrupt any utterance in progress.
    async fn stop_speaking(&self) -> Result<(), EngineError>;

    /// Release the engine.  Must be safe to call more than once.
    fn close(&self) -> Result<(), EngineError>;
}

/// Creates one [`AvatarSynthesizer`] per session.
pub trait SynthesizerFactory: Send + Sync {
    fn create(
        &self,
        request: &SynthesisRequest<'_>,
    ) -> Result<Arc<dyn AvatarSynthesizer>, EngineError>;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn AvatarSynthesizer>, _: Box<dyn SynthesizerFactory>) {}
};
