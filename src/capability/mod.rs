//! Capability interfaces for the external engines the turn loop drives.
//!
//! The concrete speech recognizer, avatar synthesizer and real-time
//! transport live outside this crate.  Each one is described here as an
//! object-safe, `Send + Sync` trait so it can be held behind an `Arc<dyn …>`:
//!
//! ```text
//! RecognizerFactory ──create(RecognitionEvents)──▶ Recognizer
//! TransportFactory  ──open(relay, TransportEvents)─▶ TransportSession ─▶ MediaTrack*
//! SynthesizerFactory ─create(SynthesisRequest)───▶ AvatarSynthesizer
//! ```
//!
//! Engine callbacks are not stored as closures.  Every engine instance is
//! handed a subscriber struct ([`RecognitionEvents`], [`TransportEvents`])
//! that tags each event with the capture or session it belongs to and
//! forwards it to the turn controller, its single consumer.  Events from a
//! torn-down capture or session carry a stale id and are dropped there.

pub mod recognition;
pub mod synthesis;
pub mod transport;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use recognition::{
    CancellationReason, DeviceError, RecognitionEvent, RecognitionEvents, RecognitionReason,
    Recognizer, RecognizerFactory,
};
pub use synthesis::{
    AvatarSynthesizer, EngineError, SpeakOutcome, SynthesisRequest, SynthesizerFactory,
};
pub use transport::{
    ConnectionState, MediaKind, MediaTrack, RelayCredentials, TransceiverDirection,
    TransportError, TransportEvent, TransportEvents, TransportFactory, TransportSession,
};
