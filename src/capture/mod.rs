//! Microphone capture sessions.
//!
//! A [`CaptureSession`] wraps one recognizer lifecycle:
//!
//! ```text
//! open ──▶ start ──▶ (Recognizing / Recognized events update the transcript)
//!            │
//!            ├─ stop ──▶ stop ack ──▶ grace (300 ms) ──▶ finalize ──▶ close
//!            └─ release ──▶ stop ack (best effort) ──▶ close
//! ```
//!
//! The recognizer is closed on every exit path, including drop.

pub mod session;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use session::{CaptureId, CaptureKind, CaptureSession, DEFAULT_CAPTURE_GRACE};
