//! Conversation data: the bounded turn history and the transcript
//! accumulator that merges streaming recognition results.
//!
//! * [`HistoryBuffer`]: rolling window of the last 20 [`Turn`]s that feeds
//!   every reply request.
//! * [`TranscriptAccumulator`]: the pending utterance of one capture, with
//!   last-write-wins semantics for partial and final results.

pub mod history;
pub mod transcript;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use history::{HistoryBuffer, Role, Turn, DEFAULT_MAX_TURNS, MAX_TURNS_LIMIT};
pub use transcript::TranscriptAccumulator;
