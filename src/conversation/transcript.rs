//! Pending-utterance accumulator for one capture.
//!
//! Streaming recognizers emit many partial hypotheses before a final
//! segment, and each one supersedes the previous.  The accumulator therefore
//! overwrites instead of appending; only the value present when the capture
//! stops is finalized.

use crate::capability::RecognitionReason;

/// Holds the latest recognized text of the in-progress turn.
///
/// # Example
/// ```rust
/// use voice_avatar::capability::RecognitionReason;
/// use voice_avatar::conversation::TranscriptAccumulator;
///
/// let mut acc = TranscriptAccumulator::new();
/// acc.on_partial("he");
/// acc.on_partial("hello");
/// acc.on_final_segment(RecognitionReason::RecognizedSpeech, "hello there ");
/// assert_eq!(acc.finalize(), "hello there");
/// assert_eq!(acc.finalize(), "");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TranscriptAccumulator {
    pending: String,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending text with a partial hypothesis.
    pub fn on_partial(&mut self, text: &str) {
        self.pending.clear();
        self.pending.push_str(text);
    }

    /// Replace the pending text with a final segment.
    ///
    /// `NoMatch` results carry no usable text and leave the pending value
    /// untouched.
    pub fn on_final_segment(&mut self, reason: RecognitionReason, text: &str) {
        match reason {
            RecognitionReason::RecognizedSpeech => {
                self.pending.clear();
                self.pending.push_str(text);
            }
            RecognitionReason::NoMatch => {
                log::debug!("capture: final segment reported no match");
            }
        }
    }

    /// Return the trimmed pending text and clear it.
    pub fn finalize(&mut self) -> String {
        let text = self.pending.trim().to_string();
        self.pending.clear();
        text
    }

    /// Discard anything pending (start of a new capture).
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Current pending text, untrimmed.
    pub fn pending(&self) -> &str {
        &self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partials_then_final_yield_final() {
        let mut acc = TranscriptAccumulator::new();
        acc.on_partial("a");
        acc.on_partial("ab");
        acc.on_final_segment(RecognitionReason::RecognizedSpeech, "abc");
        assert_eq!(acc.finalize(), "abc");
    }

    #[test]
    fn finalize_without_input_is_empty() {
        let mut acc = TranscriptAccumulator::new();
        assert_eq!(acc.finalize(), "");
    }

    #[test]
    fn partials_overwrite_rather_than_append() {
        let mut acc = TranscriptAccumulator::new();
        acc.on_partial("he");
        acc.on_partial("hello");
        assert_eq!(acc.pending(), "hello");
    }

    #[test]
    fn no_match_keeps_previous_text() {
        let mut acc = TranscriptAccumulator::new();
        acc.on_partial("hello");
        acc.on_final_segment(RecognitionReason::NoMatch, "");
        assert_eq!(acc.finalize(), "hello");
    }

    #[test]
    fn later_partial_supersedes_final() {
        let mut acc = TranscriptAccumulator::new();
        acc.on_final_segment(RecognitionReason::RecognizedSpeech, "first sentence");
        acc.on_partial("second");
        assert_eq!(acc.finalize(), "second");
    }

    #[test]
    fn finalize_trims_and_clears() {
        let mut acc = TranscriptAccumulator::new();
        acc.on_partial("  spaced out  ");
        assert_eq!(acc.finalize(), "spaced out");
        assert_eq!(acc.pending(), "");
    }

    #[test]
    fn reset_discards_pending() {
        let mut acc = TranscriptAccumulator::new();
        acc.on_partial("stale");
        acc.reset();
        assert_eq!(acc.finalize(), "");
    }
}
