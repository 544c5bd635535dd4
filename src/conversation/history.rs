//! Rolling conversation history.
//!
//! [`HistoryBuffer`] keeps the most recent turns (20 by default, i.e. ten
//! user/assistant exchanges) and hands a cloned window to the reply
//! generator.  Older turns fall off the front; relative order never changes.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Default number of turns retained (ten exchanges).
pub const DEFAULT_MAX_TURNS: usize = 20;

/// Largest capacity a buffer accepts; bigger requests are clamped.
pub const MAX_TURNS_LIMIT: usize = 200;

// ---------------------------------------------------------------------------
// Role / Turn
// ---------------------------------------------------------------------------

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion endpoints.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message exchanged by the user or the assistant.
///
/// Immutable once created: fields are private and only exposed through
/// getters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    content: String,
    ordinal: u64,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>, ordinal: u64) -> Self {
        Self {
            role,
            content: content.into(),
            ordinal,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Position of this turn in the whole conversation, starting at 0.
    ///
    /// Ordinals keep increasing across [`HistoryBuffer::clear`].
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }
}

// ---------------------------------------------------------------------------
// HistoryBuffer
// ---------------------------------------------------------------------------

/// Bounded, ordered record of exchanged turns.
///
/// # Example
/// ```rust
/// use voice_avatar::conversation::{HistoryBuffer, Role};
///
/// let mut history = HistoryBuffer::new();
/// history.record(Role::User, "hello");
/// history.record(Role::Assistant, "hi there");
/// assert_eq!(history.len(), 2);
/// assert_eq!(history.window()[1].content(), "hi there");
/// ```
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    turns: VecDeque<Turn>,
    max_turns: usize,
    next_ordinal: u64,
}

impl HistoryBuffer {
    /// Buffer with the default capacity of [`DEFAULT_MAX_TURNS`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_TURNS)
    }

    /// Buffer holding at most `max_turns` turns, clamped to
    /// `2..=`[`MAX_TURNS_LIMIT`] so a full exchange always fits.
    pub fn with_capacity(max_turns: usize) -> Self {
        let max_turns = max_turns.clamp(2, MAX_TURNS_LIMIT);
        Self {
            turns: VecDeque::with_capacity(max_turns + 1),
            max_turns,
            next_ordinal: 0,
        }
    }

    /// Append `turn` at the end, then drop from the front until the buffer
    /// is back within capacity.
    pub fn append(&mut self, turn: Turn) {
        self.next_ordinal = self.next_ordinal.max(turn.ordinal.saturating_add(1));
        self.turns.push_back(turn);

        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    /// Create a turn with the next ordinal, append it and return a copy.
    pub fn record(&mut self, role: Role, content: impl Into<String>) -> Turn {
        let turn = Turn::new(role, content, self.next_ordinal);
        self.append(turn.clone());
        turn
    }

    /// Snapshot of the retained turns, oldest first.
    pub fn window(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    /// Drop every retained turn.
    ///
    /// Windows already handed out are independent copies and stay intact.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_turns
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let history = HistoryBuffer::new();
        assert!(history.is_empty());
        assert_eq!(history.capacity(), 20);
        assert!(history.window().is_empty());
    }

    #[test]
    fn append_keeps_insertion_order() {
        let mut history = HistoryBuffer::new();
        history.record(Role::User, "hello");
        history.record(Role::Assistant, "hi there");

        let window = history.window();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].role(), Role::User);
        assert_eq!(window[0].content(), "hello");
        assert_eq!(window[1].role(), Role::Assistant);
        assert_eq!(window[1].content(), "hi there");
    }

    #[test]
    fn never_exceeds_twenty_and_drops_oldest() {
        let mut history = HistoryBuffer::new();
        for i in 0..57 {
            history.record(Role::User, format!("turn {i}"));
            assert!(history.len() <= 20);
        }

        let window = history.window();
        assert_eq!(window.len(), 20);
        assert_eq!(window.first().unwrap().content(), "turn 37");
        assert_eq!(window.last().unwrap().content(), "turn 56");

        // Retained ordinals are strictly increasing.
        assert!(window.windows(2).all(|w| w[0].ordinal() < w[1].ordinal()));
    }

    #[test]
    fn clear_does_not_touch_handed_out_windows() {
        let mut history = HistoryBuffer::new();
        history.record(Role::User, "hello");
        let in_flight = history.window();

        history.clear();

        assert!(history.is_empty());
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight[0].content(), "hello");
    }

    #[test]
    fn ordinals_continue_after_clear() {
        let mut history = HistoryBuffer::new();
        history.record(Role::User, "a");
        history.record(Role::Assistant, "b");
        history.clear();

        let turn = history.record(Role::User, "c");
        assert_eq!(turn.ordinal(), 2);
    }

    #[test]
    fn capacity_is_clamped_to_one_exchange() {
        let mut history = HistoryBuffer::with_capacity(0);
        history.record(Role::User, "q");
        history.record(Role::Assistant, "a");
        history.record(Role::User, "q2");
        assert_eq!(history.len(), 2);
        assert_eq!(history.window()[0].content(), "a");
    }

    #[test]
    fn oversized_capacity_is_clamped() {
        let history = HistoryBuffer::with_capacity(usize::MAX);
        assert_eq!(history.capacity(), MAX_TURNS_LIMIT);
        assert_eq!(HistoryBuffer::with_capacity(64).capacity(), 64);
    }

    #[test]
    fn append_at_the_last_ordinal_does_not_overflow() {
        let mut history = HistoryBuffer::new();
        history.append(Turn::new(Role::User, "far future", u64::MAX));

        let next = history.record(Role::Assistant, "still here");
        assert_eq!(next.ordinal(), u64::MAX);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn role_wire_names() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }
}
