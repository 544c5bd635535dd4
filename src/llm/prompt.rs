//! Chat message construction for reply requests.
//!
//! [`PromptBuilder`] turns the history window into the `messages` array of a
//! chat-completion request: the system instruction first, then every turn
//! in order.

use serde::Serialize;

use crate::conversation::Turn;

/// Instruction used when the configured one is blank.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Keep responses concise.";

/// One entry of the `messages` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Builds chat-completion message lists.
///
/// # Example
/// ```rust
/// use voice_avatar::conversation::{Role, Turn};
/// use voice_avatar::llm::PromptBuilder;
///
/// let builder = PromptBuilder::new("Answer in one sentence.");
/// let messages = builder.build_messages(&[Turn::new(Role::User, "hi", 0)]);
/// assert_eq!(messages[0].role, "system");
/// assert_eq!(messages[1].content, "hi");
/// ```
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system: String,
}

impl PromptBuilder {
    /// Create a builder; a blank `system_prompt` selects
    /// [`DEFAULT_SYSTEM_PROMPT`].
    pub fn new(system_prompt: &str) -> Self {
        let system = match system_prompt.trim() {
            "" => DEFAULT_SYSTEM_PROMPT.to_string(),
            s => s.to_string(),
        };
        Self { system }
    }

    pub fn system_instruction(&self) -> &str {
        &self.system
    }

    /// System instruction followed by `window` in order.
    pub fn build_messages(&self, window: &[Turn]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(window.len() + 1);
        messages.push(ChatMessage {
            role: "system",
            content: self.system.clone(),
        });
        messages.extend(window.iter().map(|turn| ChatMessage {
            role: turn.role().as_str(),
            content: turn.content().to_string(),
        }));
        messages
    }
}
