//! Reply generation for the avatar's side of the conversation.
//!
//! This module provides:
//! * [`ReplyGenerator`]: async trait implemented by all reply backends.
//! * [`ChatCompletionGenerator`]: chat-completions REST backend.
//! * [`PromptBuilder`]: system instruction + history window → messages.
//! * [`GenerationError`]: error variants for reply generation.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voice_avatar::config::AppConfig;
//! use voice_avatar::conversation::{HistoryBuffer, Role};
//! use voice_avatar::llm::{ChatCompletionGenerator, ReplyGenerator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let generator = ChatCompletionGenerator::from_config(&config.reply);
//!
//!     let mut history = HistoryBuffer::new();
//!     history.record(Role::User, "Hello there");
//!
//!     let reply = generator.generate(&history.window()).await.unwrap();
//!     history.record(Role::Assistant, reply.clone());
//!     println!("{}", reply);
//! }
//! ```

pub mod generator;
pub mod prompt;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use generator::{parse_reply, ChatCompletionGenerator, GenerationError, ReplyGenerator};
pub use prompt::{ChatMessage, PromptBuilder, DEFAULT_SYSTEM_PROMPT};
