//! Offline reply generator.

use async_trait::async_trait;

use crate::conversation::{Role, Turn};
use crate::llm::{GenerationError, ReplyGenerator};

/// Answers every turn by repeating the latest user message.
///
/// Used when no reply endpoint is configured so the turn loop can still be
/// exercised end to end.
///
/// # Example
/// ```rust
/// use voice_avatar::conversation::{Role, Turn};
/// use voice_avatar::llm::ReplyGenerator;
/// use voice_avatar::loopback::EchoGenerator;
///
/// # tokio_test_block(async {
/// let history = vec![Turn::new(Role::User, "hello", 1)];
/// let reply = EchoGenerator.generate(&history).await.unwrap();
/// assert_eq!(reply, "You said: hello");
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f);
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoGenerator;

#[async_trait]
impl ReplyGenerator for EchoGenerator {
    async fn generate(&self, history: &[Turn]) -> Result<String, GenerationError> {
        let last = history
            .iter()
            .rev()
            .find(|turn| turn.role() == Role::User)
            .ok_or_else(|| GenerationError::Request("no user turn to answer".into()))?;

        log::debug!("llm: echoing turn {}", last.ordinal());
        Ok(format!("You said: {}", last.content()))
    }
}
