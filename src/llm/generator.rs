//! Core `ReplyGenerator` trait and `ChatCompletionGenerator` implementation.
//!
//! `ChatCompletionGenerator` calls a deployment-scoped chat-completions
//! endpoint.  All connection details come from [`ReplyConfig`]; nothing is
//! hardcoded.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ReplyConfig;
use crate::conversation::Turn;
use crate::llm::prompt::PromptBuilder;

// ---------------------------------------------------------------------------
// GenerationError
// ---------------------------------------------------------------------------

/// Errors that can occur while generating a reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The service answered with a non-success status.
    #[error("reply service returned HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    /// The response had no usable `choices[0].message.content`.
    #[error("malformed reply response: {0}")]
    MalformedResponse(String),

    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("reply request timed out")]
    Timeout,
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout
        } else {
            GenerationError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ReplyGenerator trait
// ---------------------------------------------------------------------------

/// Produces the assistant's next reply from the history window.
///
/// Stateless: every call receives the full window, whose last entry is the
/// user turn being answered.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, history: &[Turn]) -> Result<String, GenerationError>;
}

/// Extract the reply text from a chat-completion response body.
///
/// ```
/// use voice_avatar::llm::parse_reply;
///
/// let body = serde_json::json!({
///     "choices": [{ "message": { "role": "assistant", "content": " Hello! " } }]
/// });
/// assert_eq!(parse_reply(&body).unwrap(), "Hello!");
/// ```
pub fn parse_reply(body: &serde_json::Value) -> Result<String, GenerationError> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| {
            GenerationError::MalformedResponse("missing choices[0].message.content".into())
        })?
        .trim();

    if content.is_empty() {
        return Err(GenerationError::MalformedResponse("empty reply".into()));
    }
    Ok(content.to_string())
}

// ---------------------------------------------------------------------------
// ChatCompletionGenerator
// ---------------------------------------------------------------------------

/// Calls `{endpoint}/openai/deployments/{deployment}/chat/completions`.
pub struct ChatCompletionGenerator {
    client: reqwest::Client,
    config: ReplyConfig,
    prompt_builder: PromptBuilder,
}

impl ChatCompletionGenerator {
    /// Build a generator from application config.
    ///
    /// The HTTP client is pre-configured with the per-request timeout from
    /// `config.timeout_secs`.
    pub fn from_config(config: &ReplyConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            prompt_builder: PromptBuilder::new(&config.system_prompt),
            config: config.clone(),
        }
    }

    pub fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.endpoint.trim().trim_end_matches('/'),
            self.config.deployment.trim(),
            self.config.api_version.trim()
        )
    }

    fn request_body(&self, history: &[Turn]) -> serde_json::Value {
        serde_json::json!({
            "messages":    self.prompt_builder.build_messages(history),
            "max_tokens":  self.config.max_tokens,
            "temperature": self.config.temperature
        })
    }
}

#[async_trait]
impl ReplyGenerator for ChatCompletionGenerator {
    async fn generate(&self, history: &[Turn]) -> Result<String, GenerationError> {
        let url = self.completions_url();
        log::debug!("llm: requesting reply for {} turn(s)", history.len());

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.config.api_key)
            .json(&self.request_body(history))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Transport {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        parse_reply(&json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
