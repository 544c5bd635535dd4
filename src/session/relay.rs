//! Relay (TURN) credential issuing.
//!
//! [`HttpRelayTokenProvider`] calls the region-scoped avatar relay-token
//! endpoint, authenticated with the speech subscription key.

use std::time::Duration;

use async_trait::async_trait;

use crate::capability::RelayCredentials;
use crate::session::{ConnectError, SpeechCredentials};

/// Issues relay credentials for a new transport session.
#[async_trait]
pub trait RelayTokenProvider: Send + Sync {
    async fn fetch(&self, speech: &SpeechCredentials) -> Result<RelayCredentials, ConnectError>;
}

/// `GET https://{region}.tts.speech.microsoft.com/cognitiveservices/avatar/relay/token/v1`.
pub struct HttpRelayTokenProvider {
    client: reqwest::Client,
}

impl HttpRelayTokenProvider {
    /// Build a provider whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// Relay-token endpoint for `region`.
    ///
    /// ```
    /// use voice_avatar::session::HttpRelayTokenProvider;
    ///
    /// assert_eq!(
    ///     HttpRelayTokenProvider::token_url("westus2"),
    ///     "https://westus2.tts.speech.microsoft.com/cognitiveservices/avatar/relay/token/v1"
    /// );
    /// ```
    pub fn token_url(region: &str) -> String {
        format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/avatar/relay/token/v1",
            region.trim()
        )
    }
}

#[async_trait]
impl RelayTokenProvider for HttpRelayTokenProvider {
    async fn fetch(&self, speech: &SpeechCredentials) -> Result<RelayCredentials, ConnectError> {
        let url = Self::token_url(&speech.region);

        let response = self
            .client
            .get(&url)
            .header("Ocp-Apim-Subscription-Key", &speech.key)
            .send()
            .await
            .map_err(|e| ConnectError::CredentialFetchFailed {
                status: None,
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectError::CredentialFetchFailed {
                status: Some(status.as_u16()),
                detail: format!("HTTP {status}: {body}"),
            });
        }

        response
            .json::<RelayCredentials>()
            .await
            .map_err(|e| ConnectError::CredentialFetchFailed {
                status: Some(status.as_u16()),
                detail: format!("malformed relay token response: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_url_trims_region() {
        assert_eq!(
            HttpRelayTokenProvider::token_url(" eastus "),
            "https://eastus.tts.speech.microsoft.com/cognitiveservices/avatar/relay/token/v1"
        );
    }

    #[test]
    fn provider_is_object_safe() {
        let _: Box<dyn RelayTokenProvider> =
            Box::new(HttpRelayTokenProvider::new(Duration::from_secs(10)));
    }
}
