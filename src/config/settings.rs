//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::session::{
    AvatarSelection, ConnectRequest, ReplyCredentials, SessionTiming, SpeechCredentials,
};

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Speech service subscription and voice settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Subscription key.  Empty until configured.
    pub key: String,
    /// Service region, e.g. `"westus2"`.
    pub region: String,
    /// Synthesis voice for the avatar.
    pub voice_name: String,
    /// Recognition language passed to the recognizer factory.
    pub recognition_language: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            region: "westus2".into(),
            voice_name: "en-US-AvaMultilingualNeural".into(),
            recognition_language: "en-US".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ReplyConfig
// ---------------------------------------------------------------------------

/// Chat-completion deployment used to generate replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    /// System instruction prepended to every request.
    pub system_prompt: String,
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f32,
    /// Maximum seconds to wait for a reply before timing out.
    pub timeout_secs: u64,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            deployment: "gpt-4o-mini".into(),
            api_version: "2024-02-15-preview".into(),
            system_prompt: "You are a helpful assistant. Keep responses concise.".into(),
            max_tokens: 150,
            temperature: 0.7,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// TimingConfig
// ---------------------------------------------------------------------------

/// Delays and timeouts of the turn loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait after a recognizer stop before finalizing the utterance.
    pub capture_grace_ms: u64,
    /// Delay before continuous listening resumes after the avatar speaks.
    pub resume_delay_ms: u64,
    /// Delay before a canceled continuous recognizer is restarted.
    pub restart_delay_ms: u64,
    /// How long a transient voice hint stays before reverting to "Ready".
    pub hint_reset_ms: u64,
    /// Pause after teardown before another connect is allowed.
    pub settle_delay_ms: u64,
    /// Bound on the avatar startup handshake.
    pub startup_timeout_secs: u64,
    /// Wait for inbound video before declaring the avatar unavailable.
    /// `0` disables the check.
    pub media_grace_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            capture_grace_ms: 300,
            resume_delay_ms: 500,
            restart_delay_ms: 1_000,
            hint_reset_ms: 2_000,
            settle_delay_ms: 2_000,
            startup_timeout_secs: 30,
            media_grace_secs: 15,
        }
    }
}

impl TimingConfig {
    pub fn session_timing(&self) -> SessionTiming {
        SessionTiming {
            startup_timeout: Duration::from_secs(self.startup_timeout_secs),
            media_grace: (self.media_grace_secs > 0)
                .then(|| Duration::from_secs(self.media_grace_secs)),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// HistoryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Turns kept in the rolling window (two per exchange), clamped to
    /// 2..=200 when the buffer is built.
    pub max_turns: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: crate::conversation::DEFAULT_MAX_TURNS,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_avatar::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub speech: SpeechConfig,
    pub reply: ReplyConfig,
    /// Avatar character and style.
    pub avatar: AvatarSelection,
    pub timing: TimingConfig,
    pub history: HistoryConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay credentials from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Overlay credentials from `lookup`; empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fields: [(&str, &mut String); 5] = [
            ("AZURE_SPEECH_KEY", &mut self.speech.key),
            ("AZURE_SPEECH_REGION", &mut self.speech.region),
            ("AZURE_OPENAI_ENDPOINT", &mut self.reply.endpoint),
            ("AZURE_OPENAI_KEY", &mut self.reply.api_key),
            ("AZURE_OPENAI_DEPLOYMENT", &mut self.reply.deployment),
        ];
        for (name, field) in fields {
            if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
                log::debug!("config: {name} taken from environment");
                *field = value.trim().to_string();
            }
        }
    }

    /// Names of required settings that are still empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let required = [
            ("speech.key", &self.speech.key),
            ("speech.region", &self.speech.region),
            ("reply.endpoint", &self.reply.endpoint),
            ("reply.api_key", &self.reply.api_key),
            ("reply.deployment", &self.reply.deployment),
        ];
        required
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }

    /// The connect request described by this configuration.
    pub fn connect_request(&self) -> ConnectRequest {
        ConnectRequest {
            speech: SpeechCredentials::new(self.speech.key.trim(), self.speech.region.trim()),
            reply: ReplyCredentials::new(self.reply.endpoint.trim(), self.reply.api_key.trim()),
            voice: self.speech.voice_name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.speech.region, loaded.speech.region);
        assert_eq!(original.speech.voice_name, loaded.speech.voice_name);
        assert_eq!(original.reply.api_version, loaded.reply.api_version);
        assert_eq!(original.reply.system_prompt, loaded.reply.system_prompt);
        assert_eq!(original.reply.max_tokens, loaded.reply.max_tokens);
        assert_eq!(original.reply.temperature, loaded.reply.temperature);
        assert_eq!(original.avatar, loaded.avatar);
        assert_eq!(original.timing, loaded.timing);
        assert_eq!(original.history, loaded.history);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.timing, TimingConfig::default());
        assert_eq!(config.avatar, AvatarSelection::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[avatar]\ncharacter = \"harry\"\nstyle = \"business\"\n\n[timing]\nmedia_grace_secs = 0\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.avatar, AvatarSelection::new("harry", "business"));
        assert_eq!(config.timing.media_grace_secs, 0);
        assert_eq!(config.timing.capture_grace_ms, 300);
        assert_eq!(config.reply.max_tokens, 150);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.reply.max_tokens, 150);
        assert!((cfg.reply.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(
            cfg.reply.system_prompt,
            "You are a helpful assistant. Keep responses concise."
        );
        assert_eq!(cfg.timing.resume_delay_ms, 500);
        assert_eq!(cfg.timing.restart_delay_ms, 1_000);
        assert_eq!(cfg.timing.settle_delay_ms, 2_000);
        assert_eq!(cfg.timing.startup_timeout_secs, 30);
        assert_eq!(cfg.history.max_turns, 20);
        assert_eq!(cfg.avatar, AvatarSelection::new("lisa", "casual-sitting"));
    }

    #[test]
    fn session_timing_maps_zero_grace_to_disabled() {
        let mut timing = TimingConfig::default();
        assert_eq!(
            timing.session_timing().media_grace,
            Some(Duration::from_secs(15))
        );

        timing.media_grace_secs = 0;
        assert_eq!(timing.session_timing().media_grace, None);
        assert_eq!(timing.session_timing().settle_delay, Duration::from_secs(2));
    }

    #[test]
    fn missing_fields_lists_empty_credentials() {
        let cfg = AppConfig::default();
        assert_eq!(
            cfg.missing_fields(),
            vec!["speech.key", "reply.endpoint", "reply.api_key"]
        );
    }

    #[test]
    fn overrides_fill_credentials() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(|name| match name {
            "AZURE_SPEECH_KEY" => Some("speech-key".into()),
            "AZURE_OPENAI_ENDPOINT" => Some(" https://example.openai.azure.com ".into()),
            "AZURE_OPENAI_KEY" => Some("reply-key".into()),
            "AZURE_SPEECH_REGION" => Some("  ".into()),
            _ => None,
        });

        assert_eq!(cfg.speech.key, "speech-key");
        assert_eq!(cfg.speech.region, "westus2");
        assert_eq!(cfg.reply.endpoint, "https://example.openai.azure.com");
        assert!(cfg.missing_fields().is_empty());
    }

    #[test]
    fn connect_request_trims_credentials() {
        let mut cfg = AppConfig::default();
        cfg.speech.key = " k ".into();
        let request = cfg.connect_request();
        assert_eq!(request.speech.key, "k");
        assert_eq!(request.speech.region, "westus2");
        assert_eq!(request.voice, "en-US-AvaMultilingualNeural");
    }

    #[test]
    fn connect_request_carries_reply_credentials() {
        let mut cfg = AppConfig::default();
        cfg.speech.key = "k".into();
        assert_eq!(
            cfg.connect_request().reply.validate(),
            Err(crate::session::ConnectError::MissingCredentials(
                "reply endpoint".into()
            ))
        );

        cfg.reply.endpoint = "https://example.openai.azure.com/ ".into();
        cfg.reply.api_key = " secret".into();
        let request = cfg.connect_request();
        assert_eq!(request.reply.endpoint, "https://example.openai.azure.com/");
        assert_eq!(request.reply.api_key, "secret");
        assert!(request.reply.validate().is_ok());
    }
}
