//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{AppPaths, PlaybackRate, Voice};

/// Environment variable that overrides [`ChatConfig::api_key`].
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Validation errors for individual settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Playback rate outside the supported `[0.5, 2.0]` range.
    #[error("playback rate {0} is outside the supported range 0.5 – 2.0")]
    PlaybackRateOutOfRange(f32),

    /// A voice name that is not one of the prebuilt voices.
    #[error("unknown voice \"{0}\" (expected one of Kore, Puck, Charon, Fenrir, Aoede)")]
    UnknownVoice(String),
}

// ---------------------------------------------------------------------------
// ChatConfig
// ---------------------------------------------------------------------------

/// Connection settings for the hosted generative-language API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Base URL of the API endpoint.
    pub base_url: String,
    /// API key.  `None` means "read from `GEMINI_API_KEY`".
    pub api_key: Option<String>,
    /// Model used for chat replies.
    pub model: String,
    /// Maximum seconds to wait for a reply before timing out.
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".into(),
            api_key: None,
            model: "gemini-2.5-flash".into(),
            timeout_secs: 60,
        }
    }
}

impl ChatConfig {
    /// The key to send: environment first, then the settings file.
    ///
    /// Empty strings count as "not set".
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.trim().is_empty()))
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Text-to-speech settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Model used for speech synthesis.
    pub model: String,
    /// Prebuilt voice.
    pub voice: Voice,
    /// Playback speed multiplier.
    pub playback_rate: PlaybackRate,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-preview-tts".into(),
            voice: Voice::default(),
            playback_rate: PlaybackRate::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// AttachmentConfig
// ---------------------------------------------------------------------------

/// Limits applied before a file is accepted for conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    /// Files whose known size exceeds this many bytes are rejected.
    /// `0` disables the limit.
    pub max_file_bytes: u64,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 20 * 1024 * 1024,
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
/// use gemini_chat::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat API settings.
    #[serde(default)]
    pub chat: ChatConfig,
    /// Speech synthesis / playback settings.
    #[serde(default)]
    pub speech: SpeechConfig,
    /// Attachment ingestion limits.
    #[serde(default)]
    pub attachments: AttachmentConfig,
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
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
