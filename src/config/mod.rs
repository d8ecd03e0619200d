//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! the validated speech settings [`Voice`] and [`PlaybackRate`], `AppPaths`
//! for cross-platform directories, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;
pub mod voice;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AttachmentConfig, ChatConfig, ConfigError, SpeechConfig, API_KEY_ENV,
};
pub use voice::{PlaybackRate, Voice};
