//! Speech: text-to-speech playback and the speech-to-text capability.
//!
//! This module provides:
//! * [`SpeechSynthesizer`] — async trait for the synthesis collaborator.
//! * [`GeminiSynthesizer`] — Gemini TTS backend.
//! * [`SpeechPlayer`] — single-flight playback state machine.
//! * [`SpeechRecognizer`] — optional dictation capability.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gemini_chat::audio::CpalOutput;
//! use gemini_chat::chat::MessageId;
//! use gemini_chat::config::AppConfig;
//! use gemini_chat::speech::{GeminiSynthesizer, SpeechPlayer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let player = SpeechPlayer::new(
//!         Arc::new(GeminiSynthesizer::from_config(&config.chat, &config.speech)),
//!         Arc::new(CpalOutput::new()),
//!         config.speech.voice,
//!         config.speech.playback_rate,
//!     );
//!
//!     player.speak(MessageId::new(), "Hello there").await.unwrap();
//! }
//! ```

pub mod player;
pub mod recognizer;
pub mod state;
pub mod synth;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use player::{SpeechError, SpeechPlayer};
pub use recognizer::{RecognitionError, SpeechRecognizer};
pub use state::{PlaybackEvent, PlaybackState, SpeakOutcome};
pub use synth::{GeminiSynthesizer, SpeechSynthesizer, SynthesisError};
