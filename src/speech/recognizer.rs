//! Speech-to-text capability.
//!
//! The binary ships without a recognizer; [`crate::app::ChatApp`] takes one
//! as an optional collaborator and reports its absence instead of failing.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("no speech detected")]
    NoSpeech,

    #[error("speech recognition failed: {0}")]
    Failed(String),
}

/// Captures one utterance and returns its transcript.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(&self) -> Result<String, RecognitionError>;
}
