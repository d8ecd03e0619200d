//! `SpeechSynthesizer` trait and the Gemini text-to-speech implementation.

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{ChatConfig, SpeechConfig, Voice};
use crate::gemini::{candidate_parts, ApiError, GeminiApi};

// ---------------------------------------------------------------------------
// SynthesisError
// ---------------------------------------------------------------------------

/// Errors from the synthesis collaborator.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The call succeeded but carried no audio.
    #[error("speech service returned no audio")]
    NoAudio,

    #[error("nothing to speak")]
    EmptyText,
}

// ---------------------------------------------------------------------------
// SpeechSynthesizer trait
// ---------------------------------------------------------------------------

/// Turns text into base64-encoded audio.
///
/// `Ok(None)` means the service answered without audio; callers treat that
/// as [`SynthesisError::NoAudio`].
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Option<String>, SynthesisError>;
}

// ---------------------------------------------------------------------------
// GeminiSynthesizer
// ---------------------------------------------------------------------------

/// Gemini TTS via `generateContent` with the `AUDIO` response modality.
///
/// The service answers with 24 kHz signed 16-bit mono PCM.
pub struct GeminiSynthesizer {
    api: GeminiApi,
    model: String,
}

impl GeminiSynthesizer {
    pub fn from_config(chat: &ChatConfig, speech: &SpeechConfig) -> Self {
        Self {
            api: GeminiApi::from_config(chat),
            model: speech.model.clone(),
        }
    }
}

fn request_body(text: &str, voice: Voice) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": text }] }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": voice.as_str() }
                }
            }
        }
    })
}

/// First non-empty `inlineData.data` among the candidate's parts.
fn extract_audio(response: &Value) -> Option<String> {
    candidate_parts(response)
        .iter()
        .filter_map(|part| part["inlineData"]["data"].as_str())
        .find(|data| !data.trim().is_empty())
        .map(str::to_string)
}

#[async_trait]
impl SpeechSynthesizer for GeminiSynthesizer {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Option<String>, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        let response = self.api.generate(&self.model, &request_body(text, voice)).await?;
        Ok(extract_audio(&response))
    }
}
