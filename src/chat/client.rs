//! `ChatClient` trait and the Gemini implementation.

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use super::message::{Message, Role};
use crate::attachments::Attachment;
use crate::config::ChatConfig;
use crate::gemini::{candidate_parts, ApiError, GeminiApi};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The reply carried no text.
    #[error("model returned an empty response")]
    EmptyResponse,
}

/// Sends one user turn, primed with the prior conversation.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send(
        &self,
        history: &[Message],
        text: &str,
        attachments: &[Attachment],
    ) -> Result<String, ChatError>;
}

/// Gemini `generateContent` chat.
pub struct GeminiChat {
    api: GeminiApi,
    model: String,
}

impl GeminiChat {
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            api: GeminiApi::from_config(config),
            model: config.model.clone(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api.has_api_key()
    }
}

fn content(role: Role, text: &str, attachments: &[Attachment]) -> Value {
    let mut parts = Vec::with_capacity(attachments.len() + 1);
    if !text.is_empty() {
        parts.push(json!({ "text": text }));
    }
    parts.extend(attachments.iter().map(|a| {
        json!({ "inlineData": { "mimeType": a.mime_type, "data": a.encoded_data } })
    }));
    json!({ "role": role.as_str(), "parts": parts })
}

fn request_body(history: &[Message], text: &str, attachments: &[Attachment]) -> Value {
    let mut contents: Vec<Value> = history
        .iter()
        .map(|m| content(m.role, &m.text, &m.attachments))
        .collect();
    contents.push(content(Role::User, text, attachments));
    json!({ "contents": contents })
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: &Value) -> Option<String> {
    let text: String = candidate_parts(response)
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[async_trait]
impl ChatClient for GeminiChat {
    async fn send(
        &self,
        history: &[Message],
        text: &str,
        attachments: &[Attachment],
    ) -> Result<String, ChatError> {
        let body = request_body(history, text, attachments);
        let response = self.api.generate(&self.model, &body).await?;
        extract_text(&response).ok_or(ChatError::EmptyResponse)
    }
}
