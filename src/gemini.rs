//! Minimal client for the Gemini `generateContent` REST endpoint.
//!
//! Shared by the chat client and the speech synthesizer.  Connection details
//! (`base_url`, API key, timeout) come from [`ChatConfig`]; the model is
//! chosen per call.

use serde_json::Value;
use thiserror::Error;

use crate::config::ChatConfig;

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Errors from a `generateContent` call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Neither the environment nor the settings file provides a key.
    #[error("no Gemini API key configured (set GEMINI_API_KEY or chat.api_key)")]
    MissingApiKey,

    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("Gemini request timed out")]
    Timeout,

    /// The service answered with a non-success status.
    #[error("Gemini returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body was not the expected JSON.
    #[error("failed to parse Gemini response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// GeminiApi
// ---------------------------------------------------------------------------

/// Thin wrapper around `POST {base_url}/v1beta/models/{model}:generateContent`.
#[derive(Clone)]
pub struct GeminiApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiApi {
    /// Build from config.  The key is resolved once, here.
    pub fn from_config(config: &ChatConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.resolved_api_key(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }

    /// Send `body` to `model` and return the parsed JSON response.
    pub async fn generate(&self, model: &str, body: &Value) -> Result<Value, ApiError> {
        let key = self.api_key.as_deref().ok_or(ApiError::MissingApiKey)?;
        let url = self.endpoint(model);
        log::debug!("POST {url}");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Parse(e.to_string()))
    }
}

/// `error.message` from a Gemini error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// All `parts` of the first candidate, or an empty slice.
pub fn candidate_parts(response: &Value) -> &[Value] {
    response["candidates"][0]["content"]["parts"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
