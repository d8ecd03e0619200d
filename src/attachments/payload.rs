//! Base64 payload codec shared by attachments and synthesised audio.
//!
//! Payloads travel as standard, padded base64.  Sources that hand us a
//! data URL (`data:image/png;base64,....`) carry a format prefix which is
//! stripped before decoding.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

/// Errors from [`decode_payload`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    /// Nothing left after trimming and prefix removal.
    #[error("payload is empty")]
    Empty,

    /// The payload is not valid base64.
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
}

/// Encode raw bytes as standard padded base64.
pub fn encode_payload(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Remove a leading `data:<mime>;base64,` prefix if present.
///
/// ```
/// use gemini_chat::attachments::strip_data_url_prefix;
///
/// assert_eq!(strip_data_url_prefix("data:image/png;base64,AAAA"), "AAAA");
/// assert_eq!(strip_data_url_prefix("AAAA"), "AAAA");
/// ```
pub fn strip_data_url_prefix(payload: &str) -> &str {
    split_data_url(payload).map_or(payload, |(_, data)| data)
}

/// Split a `data:<mime>;base64,<data>` URL into `(mime, data)`.
///
/// Returns `None` when `payload` is not a base64 data URL.
pub fn split_data_url(payload: &str) -> Option<(&str, &str)> {
    let rest = payload.trim_start().strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    Some((mime, data))
}

/// Decode a base64 payload, tolerating surrounding whitespace and an
/// embedded data-URL prefix.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, PayloadError> {
    let data = strip_data_url_prefix(payload.trim()).trim();
    if data.is_empty() {
        return Err(PayloadError::Empty);
    }
    BASE64
        .decode(data)
        .map_err(|e| PayloadError::InvalidBase64(e.to_string()))
}
