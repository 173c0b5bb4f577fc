//! Upload endpoint response bodies
//!
//! The endpoint returns the stored file's URL in one of two shapes:
//!
//! ```json
//! { "url": "https://cdn.example.id/images/a.webp" }
//! { "success": true, "data": { "url": "https://cdn.example.id/images/a.webp" } }
//! ```
//!
//! Both are accepted; the flat shape is tried first.

use super::TransportError;
use serde::Deserialize;

/// Successful upload response in either supported shape
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UploadEnvelope {
    Flat { url: String },
    Nested { data: UrlPayload },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UrlPayload {
    pub url: String,
}

impl UploadEnvelope {
    pub fn into_url(self) -> String {
        match self {
            UploadEnvelope::Flat { url } => url,
            UploadEnvelope::Nested { data } => data.url,
        }
    }
}

/// Error response body. Only `message` is used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// Extract the uploaded file's URL from a 2xx response body.
pub fn decode_upload_response(body: &str) -> Result<String, TransportError> {
    let envelope: UploadEnvelope = serde_json::from_str(body).map_err(|e| {
        TransportError::InvalidResponse(format!("response carries no upload URL: {}", e))
    })?;

    let url = envelope.into_url();
    if url.trim().is_empty() {
        return Err(TransportError::InvalidResponse(
            "response carries an empty upload URL".into(),
        ));
    }
    Ok(url)
}

/// Pull the human-readable `message` out of an error body, if there is one.
pub fn decode_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
}
