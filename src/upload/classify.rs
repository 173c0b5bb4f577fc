//! Error classification
//!
//! Maps a [`TransportError`] to an [`ErrorInfo`]: flags, a stable code, a
//! user-facing message and the retry verdict. Classification looks only at
//! structured fields (whether a response arrived, its status) and never at
//! message text. Unknown conditions are not retryable.

use crate::client::TransportError;
use serde::Serialize;
use std::fmt;

/// Machine-readable failure code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Network,
    Timeout,
    FileTooLarge,
    UnsupportedMediaType,
    RateLimited,
    ServerError,
    Unauthorized,
    Forbidden,
    ClientError,
    InvalidResponse,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Network => "network_error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::FileTooLarge => "file_too_large",
            ErrorCode::UnsupportedMediaType => "unsupported_media_type",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::ServerError => "server_error",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::ClientError => "client_error",
            ErrorCode::InvalidResponse => "invalid_response",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of one upload attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub status: Option<u16>,
    pub is_network_error: bool,
    pub is_timeout: bool,
    pub is_file_size_error: bool,
    pub retryable: bool,
    /// User-facing message
    pub message: String,
}

impl ErrorInfo {
    fn new(code: ErrorCode, status: Option<u16>, retryable: bool, message: String) -> Self {
        Self {
            code,
            status,
            is_network_error: code == ErrorCode::Network,
            is_timeout: code == ErrorCode::Timeout,
            is_file_size_error: code == ErrorCode::FileTooLarge,
            retryable,
            message,
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Classify a transport failure.
pub fn classify(error: &TransportError) -> ErrorInfo {
    match error {
        TransportError::Timeout(_) => ErrorInfo::new(
            ErrorCode::Timeout,
            None,
            true,
            "Upload timed out. Please try again.".into(),
        ),
        TransportError::Network { timed_out: true, .. } => ErrorInfo::new(
            ErrorCode::Timeout,
            None,
            true,
            "Upload timed out. Please try again.".into(),
        ),
        TransportError::Network { .. } => ErrorInfo::new(
            ErrorCode::Network,
            None,
            true,
            "Network error. Please check your internet connection.".into(),
        ),
        TransportError::Status { status, message } => classify_status(*status, message.as_deref()),
        TransportError::InvalidResponse(_) => ErrorInfo::new(
            ErrorCode::InvalidResponse,
            None,
            false,
            "Unexpected response from the server.".into(),
        ),
    }
}

fn classify_status(status: u16, server_message: Option<&str>) -> ErrorInfo {
    let (code, retryable, fallback) = match status {
        413 => (
            ErrorCode::FileTooLarge,
            false,
            "File is too large for the server.".to_string(),
        ),
        415 => (
            ErrorCode::UnsupportedMediaType,
            false,
            "This file type is not supported by the server.".to_string(),
        ),
        429 => (
            ErrorCode::RateLimited,
            true,
            "Too many uploads. Please wait a moment.".to_string(),
        ),
        500..=599 => (
            ErrorCode::ServerError,
            true,
            format!("Server error (HTTP {}). Please try again later.", status),
        ),
        401 => (
            ErrorCode::Unauthorized,
            false,
            "Your session has expired. Please sign in again.".to_string(),
        ),
        403 => (
            ErrorCode::Forbidden,
            false,
            "You do not have permission to upload files.".to_string(),
        ),
        400..=499 => (
            ErrorCode::ClientError,
            false,
            format!("Upload rejected by the server (HTTP {}).", status),
        ),
        _ => (
            ErrorCode::InvalidResponse,
            false,
            format!("Unexpected response from the server (HTTP {}).", status),
        ),
    };

    let message = server_message
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or(fallback);

    ErrorInfo::new(code, Some(status), retryable, message)
}
