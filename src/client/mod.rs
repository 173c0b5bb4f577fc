//! Upload endpoint client
//!
//! Sends one file per request as `multipart/form-data` to the configured
//! endpoint and turns the reply into either the stored URL or a
//! [`TransportError`]. Retries and timeouts live in the orchestrator; this
//! client makes exactly one attempt per call.
//!
//! # Example
//!
//! ```no_run
//! use nagari_upload::client::{UploadClient, UploadTarget, UploadTransport};
//! use nagari_upload::config::Config;
//! use nagari_upload::upload::{Category, UploadFile};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::with_endpoint("http://localhost:8000/api/upload");
//! let client = UploadClient::new(&config.client)?;
//!
//! let file = UploadFile::new("kantor-wali-nagari.jpg", "image/jpeg", vec![0u8; 1024]);
//! let target = UploadTarget::for_category(Category::Image, true);
//! let url = client.upload(&file, &target).await?;
//! println!("Stored at {}", url);
//! # Ok(())
//! # }
//! ```
//!
//! # Tracing
//!
//! Each call creates a span named `client.upload` with the endpoint, folder,
//! category and byte count; `http.status_code` is recorded once a response
//! arrives.

pub mod response;

use crate::config::ClientConfig;
use crate::upload::policy::{Category, UploadFile};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use thiserror::Error;

pub use response::{decode_error_message, decode_upload_response, UploadEnvelope};

/// Client construction errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Failure of a single upload attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The attempt did not finish within the per-attempt timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// No HTTP response was received
    #[error("Network error: {message}")]
    Network { message: String, timed_out: bool },

    /// The server answered with a non-success status
    #[error("Server responded with HTTP {status}")]
    Status {
        status: u16,
        message: Option<String>,
    },

    /// A success status whose body carries no usable URL
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for TransportError {
    /// Only failures to deliver the request count as network errors; body,
    /// decode, redirect and builder errors are permanent.
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            TransportError::Network {
                message: e.to_string(),
                timed_out: e.is_timeout(),
            }
        } else {
            TransportError::InvalidResponse(e.to_string())
        }
    }
}

/// Query parameters that place the file on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub category: Category,
    pub folder: String,
    pub public: bool,
}

impl UploadTarget {
    /// Target in the category's default folder
    pub fn for_category(category: Category, public: bool) -> Self {
        Self {
            category,
            folder: category.folder().to_string(),
            public,
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }
}

/// Single-attempt upload transport
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Upload one file and return its public URL
    async fn upload(&self, file: &UploadFile, target: &UploadTarget)
        -> Result<String, TransportError>;
}

/// HTTP transport backed by reqwest
pub struct UploadClient {
    endpoint: String,
    auth_token: Option<String>,
    http_client: reqwest::Client,
}

impl UploadClient {
    /// Create a new upload client
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("nagari-upload/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::ConfigError(e.to_string()))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            auth_token: config.auth_token.clone().filter(|t| !t.trim().is_empty()),
            http_client,
        })
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn form(file: &UploadFile) -> Form {
        let part = Part::stream_with_length(file.bytes.clone(), file.size())
            .file_name(file.file_name.clone());
        let part = match part.mime_str(&file.mime_type) {
            Ok(part) => part,
            Err(e) => {
                tracing::warn!(
                    mime_type = %file.mime_type,
                    error = %e,
                    "Unparseable MIME type, sending part without Content-Type"
                );
                Part::stream_with_length(file.bytes.clone(), file.size())
                    .file_name(file.file_name.clone())
            }
        };
        Form::new().part("file", part)
    }
}

#[async_trait]
impl UploadTransport for UploadClient {
    #[tracing::instrument(
        name = "client.upload",
        skip(self, file),
        fields(
            http.url = %self.endpoint,
            upload.folder = %target.folder,
            upload.category = %target.category,
            upload.bytes = file.size(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn upload(
        &self,
        file: &UploadFile,
        target: &UploadTarget,
    ) -> Result<String, TransportError> {
        let public = if target.public { "true" } else { "false" };
        let mut request = self
            .http_client
            .post(&self.endpoint)
            .query(&[
                ("folder", target.folder.as_str()),
                ("category", target.category.as_str()),
                ("public", public),
            ])
            .multipart(Self::form(file));

        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if !status.is_success() {
            // The status decides the outcome even if the body is cut short
            let message = response
                .text()
                .await
                .ok()
                .and_then(|body| decode_error_message(&body));
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        decode_upload_response(&body)
    }
}
