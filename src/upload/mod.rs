//! Upload module
//!
//! Validates, optionally compresses and uploads a file with retries. The
//! entry point is [`Uploader::upload`]; every failure crosses the boundary
//! as an [`UploadError`] carrying a user-facing message and a stable code.

use thiserror::Error;

pub mod callbacks;
pub mod classify;
pub mod optimize;
pub mod orchestrator;
pub mod policy;
pub mod retry;
pub mod validate;

pub use callbacks::{NoCallbacks, Notification, Notifier, TracingNotifier, UploadCallbacks};
pub use classify::{classify, ErrorCode, ErrorInfo};
pub use optimize::{
    compress_image, optimize_image, ImageOptimizer, OptimizeError, OptimizedImage, WebpOptimizer,
};
pub use orchestrator::Uploader;
pub use policy::{format_file_size, Category, UploadFile, UploadPolicy};
pub use retry::{with_retry, RetryError};
pub use validate::{validate_file, ValidationError};

/// Terminal upload failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Rejected before any network call
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A non-retryable failure; remaining attempts were skipped
    #[error("{error}")]
    Rejected { attempts: u32, error: ErrorInfo },

    /// The final allowed attempt failed
    #[error("Upload failed after {attempts} attempt(s): {error}")]
    Exhausted { attempts: u32, error: ErrorInfo },
}

impl UploadError {
    /// Machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::Validation(e) => e.code(),
            UploadError::Rejected { error, .. } | UploadError::Exhausted { error, .. } => {
                error.code.as_str()
            }
        }
    }

    /// Classification of the last network failure, if the upload got that far
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        match self {
            UploadError::Validation(_) => None,
            UploadError::Rejected { error, .. } | UploadError::Exhausted { error, .. } => {
                Some(error)
            }
        }
    }

    /// Number of network attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            UploadError::Validation(_) => 0,
            UploadError::Rejected { attempts, .. } | UploadError::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_file_size_error(&self) -> bool {
        match self {
            UploadError::Validation(ValidationError::TooLarge { .. }) => true,
            UploadError::Validation(_) => false,
            UploadError::Rejected { error, .. } | UploadError::Exhausted { error, .. } => {
                error.is_file_size_error
            }
        }
    }
}

impl From<RetryError> for UploadError {
    fn from(e: RetryError) -> Self {
        match e {
            RetryError::Rejected { attempt, error } => UploadError::Rejected {
                attempts: attempt,
                error,
            },
            RetryError::Exhausted { attempts, error } => UploadError::Exhausted { attempts, error },
        }
    }
}

/// A completed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub url: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub attempts: u32,
    /// Whether the optimizer replaced the original bytes
    pub optimized: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(code: u16) -> ErrorInfo {
        classify(&crate::client::TransportError::Status {
            status: code,
            message: None,
        })
    }

    #[test]
    fn test_exhausted_message_counts_attempts() {
        let err = UploadError::from(RetryError::Exhausted {
            attempts: 3,
            error: info(503),
        });
        assert!(err.to_string().starts_with("Upload failed after 3 attempt(s)"));
        assert_eq!(err.code(), "server_error");
        assert_eq!(err.attempts(), 3);
    }

    #[test]
    fn test_rejected_uses_classified_message() {
        let err = UploadError::from(RetryError::Rejected {
            attempt: 1,
            error: info(413),
        });
        assert_eq!(err.to_string(), "File is too large for the server.");
        assert!(err.is_file_size_error());
        assert_eq!(err.attempts(), 1);
    }

    #[test]
    fn test_validation_error_code() {
        let err = UploadError::from(ValidationError::Empty);
        assert_eq!(err.code(), "empty_file");
        assert!(err.error_info().is_none());
        assert_eq!(err.attempts(), 0);
    }
}
