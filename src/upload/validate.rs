//! File validation against the per-category policy
//!
//! Rules are evaluated in a fixed order and the first failure wins:
//! emptiness, then size, then MIME type.

use super::policy::{format_file_size, mime_essence, Category, UploadFile, UploadPolicy};
use thiserror::Error;

/// Why a file was rejected before any network call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File is empty")]
    Empty,

    #[error("File is too large ({size}). Maximum size for {category} files is {max}")]
    TooLarge {
        category: Category,
        size: String,
        max: String,
    },

    #[error("File type '{mime_type}' is not allowed for {category} files. Allowed: {allowed}")]
    UnsupportedType {
        category: Category,
        mime_type: String,
        allowed: String,
    },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Empty => "empty_file",
            ValidationError::TooLarge { .. } => "file_too_large",
            ValidationError::UnsupportedType { .. } => "unsupported_type",
        }
    }
}

/// Check a file against the limits for `category`.
pub fn validate_file(
    file: &UploadFile,
    category: Category,
    policy: &UploadPolicy,
) -> Result<(), ValidationError> {
    let limits = policy.limits_for(category);
    let size = file.size();

    if size == 0 {
        return Err(ValidationError::Empty);
    }

    if size > limits.max_size_bytes {
        return Err(ValidationError::TooLarge {
            category,
            size: format_file_size(size),
            max: format_file_size(limits.max_size_bytes),
        });
    }

    let mime = mime_essence(&file.mime_type);
    let allowed = limits
        .allowed_types
        .iter()
        .any(|t| mime_essence(t) == mime);
    if !allowed {
        return Err(ValidationError::UnsupportedType {
            category,
            mime_type: file.mime_type.clone(),
            allowed: limits.allowed_types.join(", "),
        });
    }

    Ok(())
}
