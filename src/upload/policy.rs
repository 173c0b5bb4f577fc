//! Upload policy and the request-scoped file model

use crate::config::{CategoryLimits, Config, OptimizeConfig, PolicyConfig, RetryConfig};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// File category. Drives validation limits and the storage folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Image,
    Document,
    Video,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Image => "image",
            Category::Document => "document",
            Category::Video => "video",
        }
    }

    /// Default destination folder on the upload endpoint
    pub fn folder(&self) -> &'static str {
        match self {
            Category::Image => "images",
            Category::Document => "documents",
            Category::Video => "videos",
        }
    }

    /// Infer the category from a MIME type's top-level type.
    ///
    /// Anything that is neither `image/*` nor `video/*` is treated as a
    /// document; the validator then decides whether it is allowed.
    pub fn from_mime(mime: &str) -> Category {
        let essence = mime_essence(mime);
        if essence.starts_with("image/") {
            Category::Image
        } else if essence.starts_with("video/") {
            Category::Video
        } else {
            Category::Document
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" | "images" => Ok(Category::Image),
            "document" | "documents" => Ok(Category::Document),
            "video" | "videos" => Ok(Category::Video),
            other => Err(format!(
                "unknown category '{}': expected image, document or video",
                other
            )),
        }
    }
}

/// Lower-cased MIME type without parameters (`image/PNG; q=1` -> `image/png`)
pub fn mime_essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Guess a MIME type from a file extension.
pub fn mime_from_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        _ => return None,
    };
    Some(mime)
}

/// Human-readable file size, e.g. `1.5 MB`
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// A file selected for upload. Lives only for the duration of one upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, taking the MIME type from `mime` or the extension.
    pub async fn from_path(path: &Path, mime: Option<&str>) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let mime_type = mime
            .map(str::to_string)
            .or_else(|| mime_from_path(path).map(str::to_string))
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok(Self::new(file_name, mime_type, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_image(&self) -> bool {
        mime_essence(&self.mime_type).starts_with("image/")
    }
}

/// Immutable policy shared by every upload: limits, retry, timeout and optimization.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub limits: PolicyConfig,
    pub retry: RetryConfig,
    pub optimize: OptimizeConfig,
}

impl UploadPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            limits: config.policy.clone(),
            retry: config.retry.clone(),
            optimize: config.optimize.clone(),
        }
    }

    pub fn limits_for(&self, category: Category) -> &CategoryLimits {
        match category {
            Category::Image => &self.limits.image,
            Category::Document => &self.limits.document,
            Category::Video => &self.limits.video,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.limits.timeout_seconds)
    }

    /// Whether a file of this category and size should go through the optimizer
    pub fn should_optimize(&self, category: Category, size: u64) -> bool {
        self.optimize.enabled && category == Category::Image && size > self.optimize.threshold_bytes
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            limits: PolicyConfig::default(),
            retry: RetryConfig::default(),
            optimize: OptimizeConfig::default(),
        }
    }
}
