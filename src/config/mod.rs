//! Configuration module for Nagari Upload
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

const MB: u64 = 1024 * 1024;

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub client: ClientConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub optimize: OptimizeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Build a configuration for the given endpoint with every other section defaulted.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            client: ClientConfig {
                endpoint: endpoint.into(),
                auth_token: None,
                public: default_public(),
            },
            policy: PolicyConfig::default(),
            retry: RetryConfig::default(),
            optimize: OptimizeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_http_url(&self.client.endpoint) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid upload endpoint '{}': must start with http:// or https://",
                self.client.endpoint
            )));
        }

        for (name, limits) in [
            ("image", &self.policy.image),
            ("document", &self.policy.document),
            ("video", &self.policy.video),
        ] {
            if limits.max_size_bytes == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "Category '{}' has a zero max_size_bytes",
                    name
                )));
            }
            if limits.allowed_types.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Category '{}' allows no MIME types",
                    name
                )));
            }
        }

        if self.policy.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::ValidationError(format!(
                "retry.max_delay_ms ({}) is smaller than retry.base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }

        if self.optimize.enabled {
            if self.optimize.passes.is_empty() {
                return Err(ConfigError::ValidationError(
                    "optimize.passes must contain at least one pass when optimization is enabled"
                        .into(),
                ));
            }
            for pass in &self.optimize.passes {
                if pass.max_width == 0 || pass.max_height == 0 {
                    return Err(ConfigError::ValidationError(format!(
                        "Compression pass {}x{} has a zero dimension",
                        pass.max_width, pass.max_height
                    )));
                }
                if !(pass.quality > 0.0 && pass.quality <= 1.0) {
                    return Err(ConfigError::ValidationError(format!(
                        "Invalid compression quality {}: must be in (0.0, 1.0]",
                        pass.quality
                    )));
                }
            }
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format '{}': must be 'pretty' or 'json'",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// Upload endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Full URL of the upload endpoint, e.g. `https://api.example.id/api/upload`
    pub endpoint: String,
    /// Bearer token sent in the `Authorization` header
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Value of the `public` query parameter. Default: true
    #[serde(default = "default_public")]
    pub public: bool,
}

fn default_public() -> bool {
    true
}

/// Size and type limits for one file category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLimits {
    pub max_size_bytes: u64,
    pub allowed_types: Vec<String>,
}

impl CategoryLimits {
    fn new(max_size_bytes: u64, allowed_types: &[&str]) -> Self {
        Self {
            max_size_bytes,
            allowed_types: allowed_types.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Per-category validation policy plus the per-attempt timeout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_image_limits")]
    pub image: CategoryLimits,
    #[serde(default = "default_document_limits")]
    pub document: CategoryLimits,
    #[serde(default = "default_video_limits")]
    pub video: CategoryLimits,
    /// Timeout for a single upload attempt in seconds. Default: 120
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            image: default_image_limits(),
            document: default_document_limits(),
            video: default_video_limits(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_image_limits() -> CategoryLimits {
    CategoryLimits::new(
        10 * MB,
        &[
            "image/jpeg",
            "image/jpg",
            "image/png",
            "image/webp",
            "image/gif",
        ],
    )
}

fn default_document_limits() -> CategoryLimits {
    CategoryLimits::new(
        20 * MB,
        &[
            "application/pdf",
            "application/msword",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ],
    )
}

fn default_video_limits() -> CategoryLimits {
    CategoryLimits::new(
        100 * MB,
        &[
            "video/mp4",
            "video/webm",
            "video/quicktime",
            "video/avi",
            "video/x-msvideo",
        ],
    )
}

fn default_timeout_seconds() -> u64 {
    120
}

/// Retry configuration.
///
/// `max_attempts` counts every attempt including the first one, so the
/// default of 3 means one initial try and at most two retries. The delay
/// before retry `n` is `base_delay_ms * 2^(n-1)`, capped at `max_delay_ms`.
///
/// # Example
///
/// ```yaml
/// retry:
///   max_attempts: 3
///   base_delay_ms: 1000
///   max_delay_ms: 30000
///   jitter: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts", alias = "max_retries")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Draw each delay uniformly from `[0, delay]`. Default: false
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// One downscale + re-encode pass of the image optimizer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionPass {
    pub max_width: u32,
    pub max_height: u32,
    /// Lossy quality in (0.0, 1.0]
    pub quality: f32,
}

/// Client-side image optimization.
///
/// Images larger than `threshold_bytes` are run through `passes` in order;
/// the first pass whose output fits in `target_bytes` wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeConfig {
    #[serde(default = "default_optimize_enabled")]
    pub enabled: bool,
    #[serde(default = "default_optimize_threshold")]
    pub threshold_bytes: u64,
    #[serde(default = "default_optimize_target")]
    pub target_bytes: u64,
    #[serde(default = "default_passes")]
    pub passes: Vec<CompressionPass>,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            enabled: default_optimize_enabled(),
            threshold_bytes: default_optimize_threshold(),
            target_bytes: default_optimize_target(),
            passes: default_passes(),
        }
    }
}

fn default_optimize_enabled() -> bool {
    true
}

fn default_optimize_threshold() -> u64 {
    2 * MB
}

fn default_optimize_target() -> u64 {
    2 * MB
}

fn default_passes() -> Vec<CompressionPass> {
    vec![
        CompressionPass {
            max_width: 1920,
            max_height: 1080,
            quality: 0.8,
        },
        CompressionPass {
            max_width: 1280,
            max_height: 720,
            quality: 0.6,
        },
    ]
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset. Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json". Default: "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
