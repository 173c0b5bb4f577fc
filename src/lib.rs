//! Nagari Upload Library
//!
//! Client-side upload pipeline for the Nagari village portal: validates a
//! file against its category, compresses large images to WebP, then uploads
//! with a per-attempt timeout and exponential-backoff retries.
//!
//! # Features
//!
//! - **Fail Fast**: Size and type are checked before any network call
//! - **Image Optimization**: Large images are resized and re-encoded as WebP
//! - **Retries**: Transient failures (network, timeout, 429, 5xx) are retried
//! - **Classified Errors**: Every failure carries a user message and a stable code
//!
//! # Example
//!
//! ```no_run
//! use nagari_upload::client::UploadTarget;
//! use nagari_upload::{Category, Config, NoCallbacks, UploadFile, Uploader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("nagari-upload.yaml")?;
//!     let uploader = Uploader::from_config(&config)?;
//!
//!     let file = UploadFile::from_path("balai-nagari.png".as_ref(), None).await?;
//!     let target = UploadTarget::for_category(Category::Image, true);
//!     let uploaded = uploader.upload(file, &target, &NoCallbacks).await?;
//!     println!("{}", uploaded.url);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use upload::{Category, NoCallbacks, UploadError, UploadFile, UploadedFile, Uploader};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
