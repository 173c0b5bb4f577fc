//! Client-side image optimization
//!
//! Large images are downscaled to fit a bounding box (aspect ratio kept,
//! never upscaled) and re-encoded as lossy WebP. Passes run in order from
//! least to most aggressive; the first output that fits the target size and
//! is no larger than the input wins.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP, GIF) | `image::load_from_memory` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode | `webp::Encoder::from_rgba` (lossy) |
//!
//! Decoding and encoding are CPU-bound, so [`WebpOptimizer`] runs them on
//! tokio's blocking pool.

use super::policy::{format_file_size, UploadFile};
use crate::config::{CompressionPass, OptimizeConfig};
use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

/// Optimization errors. None of these abort an upload.
#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("'{0}' is not an image and cannot be compressed")]
    NotAnImage(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("File too large after compression: {size} exceeds {target} after {passes} pass(es)")]
    TooLargeAfterCompression {
        size: String,
        target: String,
        passes: usize,
    },

    #[error("Image worker failed: {0}")]
    Worker(String),
}

/// Result of a successful optimization
#[derive(Debug, Clone)]
pub struct OptimizedImage {
    pub file: UploadFile,
    pub width: u32,
    pub height: u32,
    pub original_size: u64,
    /// Zero-based index of the pass that produced `file`
    pub pass: usize,
}

/// Image optimizer seam used by the orchestrator
#[async_trait]
pub trait ImageOptimizer: Send + Sync {
    async fn optimize(
        &self,
        file: UploadFile,
        config: &OptimizeConfig,
    ) -> Result<OptimizedImage, OptimizeError>;
}

/// WebP optimizer running on the blocking thread pool
#[derive(Debug, Default, Clone, Copy)]
pub struct WebpOptimizer;

#[async_trait]
impl ImageOptimizer for WebpOptimizer {
    async fn optimize(
        &self,
        file: UploadFile,
        config: &OptimizeConfig,
    ) -> Result<OptimizedImage, OptimizeError> {
        let config = config.clone();
        tokio::task::spawn_blocking(move || optimize_image(&file, &config))
            .await
            .map_err(|e| OptimizeError::Worker(e.to_string()))?
    }
}

/// Dimensions that fit `source` inside `bounds`, preserving aspect ratio.
///
/// Images already inside the bounds are returned unchanged.
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = (bounds.0.max(1), bounds.1.max(1));

    if src_w <= max_w && src_h <= max_h {
        return source;
    }

    let scale = f64::min(max_w as f64 / src_w as f64, max_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w);
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h);
    (w, h)
}

fn decode(file: &UploadFile) -> Result<DynamicImage, OptimizeError> {
    if !file.is_image() {
        return Err(OptimizeError::NotAnImage(file.file_name.clone()));
    }
    image::load_from_memory(&file.bytes)
        .map_err(|e| OptimizeError::Decode(format!("{}: {}", file.file_name, e)))
}

struct Encoded {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

fn encode_pass(img: &DynamicImage, pass: &CompressionPass) -> Result<Encoded, OptimizeError> {
    if pass.max_width == 0 || pass.max_height == 0 {
        return Err(OptimizeError::Encode(format!(
            "invalid pass bounds {}x{}",
            pass.max_width, pass.max_height
        )));
    }

    let (width, height) = fit_within(
        (img.width(), img.height()),
        (pass.max_width, pass.max_height),
    );

    let rgba = if (width, height) == (img.width(), img.height()) {
        img.to_rgba8()
    } else {
        img.resize_exact(width, height, FilterType::Lanczos3)
            .to_rgba8()
    };

    let quality = (pass.quality * 100.0).clamp(1.0, 100.0);
    let encoded = webp::Encoder::from_rgba(rgba.as_raw(), width, height).encode(quality);
    if encoded.is_empty() {
        return Err(OptimizeError::Encode(format!(
            "WebP encoder produced no output for {}x{}",
            width, height
        )));
    }

    Ok(Encoded {
        bytes: encoded.to_vec(),
        width,
        height,
    })
}

/// `photo.jpeg` -> `photo.webp`
fn webp_file_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    format!("{}.webp", stem)
}

fn to_upload_file(original: &UploadFile, encoded: Encoded) -> UploadFile {
    UploadFile::new(
        webp_file_name(&original.file_name),
        "image/webp",
        Bytes::from(encoded.bytes),
    )
}

/// Run a single compression pass over `file`, returning the WebP output.
pub fn compress_image(
    file: &UploadFile,
    pass: &CompressionPass,
) -> Result<UploadFile, OptimizeError> {
    let img = decode(file)?;
    let encoded = encode_pass(&img, pass)?;
    Ok(to_upload_file(file, encoded))
}

/// Run the configured passes until one produces a small enough file.
pub fn optimize_image(
    file: &UploadFile,
    config: &OptimizeConfig,
) -> Result<OptimizedImage, OptimizeError> {
    let img = decode(file)?;
    let original_size = file.size();
    let mut last_size = original_size;

    for (index, pass) in config.passes.iter().enumerate() {
        let encoded = encode_pass(&img, pass)?;
        let size = encoded.bytes.len() as u64;

        tracing::debug!(
            file = %file.file_name,
            pass = index + 1,
            width = encoded.width,
            height = encoded.height,
            quality = pass.quality,
            original_bytes = original_size,
            output_bytes = size,
            "Compression pass finished"
        );

        if size <= config.target_bytes && size <= original_size {
            let (width, height) = (encoded.width, encoded.height);
            return Ok(OptimizedImage {
                file: to_upload_file(file, encoded),
                width,
                height,
                original_size,
                pass: index,
            });
        }
        last_size = size;
    }

    Err(OptimizeError::TooLargeAfterCompression {
        size: format_file_size(last_size),
        target: format_file_size(config.target_bytes),
        passes: config.passes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn noisy_png(width: u32, height: u32) -> UploadFile {
        let mut state: u32 = 0x9E37_79B9;
        let img = RgbImage::from_fn(width, height, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            image::Rgb([r, g, b])
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        UploadFile::new("photo.png", "image/png", buf.into_inner())
    }

    fn small_config(target_bytes: u64) -> OptimizeConfig {
        OptimizeConfig {
            enabled: true,
            threshold_bytes: 0,
            target_bytes,
            passes: vec![
                CompressionPass {
                    max_width: 320,
                    max_height: 180,
                    quality: 0.8,
                },
                CompressionPass {
                    max_width: 160,
                    max_height: 90,
                    quality: 0.6,
                },
            ],
        }
    }

    #[test]
    fn test_fit_within_landscape() {
        assert_eq!(fit_within((3840, 2160), (1920, 1080)), (1920, 1080));
        assert_eq!(fit_within((4000, 1000), (1920, 1080)), (1920, 480));
    }

    #[test]
    fn test_fit_within_portrait() {
        assert_eq!(fit_within((1080, 2160), (1920, 1080)), (540, 1080));
    }

    #[test]
    fn test_fit_within_never_upscales() {
        assert_eq!(fit_within((800, 600), (1920, 1080)), (800, 600));
    }

    #[test]
    fn test_webp_file_name() {
        assert_eq!(webp_file_name("photo.jpeg"), "photo.webp");
        assert_eq!(webp_file_name("archive.tar.png"), "archive.tar.webp");
        assert_eq!(webp_file_name(""), "image.webp");
    }

    #[test]
    fn test_optimize_bounds_dimensions_and_shrinks() {
        let file = noisy_png(800, 600);
        let result = optimize_image(&file, &small_config(u64::MAX)).unwrap();

        assert!(result.width <= 320 && result.height <= 180);
        assert_eq!(result.pass, 0);
        assert!(result.file.size() <= file.size());
        assert_eq!(result.file.mime_type, "image/webp");
        assert_eq!(result.file.file_name, "photo.webp");

        let decoded = image::load_from_memory(&result.file.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (result.width, result.height));
    }

    #[test]
    fn test_optimize_gives_up_after_last_pass() {
        let file = noisy_png(400, 300);
        let err = optimize_image(&file, &small_config(1)).unwrap_err();
        match err {
            OptimizeError::TooLargeAfterCompression { passes, .. } => assert_eq!(passes, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_image_is_never_compressed() {
        let file = UploadFile::new("report.pdf", "application/pdf", vec![1u8; 4096]);
        let err = optimize_image(&file, &small_config(u64::MAX)).unwrap_err();
        assert!(matches!(err, OptimizeError::NotAnImage(_)));
    }

    #[test]
    fn test_corrupt_image_fails_decode() {
        let file = UploadFile::new("broken.jpg", "image/jpeg", vec![0u8; 128]);
        let err = optimize_image(&file, &small_config(u64::MAX)).unwrap_err();
        assert!(matches!(err, OptimizeError::Decode(_)));
    }

    #[test]
    fn test_compress_image_single_pass() {
        let file = noisy_png(640, 480);
        let pass = CompressionPass {
            max_width: 200,
            max_height: 200,
            quality: 0.5,
        };
        let result = compress_image(&file, &pass).unwrap();
        assert_eq!(result.mime_type, "image/webp");
        assert_eq!(result.file_name, "photo.webp");

        let decoded = image::load_from_memory(&result.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 150));
    }

    #[test]
    fn test_second_pass_used_when_first_misses_target() {
        let file = noisy_png(800, 600);
        let passes = small_config(u64::MAX).passes;
        let first = compress_image(&file, &passes[0]).unwrap();
        let second = compress_image(&file, &passes[1]).unwrap();
        assert!(second.size() < first.size());

        let result = optimize_image(&file, &small_config(second.size())).unwrap();

        assert_eq!(result.pass, 1);
        assert!(result.width <= 160 && result.height <= 90);
        assert_eq!(result.file.size(), second.size());
    }

    #[test]
    fn test_fit_within_zero_bounds_does_not_panic() {
        assert_eq!(fit_within((800, 600), (0, 0)), (1, 1));
        assert_eq!(fit_within((800, 600), (0, 300)), (1, 1));
    }

    #[test]
    fn test_zero_bound_pass_is_an_encode_error() {
        let file = noisy_png(64, 64);
        let pass = CompressionPass {
            max_width: 0,
            max_height: 90,
            quality: 0.8,
        };
        let err = compress_image(&file, &pass).unwrap_err();
        assert!(matches!(err, OptimizeError::Encode(_)));
    }

    #[tokio::test]
    async fn test_webp_optimizer_runs_off_thread() {
        let file = noisy_png(640, 480);
        let result = WebpOptimizer
            .optimize(file, &small_config(u64::MAX))
            .await
            .unwrap();
        assert!(result.width <= 320);
    }
}
