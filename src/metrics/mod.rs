//! Metrics module
//!
//! Prometheus counters and histograms for uploads, retries and image
//! optimization, registered in the default registry.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "nagari_uploads_total",
        "Total number of uploads",
        &["category", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "nagari_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "nagari_upload_duration_seconds",
        "Upload duration in seconds, including optimization and retries",
        &["category"],
        vec![0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    pub static ref UPLOAD_ATTEMPTS: Histogram = register_histogram!(
        "nagari_upload_attempts",
        "Number of attempts per successful upload",
        vec![1.0, 2.0, 3.0, 5.0, 10.0]
    ).unwrap();

    // Retry metrics
    pub static ref RETRIES_TOTAL: CounterVec = register_counter_vec!(
        "nagari_upload_retries_total",
        "Upload retries by failure code",
        &["category", "code"]
    ).unwrap();

    // Optimization metrics
    pub static ref OPTIMIZATIONS_TOTAL: CounterVec = register_counter_vec!(
        "nagari_image_optimizations_total",
        "Image optimization runs",
        &["status"]  // "success" or "fallback"
    ).unwrap();

    pub static ref OPTIMIZATION_SAVED_BYTES: Counter = register_counter!(
        "nagari_image_optimization_saved_bytes_total",
        "Bytes saved by client-side image optimization"
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "nagari_upload_errors_total",
        "Terminal upload errors",
        &["code"]
    ).unwrap();
}

/// Record a successful upload
pub fn record_upload_success(category: &str, bytes: u64, attempts: u32) {
    UPLOADS_TOTAL.with_label_values(&[category, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
    UPLOAD_ATTEMPTS.observe(attempts as f64);
}

/// Record a failed upload
pub fn record_upload_failure(category: &str, code: &str) {
    UPLOADS_TOTAL.with_label_values(&[category, "failure"]).inc();
    ERRORS_TOTAL.with_label_values(&[code]).inc();
}

/// Record upload duration
pub fn record_upload_duration(category: &str, duration_secs: f64) {
    UPLOAD_DURATION
        .with_label_values(&[category])
        .observe(duration_secs);
}

/// Record a scheduled retry
pub fn record_retry(category: &str, code: &str) {
    RETRIES_TOTAL.with_label_values(&[category, code]).inc();
}

/// Record an optimization that replaced the original file
pub fn record_optimization_success(original_bytes: u64, optimized_bytes: u64) {
    OPTIMIZATIONS_TOTAL.with_label_values(&["success"]).inc();
    OPTIMIZATION_SAVED_BYTES.inc_by(original_bytes.saturating_sub(optimized_bytes) as f64);
}

/// Record an optimization that failed and fell back to the original file
pub fn record_optimization_fallback() {
    OPTIMIZATIONS_TOTAL.with_label_values(&["fallback"]).inc();
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
