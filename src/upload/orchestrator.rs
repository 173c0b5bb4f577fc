//! Upload orchestrator
//!
//! Validate, optimize large images, then upload with timeout and retry:
//!
//! ```text
//! validate ──✗──> UploadError::Validation (no network call)
//!    │
//!    ▼
//! optimize (images over the threshold; failure falls back to the original)
//!    │
//!    ▼
//! attempt 1..=max_attempts ── race transport vs timeout
//!    ├─ Ok(url)                  -> UploadedFile
//!    ├─ final attempt failed     -> UploadError::Exhausted
//!    ├─ retryable                -> backoff, on_retry, next attempt
//!    └─ not retryable            -> UploadError::Rejected
//! ```
//!
//! # Example
//!
//! ```no_run
//! use nagari_upload::client::UploadTarget;
//! use nagari_upload::config::Config;
//! use nagari_upload::upload::{Category, NoCallbacks, UploadFile, Uploader};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("nagari-upload.yaml")?;
//! let uploader = Uploader::from_config(&config)?;
//!
//! let file = UploadFile::from_path("brosur-umkm.pdf".as_ref(), None).await?;
//! let target = UploadTarget::for_category(Category::Document, true);
//! let uploaded = uploader.upload(file, &target, &NoCallbacks).await?;
//! println!("{}", uploaded.url);
//! # Ok(())
//! # }
//! ```

use super::callbacks::{Notification, Notifier, TracingNotifier, UploadCallbacks};
use super::optimize::{ImageOptimizer, WebpOptimizer};
use super::policy::{Category, UploadFile, UploadPolicy};
use super::retry::with_retry;
use super::validate::validate_file;
use super::{UploadError, UploadedFile};
use crate::client::{ClientError, UploadClient, UploadTarget, UploadTransport};
use crate::config::Config;
use crate::metrics;
use std::sync::Arc;
use std::time::Instant;

const PROGRESS_STARTED: u8 = 0;
const PROGRESS_VALIDATED: u8 = 10;
const PROGRESS_PREPARED: u8 = 20;
const PROGRESS_DONE: u8 = 100;

/// Progress reported when `attempt` starts, spread over 20..90
fn attempt_progress(attempt: u32, max_attempts: u32) -> u8 {
    let max_attempts = max_attempts.max(1);
    let step = 70 * (attempt.saturating_sub(1)).min(max_attempts) / max_attempts;
    (PROGRESS_PREPARED as u32 + step).min(90) as u8
}

/// Runs uploads against one transport under one policy.
///
/// Holds no per-upload state; concurrent calls are independent.
#[derive(Clone)]
pub struct Uploader {
    transport: Arc<dyn UploadTransport>,
    optimizer: Arc<dyn ImageOptimizer>,
    notifier: Arc<dyn Notifier>,
    policy: Arc<UploadPolicy>,
}

impl Uploader {
    /// Create an uploader with the WebP optimizer and a logging notifier
    pub fn new(transport: Arc<dyn UploadTransport>, policy: UploadPolicy) -> Self {
        Self {
            transport,
            optimizer: Arc::new(WebpOptimizer),
            notifier: Arc::new(TracingNotifier),
            policy: Arc::new(policy),
        }
    }

    /// Create an uploader that talks HTTP to the configured endpoint
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let client = UploadClient::new(&config.client)?;
        Ok(Self::new(Arc::new(client), UploadPolicy::from_config(config)))
    }

    pub fn with_optimizer(mut self, optimizer: Arc<dyn ImageOptimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Upload `file` to `target`, resolving to exactly one terminal outcome.
    #[tracing::instrument(
        name = "upload.file",
        skip(self, file, target, callbacks),
        fields(
            upload.id = %uuid::Uuid::new_v4(),
            upload.file = %file.file_name,
            upload.category = %target.category,
            upload.bytes = file.size(),
            upload.attempts = tracing::field::Empty,
            upload.url = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload(
        &self,
        file: UploadFile,
        target: &UploadTarget,
        callbacks: &dyn UploadCallbacks,
    ) -> Result<UploadedFile, UploadError> {
        let start_time = Instant::now();
        let file_name = file.file_name.clone();
        let category = target.category.as_str();

        let result = self.run(file, target, callbacks).await;

        let duration = start_time.elapsed();
        metrics::record_upload_duration(category, duration.as_secs_f64());

        match &result {
            Ok(uploaded) => {
                metrics::record_upload_success(category, uploaded.size, uploaded.attempts);

                let span = tracing::Span::current();
                span.record("upload.attempts", uploaded.attempts);
                span.record("upload.url", uploaded.url.as_str());

                tracing::info!(
                    url = %uploaded.url,
                    attempts = uploaded.attempts,
                    optimized = uploaded.optimized,
                    bytes = uploaded.size,
                    duration_ms = duration.as_millis() as u64,
                    "Upload completed"
                );

                callbacks.on_complete(uploaded);
                self.notifier.notify(&Notification::Uploaded {
                    file_name,
                    attempts: uploaded.attempts,
                });
            }
            Err(e) => {
                metrics::record_upload_failure(category, e.code());
                tracing::Span::current().record("upload.attempts", e.attempts());

                tracing::error!(
                    error = %e,
                    code = e.code(),
                    attempts = e.attempts(),
                    duration_ms = duration.as_millis() as u64,
                    "Upload failed"
                );

                callbacks.on_error(e);
                self.notifier.notify(&Notification::Failed {
                    file_name,
                    message: e.to_string(),
                });
            }
        }

        result
    }

    async fn run(
        &self,
        file: UploadFile,
        target: &UploadTarget,
        callbacks: &dyn UploadCallbacks,
    ) -> Result<UploadedFile, UploadError> {
        callbacks.on_progress(PROGRESS_STARTED);

        validate_file(&file, target.category, &self.policy)?;
        callbacks.on_progress(PROGRESS_VALIDATED);

        let (file, optimized) = self.prepare(file, target.category).await;
        callbacks.on_progress(PROGRESS_PREPARED);

        let retry = &self.policy.retry;
        let max_attempts = retry.max_attempts.max(1);
        let transport: &dyn UploadTransport = self.transport.as_ref();
        let notifier: &dyn Notifier = self.notifier.as_ref();
        let upload_file = &file;

        let retried = with_retry(
            retry,
            Some(self.policy.timeout()),
            move |attempt| {
                callbacks.on_progress(attempt_progress(attempt, max_attempts));
                tracing::debug!(attempt, max_attempts, "Starting upload attempt");
                transport.upload(upload_file, target)
            },
            move |event| {
                metrics::record_retry(target.category.as_str(), event.error.code.as_str());
                callbacks.on_retry(event.attempt, event.max_attempts, event.error);
                notifier.notify(&Notification::Retrying {
                    attempt: event.attempt,
                    max_attempts: event.max_attempts,
                    delay: event.delay,
                    reason: event.error.message.clone(),
                });
            },
        )
        .await?;

        callbacks.on_progress(PROGRESS_DONE);

        Ok(UploadedFile {
            url: retried.value,
            size: file.size(),
            file_name: file.file_name,
            mime_type: file.mime_type,
            attempts: retried.attempts,
            optimized,
        })
    }

    /// Optimize large images; any optimizer failure keeps the original file.
    async fn prepare(&self, file: UploadFile, category: Category) -> (UploadFile, bool) {
        if !self.policy.should_optimize(category, file.size()) {
            return (file, false);
        }

        self.notifier.notify(&Notification::OptimizationStarted {
            file_name: file.file_name.clone(),
        });

        match self
            .optimizer
            .optimize(file.clone(), &self.policy.optimize)
            .await
        {
            Ok(optimized) => {
                tracing::info!(
                    original_bytes = optimized.original_size,
                    optimized_bytes = optimized.file.size(),
                    width = optimized.width,
                    height = optimized.height,
                    pass = optimized.pass + 1,
                    "Image optimized"
                );
                metrics::record_optimization_success(optimized.original_size, optimized.file.size());
                (optimized.file, true)
            }
            Err(e) => {
                tracing::warn!(
                    file = %file.file_name,
                    error = %e,
                    "Image optimization failed, uploading original"
                );
                metrics::record_optimization_fallback();
                (file, false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockUploadTransport, TransportError};
    use crate::config::OptimizeConfig;
    use crate::upload::optimize::{OptimizeError, OptimizedImage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<u8>>,
        retries: AtomicU32,
        completed: AtomicU32,
        errors: AtomicU32,
    }

    impl UploadCallbacks for Recorder {
        fn on_progress(&self, percent: u8) {
            self.progress.lock().unwrap().push(percent);
        }

        fn on_complete(&self, _uploaded: &UploadedFile) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _error: &UploadError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &crate::upload::ErrorInfo) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct CollectingNotifier(Mutex<Vec<Notification>>);

    impl Notifier for CollectingNotifier {
        fn notify(&self, notification: &Notification) {
            self.0.lock().unwrap().push(notification.clone());
        }
    }

    struct CountingOptimizer {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl ImageOptimizer for CountingOptimizer {
        async fn optimize(
            &self,
            file: UploadFile,
            _config: &OptimizeConfig,
        ) -> Result<OptimizedImage, OptimizeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(OptimizeError::Decode("bad pixels".into()));
            }
            Ok(OptimizedImage {
                original_size: file.size(),
                file: UploadFile::new("small.webp", "image/webp", vec![1u8; 100]),
                width: 1920,
                height: 1080,
                pass: 0,
            })
        }
    }

    fn status(code: u16) -> TransportError {
        TransportError::Status {
            status: code,
            message: None,
        }
    }

    fn uploader(transport: MockUploadTransport) -> Uploader {
        Uploader::new(Arc::new(transport), UploadPolicy::default())
    }

    fn image(size: usize) -> UploadFile {
        UploadFile::new("kantor.jpg", "image/jpeg", vec![7u8; size])
    }

    fn image_target() -> UploadTarget {
        UploadTarget::for_category(Category::Image, true)
    }

    #[test]
    fn test_attempt_progress_is_monotonic_and_bounded() {
        let values: Vec<u8> = (1..=5).map(|a| attempt_progress(a, 5)).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!(values.iter().all(|v| (20..=90).contains(v)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_server_errors_then_success() {
        let mut transport = MockUploadTransport::new();
        let mut calls = 0;
        transport.expect_upload().times(3).returning(move |_, _| {
            calls += 1;
            if calls < 3 {
                Err(status(500))
            } else {
                Ok("https://cdn.nagari.id/images/kantor.jpg".to_string())
            }
        });

        let recorder = Recorder::default();
        let uploaded = uploader(transport)
            .upload(image(1024), &image_target(), &recorder)
            .await
            .unwrap();

        assert_eq!(uploaded.url, "https://cdn.nagari.id/images/kantor.jpg");
        assert_eq!(uploaded.attempts, 3);
        assert_eq!(recorder.retries.load(Ordering::SeqCst), 2);
        assert_eq!(recorder.completed.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.progress.lock().unwrap().last(), Some(&100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_terminal() {
        let mut transport = MockUploadTransport::new();
        transport
            .expect_upload()
            .times(1)
            .returning(|_, _| Err(status(404)));

        let recorder = Recorder::default();
        let err = uploader(transport)
            .upload(image(1024), &image_target(), &recorder)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Rejected { attempts: 1, .. }));
        assert_eq!(err.code(), "client_error");
        assert_eq!(recorder.retries.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_payload_too_large_after_retry_is_not_retried() {
        let mut transport = MockUploadTransport::new();
        let mut calls = 0;
        transport.expect_upload().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(status(503))
            } else {
                Err(status(413))
            }
        });

        let err = uploader(transport)
            .upload(image(1024), &image_target(), &Recorder::default())
            .await
            .unwrap_err();

        assert!(err.is_file_size_error());
        assert_eq!(err.attempts(), 2);
        assert!(!err.error_info().unwrap().retryable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_max_attempts() {
        let mut transport = MockUploadTransport::new();
        transport.expect_upload().times(3).returning(|_, _| {
            Err(TransportError::Network {
                message: "connection reset".into(),
                timed_out: false,
            })
        });

        let err = uploader(transport)
            .upload(image(1024), &image_target(), &Recorder::default())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Exhausted { attempts: 3, .. }));
        assert_eq!(err.code(), "network_error");
        assert!(err.to_string().contains("3 attempt(s)"));
    }

    #[tokio::test]
    async fn test_validation_failure_makes_no_call() {
        let mut transport = MockUploadTransport::new();
        transport.expect_upload().never();

        let file = UploadFile::new("notes.txt", "text/plain", vec![1u8; 10]);
        let err = uploader(transport)
            .upload(file, &UploadTarget::for_category(Category::Document, true), &NoopCheck)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Validation(_)));
    }

    struct NoopCheck;
    impl UploadCallbacks for NoopCheck {}

    #[tokio::test]
    async fn test_small_image_skips_optimizer() {
        let mut transport = MockUploadTransport::new();
        transport
            .expect_upload()
            .withf(|file, _| file.file_name == "kantor.jpg")
            .times(1)
            .returning(|_, _| Ok("https://cdn/kantor.jpg".into()));

        let optimizer = Arc::new(CountingOptimizer {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let uploaded = uploader(transport)
            .with_optimizer(optimizer.clone())
            .upload(image(2 * 1024 * 1024), &image_target(), &NoopCheck)
            .await
            .unwrap();

        assert_eq!(optimizer.calls.load(Ordering::SeqCst), 0);
        assert!(!uploaded.optimized);
    }

    #[tokio::test]
    async fn test_large_image_is_optimized() {
        let mut transport = MockUploadTransport::new();
        transport
            .expect_upload()
            .withf(|file, _| file.mime_type == "image/webp" && file.size() == 100)
            .times(1)
            .returning(|_, _| Ok("https://cdn/small.webp".into()));

        let optimizer = Arc::new(CountingOptimizer {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let notifier = Arc::new(CollectingNotifier::default());
        let uploaded = uploader(transport)
            .with_optimizer(optimizer.clone())
            .with_notifier(notifier.clone())
            .upload(image(3 * 1024 * 1024), &image_target(), &NoopCheck)
            .await
            .unwrap();

        assert_eq!(optimizer.calls.load(Ordering::SeqCst), 1);
        assert!(uploaded.optimized);
        assert_eq!(uploaded.file_name, "small.webp");

        let notifications = notifier.0.lock().unwrap();
        assert!(matches!(
            notifications.first(),
            Some(Notification::OptimizationStarted { .. })
        ));
        assert!(matches!(
            notifications.last(),
            Some(Notification::Uploaded { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_optimizer_failure_uploads_original() {
        let mut transport = MockUploadTransport::new();
        transport
            .expect_upload()
            .withf(|file, _| file.file_name == "kantor.jpg" && file.mime_type == "image/jpeg")
            .times(1)
            .returning(|_, _| Ok("https://cdn/kantor.jpg".into()));

        let optimizer = Arc::new(CountingOptimizer {
            calls: AtomicU32::new(0),
            fail: true,
        });
        let uploaded = uploader(transport)
            .with_optimizer(optimizer.clone())
            .upload(image(3 * 1024 * 1024), &image_target(), &NoopCheck)
            .await
            .unwrap();

        assert_eq!(optimizer.calls.load(Ordering::SeqCst), 1);
        assert!(!uploaded.optimized);
        assert_eq!(uploaded.size, 3 * 1024 * 1024);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_notifications_carry_reason() {
        let mut transport = MockUploadTransport::new();
        let mut calls = 0;
        transport.expect_upload().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(status(429))
            } else {
                Ok("https://cdn/ok".into())
            }
        });

        let notifier = Arc::new(CollectingNotifier::default());
        uploader(transport)
            .with_notifier(notifier.clone())
            .upload(image(10), &image_target(), &NoopCheck)
            .await
            .unwrap();

        let notifications = notifier.0.lock().unwrap();
        let retry = notifications
            .iter()
            .find(|n| matches!(n, Notification::Retrying { .. }))
            .expect("retry notification");
        assert!(retry.message().contains("Too many uploads"));
        assert!(matches!(
            notifications.last(),
            Some(Notification::Uploaded { attempts: 2, .. })
        ));
    }
}
