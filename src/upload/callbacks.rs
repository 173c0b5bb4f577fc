//! Upload observers
//!
//! Two seams let callers watch an upload without touching its result:
//!
//! - [`UploadCallbacks`] is passed per call and receives progress, retry,
//!   completion and error events.
//! - [`Notifier`] is injected into the [`Uploader`](super::Uploader) once and
//!   receives user-facing [`Notification`]s (the portal shows these as toasts).
//!
//! Both are optional for correctness; a headless caller can use
//! [`NoCallbacks`] and [`TracingNotifier`].

use super::classify::ErrorInfo;
use super::{UploadError, UploadedFile};
use std::time::Duration;

/// Per-upload event hooks. Every method defaults to a no-op.
pub trait UploadCallbacks: Send + Sync {
    /// Coarse progress in percent: start, validated, prepared, per attempt, done
    fn on_progress(&self, _percent: u8) {}

    fn on_complete(&self, _uploaded: &UploadedFile) {}

    fn on_error(&self, _error: &UploadError) {}

    /// Called before waiting to retry; `attempt` is the attempt that just failed
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &ErrorInfo) {}
}

/// Callbacks that ignore every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCallbacks;

impl UploadCallbacks for NoCallbacks {}

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// User-facing notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    OptimizationStarted {
        file_name: String,
    },
    Uploaded {
        file_name: String,
        attempts: u32,
    },
    Retrying {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        reason: String,
    },
    Failed {
        file_name: String,
        message: String,
    },
}

impl Notification {
    pub fn level(&self) -> NotificationLevel {
        match self {
            Notification::OptimizationStarted { .. } => NotificationLevel::Info,
            Notification::Uploaded { .. } => NotificationLevel::Success,
            Notification::Retrying { .. } => NotificationLevel::Warning,
            Notification::Failed { .. } => NotificationLevel::Error,
        }
    }

    /// Text suitable for a toast
    pub fn message(&self) -> String {
        match self {
            Notification::OptimizationStarted { file_name } => {
                format!("Optimizing {} before upload...", file_name)
            }
            Notification::Uploaded {
                file_name,
                attempts,
            } if *attempts > 1 => {
                format!("{} uploaded after {} attempts", file_name, attempts)
            }
            Notification::Uploaded { file_name, .. } => format!("{} uploaded", file_name),
            Notification::Retrying {
                attempt,
                max_attempts,
                delay,
                reason,
            } => format!(
                "{} Retrying ({}/{}) in {:.1}s...",
                reason,
                attempt + 1,
                max_attempts,
                delay.as_secs_f64()
            ),
            Notification::Failed { file_name, message } => {
                format!("Failed to upload {}: {}", file_name, message)
            }
        }
    }
}

/// Receives user-facing notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Notifier that writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) {
        let message = notification.message();
        match notification.level() {
            NotificationLevel::Info | NotificationLevel::Success => {
                tracing::info!(notification = %message)
            }
            NotificationLevel::Warning => tracing::warn!(notification = %message),
            NotificationLevel::Error => tracing::error!(notification = %message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uploaded_message_mentions_retries() {
        let once = Notification::Uploaded {
            file_name: "logo.png".into(),
            attempts: 1,
        };
        assert_eq!(once.message(), "logo.png uploaded");

        let thrice = Notification::Uploaded {
            file_name: "logo.png".into(),
            attempts: 3,
        };
        assert!(thrice.message().contains("3 attempts"));
    }

    #[test]
    fn test_retry_message() {
        let n = Notification::Retrying {
            attempt: 1,
            max_attempts: 3,
            delay: Duration::from_millis(1500),
            reason: "Server error (HTTP 503). Please try again later.".into(),
        };
        assert_eq!(n.level(), NotificationLevel::Warning);
        assert!(n.message().ends_with("Retrying (2/3) in 1.5s..."));
    }
}
