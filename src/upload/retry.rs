//! Retry with exponential backoff
//!
//! [`with_retry`] drives any single-attempt async operation that fails with a
//! [`TransportError`]. Each attempt is raced against an optional timeout;
//! the losing future is dropped, which cancels the in-flight request.
//! Failures are classified, and only retryable ones are re-attempted.

use super::classify::{classify, ErrorInfo};
use crate::client::TransportError;
use crate::config::RetryConfig;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Delay before the retry that follows failed attempt `attempt` (1-based):
/// `base_delay_ms * 2^(attempt-1)`, capped at `max_delay_ms`. No jitter.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63);
    let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    let millis = config
        .base_delay_ms
        .saturating_mul(factor)
        .min(config.max_delay_ms);
    Duration::from_millis(millis)
}

/// Backoff delay with jitter applied when the config asks for it.
pub fn retry_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let delay = backoff_delay(config, attempt);
    if config.jitter {
        full_jitter(delay)
    } else {
        delay
    }
}

/// Uniform delay in `[0, delay]`
fn full_jitter(delay: Duration) -> Duration {
    let max = delay.as_millis().min(u64::MAX as u128) as u64;
    if max == 0 {
        return delay;
    }
    Duration::from_millis(rand::rng().random_range(0..=max))
}

/// How one attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RetryableFailure(String),
    TerminalFailure(String),
}

/// Record of one attempt. Owned by the retry loop only.
#[derive(Debug, Clone)]
pub struct UploadAttempt {
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

/// Passed to the retry observer before each backoff wait
#[derive(Debug, Clone)]
pub struct RetryEvent<'a> {
    /// The attempt that just failed (1-based)
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub error: &'a ErrorInfo,
}

/// Successful value and the number of attempts it took
#[derive(Debug, Clone)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Terminal outcome of a retry loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// A non-retryable failure stopped the loop early
    Rejected { attempt: u32, error: ErrorInfo },
    /// The final allowed attempt failed
    Exhausted { attempts: u32, error: ErrorInfo },
}

impl RetryError {
    pub fn error(&self) -> &ErrorInfo {
        match self {
            RetryError::Rejected { error, .. } | RetryError::Exhausted { error, .. } => error,
        }
    }
}

/// Run `operation` until it succeeds, fails terminally, or runs out of attempts.
///
/// `operation` receives the 1-based attempt number. `on_retry` is called once
/// per retry, before the backoff wait.
pub async fn with_retry<T, F, Fut, R>(
    config: &RetryConfig,
    timeout: Option<Duration>,
    mut operation: F,
    mut on_retry: R,
) -> Result<Retried<T>, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
    R: FnMut(&RetryEvent<'_>),
{
    let max_attempts = config.max_attempts.max(1);
    let mut history: Vec<UploadAttempt> = Vec::new();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let started_at = Utc::now();

        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, operation(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(limit)),
            },
            None => operation(attempt).await,
        };

        let error = match result {
            Ok(value) => {
                history.push(UploadAttempt {
                    attempt_number: attempt,
                    started_at,
                    outcome: AttemptOutcome::Success,
                });
                tracing::debug!(attempts = attempt, history = ?history, "Operation succeeded");
                return Ok(Retried {
                    value,
                    attempts: attempt,
                });
            }
            Err(e) => e,
        };

        let info = classify(&error);

        if attempt == max_attempts {
            history.push(UploadAttempt {
                attempt_number: attempt,
                started_at,
                outcome: AttemptOutcome::TerminalFailure(error.to_string()),
            });
            tracing::warn!(
                attempts = attempt,
                code = %info.code,
                error = %error,
                history = ?history,
                "Giving up: final attempt failed"
            );
            return Err(RetryError::Exhausted {
                attempts: attempt,
                error: info,
            });
        }

        if !info.retryable {
            history.push(UploadAttempt {
                attempt_number: attempt,
                started_at,
                outcome: AttemptOutcome::TerminalFailure(error.to_string()),
            });
            tracing::warn!(
                attempt,
                code = %info.code,
                error = %error,
                history = ?history,
                "Non-retryable failure"
            );
            return Err(RetryError::Rejected {
                attempt,
                error: info,
            });
        }

        history.push(UploadAttempt {
            attempt_number: attempt,
            started_at,
            outcome: AttemptOutcome::RetryableFailure(error.to_string()),
        });

        let delay = retry_delay(config, attempt);
        tracing::info!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            code = %info.code,
            error = %error,
            "Retrying after failure"
        );

        on_retry(&RetryEvent {
            attempt,
            max_attempts,
            delay,
            error: &info,
        });

        tokio::time::sleep(delay).await;
    }
}
