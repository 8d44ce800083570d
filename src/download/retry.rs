//! Retry logic with exponential backoff for transient download failures
//!
//! A failed attempt is classified into a [`FailureType`]; the
//! [`RetryPolicy`] then decides whether to retry and after what delay.
//! Delays double each attempt, are capped, and carry random jitter so
//! simultaneous failures don't retry in lockstep.

use std::time::Duration;

use rand::Rng;

use super::DownloadError;

/// Default base delay for exponential backoff (1 second)
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds)
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Maximum jitter added to delays (500ms)
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of download failure types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry
    ///
    /// Timeouts, connection resets, 5xx responses, truncated streams.
    Transient,

    /// Failure that won't succeed regardless of retries
    ///
    /// 404/403 and other 4xx responses, local IO errors, an unavailable
    /// anonymity transport, cancellation.
    Permanent,
}

/// Decision on whether to retry a failed download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the download after the specified delay
    Retry {
        /// How long to wait before retrying
        delay: Duration,
        /// Which attempt number this will be (1-indexed)
        attempt: u32,
    },

    /// Do not retry the download
    DoNotRetry {
        /// Human-readable reason why retry is not attempted
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + jitter
/// ```
///
/// With defaults, delays are approximately 1s, 2s, 4s, …, capped at 32s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt)
    max_attempts: u32,

    /// Base delay for the first retry
    base_delay: Duration,

    /// Maximum delay cap
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings
    ///
    /// `max_attempts` is clamped to at least 1 (every candidate gets one
    /// attempt).
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Creates a policy with a custom max_attempts, defaults otherwise
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns the maximum number of attempts configured
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry a failed download
    ///
    /// # Arguments
    ///
    /// * `failure_type` - Classification of the failure
    /// * `attempt` - The attempt number that just failed (1-indexed)
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            tracing::debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Calculates the delay for a retry with exponential backoff and jitter
    ///
    /// Before jitter the delay is monotonically non-decreasing across
    /// attempts and never exceeds `max_delay`.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;

        // attempt is 1-indexed: attempt 1 failed -> 1x base before retry 2
        let exponent = (attempt - 1) as f64;
        let delay_ms = base_ms * 2f64.powf(exponent);

        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.calculate_jitter()
    }

    /// Generates random jitter between 0 and MAX_JITTER
    fn calculate_jitter(&self) -> Duration {
        let mut rng = rand::thread_rng();
        let jitter_ms = rng.gen_range(0..=MAX_JITTER.as_millis() as u64);
        Duration::from_millis(jitter_ms)
    }
}

/// Classifies a download error into a failure type for retry decisions
///
/// # HTTP Status Classification
///
/// | Status | Type |
/// |--------|------|
/// | 408, 429, 5xx | Transient |
/// | 404, 403, other 4xx | Permanent |
///
/// # Non-HTTP Errors
///
/// Timeouts, connection errors, and truncated streams are transient;
/// local IO errors, an unavailable anonymity transport, and cancellation
/// are permanent.
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),
        DownloadError::Timeout { .. } => FailureType::Transient,
        DownloadError::Network { .. } => FailureType::Transient,
        DownloadError::Truncated { .. } => FailureType::Transient,
        DownloadError::Io { .. } => FailureType::Permanent,
        DownloadError::TransportUnavailable(_) => FailureType::Permanent,
        DownloadError::Cancelled => FailureType::Permanent,
    }
}

/// Classifies an HTTP status code into a failure type
fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient, // Request Timeout
        429 => FailureType::Transient, // Too Many Requests
        status if (500..600).contains(&status) => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}
