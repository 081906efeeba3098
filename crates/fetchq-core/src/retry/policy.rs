use rand::Rng;
use std::time::Duration;

/// High-level classification of an error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read, HTTP 408).
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, short body).
    Connection,
    /// HTTP status that is retryable but not strictly throttling (5xx).
    Http5xx(u16),
    /// Not worth retrying: 4xx, malformed URL, local storage failure.
    Permanent,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        !matches!(self, ErrorKind::Permanent)
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff with a cap and additive jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff; jitter is drawn from `[0, base_delay]`.
    pub base_delay: Duration,
    /// Upper bound on the exponential part of the delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the delay after `attempt` failed: `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }

    /// Random jitter in `[0, base_delay]`.
    pub fn jitter(&self) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        if base_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=base_ms))
    }

    /// Decide whether to retry after attempt number `attempt` (1-based) failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts || !kind.is_transient() {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.backoff(attempt) + self.jitter())
    }
}
