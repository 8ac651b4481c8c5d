//! Retry policy - pure backoff decisions, no I/O

use async_trait::async_trait;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Classification of a failed network call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// HTTP 403: the requested bounding box exceeds the source's maximum area
    RateLimitOrAreaTooLarge,
    /// Network failure, timeout, 5xx or other retryable HTTP error
    Transient,
    /// HTTP 404: no data
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

/// Bounded exponential backoff: the n-th retry waits `base * 2^n`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide what to do after `attempts_so_far` failed attempts, the last one
    /// classified as `kind`.
    pub fn should_retry(&self, attempts_so_far: u32, kind: FailureKind) -> RetryDecision {
        match kind {
            FailureKind::NotFound | FailureKind::RateLimitOrAreaTooLarge => RetryDecision::GiveUp,
            FailureKind::Transient if attempts_so_far >= self.max_attempts => RetryDecision::GiveUp,
            FailureKind::Transient => {
                let exponent = attempts_so_far.min(16);
                RetryDecision::Retry(self.base_delay * (1u32 << exponent))
            }
        }
    }
}

/// Delay abstraction so backoff can be tested without real waiting
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Production sleeper backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}
