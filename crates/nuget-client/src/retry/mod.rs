//! Retry and backoff policy
//!
//! The request core asks a [`Backoff`] for the delay before every retry. The
//! policy sees the previous delay, the configured base delay, the number of
//! the attempt that just failed and, when the failure was a response, its
//! status and headers (so `Retry-After` can be honored).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

/// Header carried by retried attempts with the 1-based retry number
pub const RETRY_ATTEMPT_HEADER: &str = "X-Retry-Attempt";

/// Configuration for exponential backoff retry logic
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Status line and headers of a failed attempt
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// Capture the head of a response about to be discarded
    pub fn from_response(response: &reqwest::Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
        }
    }

    /// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get(RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }
}

/// Inputs to a backoff decision
#[derive(Debug, Clone, Copy)]
pub struct BackoffInput<'a> {
    /// Delay used before the attempt that just failed (zero after the first)
    pub previous_delay: Duration,
    /// Configured base delay
    pub base_delay: Duration,
    /// 1-based number of the attempt that just failed
    pub attempt: u32,
    /// Response of the failed attempt, `None` for transport errors
    pub last_response: Option<&'a ResponseHead>,
}

/// Computes the delay before the next attempt.
///
/// Implementations must return promptly; the request's cancellation token
/// bounds the actual wait.
pub trait Backoff: Send + Sync {
    fn next_delay(&self, input: &BackoffInput<'_>) -> Duration;
}

impl<F> Backoff for F
where
    F: Fn(&BackoffInput<'_>) -> Duration + Send + Sync,
{
    fn next_delay(&self, input: &BackoffInput<'_>) -> Duration {
        self(input)
    }
}

/// Retries immediately. Keeps error-path tests fast and deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroBackoff;

impl Backoff for ZeroBackoff {
    fn next_delay(&self, _input: &BackoffInput<'_>) -> Duration {
        Duration::ZERO
    }
}

/// Exponential backoff with equal jitter, honoring `Retry-After` on 429/503
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    multiplier: f64,
    max_delay: Duration,
    jitter: bool,
}

impl ExponentialBackoff {
    pub fn new(multiplier: f64, max_delay: Duration) -> Self {
        Self {
            multiplier: multiplier.max(1.0),
            max_delay,
            jitter: true,
        }
    }

    /// Disable jitter, making delays exactly `base * multiplier^(attempt - 1)`
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    fn exponential(&self, base: Duration, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let millis = base.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

impl From<&RetryConfig> for ExponentialBackoff {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.multiplier, config.max_delay)
    }
}

impl Backoff for ExponentialBackoff {
    fn next_delay(&self, input: &BackoffInput<'_>) -> Duration {
        if let Some(head) = input.last_response {
            let throttled = head.status == StatusCode::TOO_MANY_REQUESTS
                || head.status == StatusCode::SERVICE_UNAVAILABLE;
            if throttled {
                if let Some(retry_after) = head.retry_after() {
                    return retry_after.min(self.max_delay);
                }
            }
        }

        let delay = self.exponential(input.base_delay, input.attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let half = delay / 2;
        let spread = (delay - half).as_millis() as u64;
        half + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

/// Attempt limit, base delay and backoff strategy used by the request core
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Arc<dyn Backoff>,
}

impl RetryPolicy {
    /// Policy from configuration, using exponential backoff
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            backoff: Arc::new(ExponentialBackoff::from(config)),
        }
    }

    /// Replace the backoff strategy
    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before the attempt following `attempt`
    pub fn delay_after(
        &self,
        attempt: u32,
        previous_delay: Duration,
        last_response: Option<&ResponseHead>,
    ) -> Duration {
        self.backoff.next_delay(&BackoffInput {
            previous_delay,
            base_delay: self.base_delay,
            attempt,
            last_response,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .finish_non_exhaustive()
    }
}
