//! Retry logic with exponential backoff and jitter.
//!
//! Wraps a single network attempt. Failures are classified through
//! [`Retryable`]: only failures that report themselves as retryable (for
//! requests, 429 and 5xx) are attempted again; everything else is returned
//! immediately.
//!
//! # Example
//!
//! ```rust
//! use hearth_core::environment::TokioClock;
//! use hearth_core::error::RequestError;
//! use hearth_runtime::retry::{RetryPolicy, retry_with_policy};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), RequestError> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(2)
//!     .initial_delay(Duration::from_millis(400))
//!     .jitter_max(Duration::from_millis(200))
//!     .build();
//!
//! let value = retry_with_policy(&policy, &TokioClock, || async {
//!     Ok::<_, RequestError>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::metrics::RequestMetrics;
use hearth_core::config::OrchestratorConfig;
use hearth_core::environment::Clock;
use hearth_core::error::RequestError;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Errors that know whether another attempt may succeed.
pub trait Retryable {
    /// Whether this failure is transient
    fn is_retryable(&self) -> bool;
}

impl Retryable for RequestError {
    fn is_retryable(&self) -> bool {
        self.retryable()
    }
}

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 2
/// - `initial_delay`: 400ms
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
/// - `jitter_max`: 200ms (random jitter drawn from `[0, jitter_max)`)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Exclusive upper bound of the random jitter added to each delay
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
            jitter_max: None,
        }
    }

    /// Policy matching an orchestrator configuration.
    #[must_use]
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::builder()
            .max_retries(config.max_retries)
            .initial_delay(config.base_backoff())
            .jitter_max(config.jitter_max())
            .build()
    }

    /// Calculate the delay before retry number `attempt` (0-based), without jitter.
    ///
    /// Uses exponential backoff: `initial_delay * multiplier^attempt`,
    /// capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);

        // Float-to-int casts saturate, so an overflowing delay lands on the cap.
        let delay = Duration::from_millis(delay_ms as u64);

        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }

    /// Draw a random jitter in `[0, jitter_max)`.
    #[must_use]
    pub fn jitter(&self) -> Duration {
        let bound = u64::try_from(self.jitter_max.as_millis()).unwrap_or(u64::MAX);
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..bound))
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<u32>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter_max: Option<Duration>,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set delay before the first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Set the jitter bound; zero disables jitter.
    #[must_use]
    pub const fn jitter_max(mut self, jitter_max: Duration) -> Self {
        self.jitter_max = Some(jitter_max);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(2),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(400)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(30)),
            multiplier: self.multiplier.unwrap_or(2.0),
            jitter_max: self.jitter_max.unwrap_or(Duration::from_millis(200)),
        }
    }
}

/// Run `operation` up to `max_retries + 1` times.
///
/// Non-retryable failures are returned after the attempt that produced
/// them. A retryable failure with budget left sleeps
/// `delay_for_attempt(n) + jitter` on `clock` and tries again. When the
/// budget is exhausted the last failure is returned unchanged: a 429 that
/// never clears reaches the caller with the remote's own message and status,
/// not a generic "retries exhausted" error.
///
/// # Errors
///
/// Returns the failure of the final attempt.
pub async fn retry_with_policy<C, F, Fut, T, E>(
    policy: &RetryPolicy,
    clock: &C,
    mut operation: F,
) -> Result<T, E>
where
    C: Clock + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempt, "Request succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_retryable() {
                    tracing::debug!(error = %err, "Failure is not retryable, failing immediately");
                    return Err(err);
                }

                if attempt >= policy.max_retries {
                    tracing::error!(
                        attempt,
                        error = %err,
                        "Request failed after max retries"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt) + policy.jitter();
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Request failed, retrying..."
                );

                RequestMetrics::record_retry();
                clock.sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use hearth_core::environment::TokioClock;
    use hearth_core::error::ErrorKind;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn no_jitter(max_retries: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(max_retries)
            .initial_delay(Duration::from_millis(400))
            .jitter_max(Duration::ZERO)
            .build()
    }

    #[test]
    fn test_retry_policy_delay_calculation() {
        let policy = no_jitter(5);

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1600));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(3200));
    }

    #[test]
    fn test_retry_policy_max_delay_cap() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(1000))
            .multiplier(10.0)
            .max_delay(Duration::from_secs(2))
            .build();

        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(2));
    }

    #[test]
    fn test_defaults_match_orchestrator_config() {
        let policy = RetryPolicy::from_config(&OrchestratorConfig::default());

        assert_eq!(policy, RetryPolicy::default());
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.initial_delay, Duration::from_millis(400));
        assert_eq!(policy.jitter_max, Duration::from_millis(200));
    }

    #[test]
    fn test_jitter_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..500 {
            assert!(policy.jitter() < Duration::from_millis(200));
        }
        assert_eq!(no_jitter(1).jitter(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_first_try() {
        let counter = Arc::new(AtomicUsize::new(0));

        let result = retry_with_policy(&RetryPolicy::default(), &TokioClock, || {
            let c = Arc::clone(&counter);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, RequestError>(42)
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_server_faults() {
        let counter = Arc::new(AtomicUsize::new(0));

        let result = retry_with_policy(&no_jitter(2), &TokioClock, || {
            let c = Arc::clone(&counter);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RequestError::from_status(503, "HTTP 503"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_and_returns_last_failure() {
        let counter = Arc::new(AtomicUsize::new(0));

        let result: Result<(), _> = retry_with_policy(&no_jitter(2), &TokioClock, || {
            let c = Arc::clone(&counter);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                Err(RequestError::from_status(429, format!("slow down #{n}")))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(counter.load(Ordering::SeqCst), 3); // Initial + 2 retries
        assert_eq!(err.kind, ErrorKind::RateLimitedRemote);
        assert_eq!(err.message, "slow down #2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_failures_attempted_once() {
        for failure in [
            RequestError::from_status(404, "Not found"),
            RequestError::network("connection refused"),
            RequestError::malformed("expected value at line 1"),
        ] {
            let counter = Arc::new(AtomicUsize::new(0));

            let result: Result<(), _> = retry_with_policy(&no_jitter(5), &TokioClock, || {
                let c = Arc::clone(&counter);
                let failure = failure.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(failure)
                }
            })
            .await;

            assert_eq!(result.unwrap_err(), failure);
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_on_the_clock() {
        let start = tokio::time::Instant::now();

        let _ = retry_with_policy(&no_jitter(2), &TokioClock, || async {
            Err::<(), _>(RequestError::from_status(500, "boom"))
        })
        .await;

        // 400ms + 800ms
        assert!(start.elapsed() >= Duration::from_millis(1200));
    }

    proptest! {
        #[test]
        fn prop_delays_strictly_increase_until_cap(base_ms in 1u64..1_000, attempts in 1u32..8) {
            let policy = RetryPolicy::builder()
                .initial_delay(Duration::from_millis(base_ms))
                .max_delay(Duration::from_secs(3600))
                .build();

            for n in 1..attempts {
                prop_assert!(policy.delay_for_attempt(n) > policy.delay_for_attempt(n - 1));
            }
        }
    }
}
