//! Sliding-window rate limiter
//!
//! Keeps issuance timestamps for the trailing window (one minute by
//! default) and delays admission while the window is saturated.
//!
//! ```text
//! ceiling = 3, window = 60s
//!
//!  t=0   t=1   t=2   t=3 ───────────── wait 57s ──────────── t=60
//!  [0]   [0,1] [0,1,2] full: oldest=0, wait = 60 - (3 - 0)   [1,2,60]
//! ```
//!
//! Nothing is ever rejected: admission only waits.

use crate::metrics::RequestMetrics;
use hearth_core::environment::Clock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

/// Default window length
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter
///
/// The window sits behind a tokio `Mutex`; the lock is released before
/// sleeping so waiting callers do not block pruning or other admissions.
pub struct SlidingWindowLimiter {
    window: Mutex<VecDeque<Instant>>,
    ceiling: Option<usize>,
    window_duration: Duration,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    /// Limiter admitting `max_per_minute` calls per trailing minute
    ///
    /// A ceiling of zero or below disables limiting.
    #[must_use]
    pub fn per_minute(max_per_minute: i64, clock: Arc<dyn Clock>) -> Self {
        let ceiling = usize::try_from(max_per_minute).ok().filter(|&c| c > 0);
        Self::new(ceiling, DEFAULT_WINDOW, clock)
    }

    /// Limiter with an explicit ceiling and window; `None` is unbounded
    #[must_use]
    pub fn new(ceiling: Option<usize>, window_duration: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window: Mutex::new(VecDeque::with_capacity(ceiling.unwrap_or(0))),
            ceiling,
            window_duration,
            clock,
        }
    }

    /// Wait until issuing one more call keeps the window within the ceiling,
    /// then record it
    ///
    /// Returns how long the caller was held back.
    pub async fn admit(&self) -> Duration {
        let Some(ceiling) = self.ceiling else {
            return Duration::ZERO;
        };

        let started = self.clock.now();
        let mut recorded_wait = false;

        loop {
            let now = self.clock.now();
            let mut window = self.window.lock().await;
            self.prune(&mut window, now);

            if window.len() < ceiling {
                window.push_back(now);
                return now.saturating_duration_since(started);
            }

            let Some(&oldest) = window.front() else {
                // Unreachable with a non-zero ceiling, but never spin.
                window.push_back(now);
                return now.saturating_duration_since(started);
            };
            let wait = self
                .window_duration
                .saturating_sub(now.saturating_duration_since(oldest));
            drop(window);

            if !recorded_wait {
                RequestMetrics::record_rate_limit_wait();
                recorded_wait = true;
            }
            warn!(
                wait_ms = wait.as_millis(),
                ceiling,
                "Rate window saturated, delaying admission"
            );
            self.clock.sleep(wait).await;
        }
    }

    /// Calls that can be admitted right now without waiting
    ///
    /// `None` when unbounded, or when the window lock is contended.
    #[must_use]
    pub fn remaining_budget(&self) -> Option<usize> {
        let ceiling = self.ceiling?;
        let window = self.window.try_lock().ok()?;
        let now = self.clock.now();
        let active = window
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < self.window_duration)
            .count();
        Some(ceiling.saturating_sub(active))
    }

    /// Configured ceiling, `None` when unbounded
    #[must_use]
    pub const fn ceiling(&self) -> Option<usize> {
        self.ceiling
    }

    fn prune(&self, window: &mut VecDeque<Instant>, now: Instant) {
        while window
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= self.window_duration)
        {
            window.pop_front();
        }
    }
}
