//! # Hearth Testing
//!
//! Testing utilities for the Hearth request orchestration layer.
//!
//! This crate provides:
//! - `MockTransport`: scripted responses, call counting, in-flight high-water mark
//! - `RecordingClock`: virtual time that records every requested sleep
//! - `init_test_tracing`: opt-in log output for tests (`RUST_LOG=debug`)
//!
//! ## Example
//!
//! ```ignore
//! use hearth_testing::MockTransport;
//! use hearth_runtime::RequestOrchestrator;
//!
//! #[tokio::test]
//! async fn test_feed_loads() {
//!     let transport = MockTransport::new();
//!     transport.respond_ok("/feed", json!([]));
//!
//!     let orchestrator = RequestOrchestrator::new(transport, &OrchestratorConfig::default());
//!     let feed: ApiResponse<Vec<Post>> = orchestrator.call(RequestDescriptor::get("/feed")).await;
//!
//!     assert_eq!(orchestrator.transport().calls(), 1);
//! }
//! ```

/// Mock implementations of the transport and clock seams.
pub mod mocks {
    use async_trait::async_trait;
    use futures::future::BoxFuture;
    use hearth_core::environment::Clock;
    use hearth_core::{RequestDescriptor, RequestError, Transport};
    use serde_json::Value;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use std::time::Duration;
    use tokio::time::Instant;

    type Reply = Result<Value, RequestError>;

    #[derive(Default)]
    struct Script {
        queued: VecDeque<Reply>,
        fallback: Option<Reply>,
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scripted transport
    ///
    /// Responses are matched by path. One-shot replies queued with
    /// [`enqueue`](Self::enqueue) are consumed first, in order; after that
    /// the path's standing reply (set by `respond_ok` / `respond_err`) is
    /// returned. An unscripted path answers 404.
    ///
    /// # Example
    ///
    /// ```
    /// use hearth_core::{RequestDescriptor, RequestError, Transport};
    /// use hearth_testing::MockTransport;
    /// use serde_json::json;
    ///
    /// # tokio_test::block_on(async {
    /// let transport = MockTransport::new();
    /// transport.enqueue("/feed", Err(RequestError::from_status(503, "HTTP 503")));
    /// transport.respond_ok("/feed", json!([]));
    ///
    /// let request = RequestDescriptor::get("/feed");
    /// assert!(transport.exchange(&request).await.is_err());
    /// assert_eq!(transport.exchange(&request).await, Ok(json!([])));
    /// assert_eq!(transport.calls(), 2);
    /// # });
    /// ```
    #[derive(Default)]
    pub struct MockTransport {
        scripts: Mutex<HashMap<String, Script>>,
        requests: Mutex<Vec<RequestDescriptor>>,
        latency: Duration,
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    /// Tracks an exchange as active until it finishes or is dropped
    struct ActiveGuard<'a>(&'a AtomicUsize);

    impl Drop for ActiveGuard<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl MockTransport {
        /// Create a transport with no scripted responses and no latency
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Hold every exchange open for `latency`
        #[must_use]
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        /// Answer `path` with `value` from now on
        pub fn respond_ok(&self, path: &str, value: Value) {
            lock(&self.scripts).entry(path.to_string()).or_default().fallback = Some(Ok(value));
        }

        /// Fail `path` with `error` from now on
        pub fn respond_err(&self, path: &str, error: RequestError) {
            lock(&self.scripts).entry(path.to_string()).or_default().fallback = Some(Err(error));
        }

        /// Queue a one-shot reply for `path`
        pub fn enqueue(&self, path: &str, reply: Result<Value, RequestError>) {
            lock(&self.scripts)
                .entry(path.to_string())
                .or_default()
                .queued
                .push_back(reply);
        }

        /// Total exchanges started
        #[must_use]
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Exchanges started for `path`
        #[must_use]
        pub fn calls_for(&self, path: &str) -> usize {
            lock(&self.requests).iter().filter(|r| r.path() == path).count()
        }

        /// Every request seen, in arrival order
        #[must_use]
        pub fn requests(&self) -> Vec<RequestDescriptor> {
            lock(&self.requests).clone()
        }

        /// Exchanges running right now
        #[must_use]
        pub fn active(&self) -> usize {
            self.active.load(Ordering::SeqCst)
        }

        /// Highest number of exchanges that were ever running at once
        #[must_use]
        pub fn max_active(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }

        fn next_reply(&self, path: &str) -> Reply {
            let mut scripts = lock(&self.scripts);
            let Some(script) = scripts.get_mut(path) else {
                return Err(RequestError::from_status(404, format!("no mock response for {path}")));
            };
            script
                .queued
                .pop_front()
                .or_else(|| script.fallback.clone())
                .unwrap_or_else(|| Err(RequestError::from_status(404, format!("no mock response for {path}"))))
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn exchange(&self, request: &RequestDescriptor) -> Result<Value, RequestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            lock(&self.requests).push(request.clone());

            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            let _active = ActiveGuard(&self.active);
            self.max_active.fetch_max(now_active, Ordering::SeqCst);

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            self.next_reply(request.path())
        }
    }

    /// Virtual clock that records sleeps instead of waiting
    ///
    /// `now()` advances by exactly the durations slept so far, so the rate
    /// limiter and backoff see time pass without the test waiting on it.
    pub struct RecordingClock {
        origin: Instant,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl Default for RecordingClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl RecordingClock {
        /// Create a clock starting at the current instant
        #[must_use]
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                sleeps: Mutex::new(Vec::new()),
            }
        }

        /// Every sleep requested, in order
        #[must_use]
        pub fn sleeps(&self) -> Vec<Duration> {
            lock(&self.sleeps).clone()
        }

        /// Sum of every sleep requested
        #[must_use]
        pub fn total_slept(&self) -> Duration {
            lock(&self.sleeps).iter().sum()
        }
    }

    impl Clock for RecordingClock {
        fn now(&self) -> Instant {
            self.origin + self.total_slept()
        }

        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            lock(&self.sleeps).push(duration);
            Box::pin(tokio::task::yield_now())
        }
    }
}

/// Install a `tracing` subscriber for test output.
///
/// Honors `RUST_LOG` and defaults to `warn`. Safe to call from every test;
/// only the first call installs anything.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{MockTransport, RecordingClock};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use hearth_core::environment::Clock;
    use hearth_core::{ErrorKind, RequestDescriptor, RequestError, Transport};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unscripted_path_is_not_found() {
        let transport = MockTransport::new();

        let err = transport
            .exchange(&RequestDescriptor::get("/nowhere"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::ClientRejected);
        assert_eq!(err.status, Some(404));
    }

    #[tokio::test]
    async fn test_queued_replies_precede_fallback() {
        let transport = MockTransport::new();
        transport.enqueue("/feed", Err(RequestError::from_status(500, "HTTP 500")));
        transport.enqueue("/feed", Ok(json!(1)));
        transport.respond_ok("/feed", json!(2));

        let request = RequestDescriptor::get("/feed");
        assert!(transport.exchange(&request).await.is_err());
        assert_eq!(transport.exchange(&request).await, Ok(json!(1)));
        assert_eq!(transport.exchange(&request).await, Ok(json!(2)));
        assert_eq!(transport.exchange(&request).await, Ok(json!(2)));
        assert_eq!(transport.calls_for("/feed"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracks_concurrent_exchanges() {
        let transport = Arc::new(MockTransport::new().with_latency(Duration::from_millis(10)));
        transport.respond_ok("/a", json!(null));

        let mut handles = vec![];
        for _ in 0..3 {
            let transport = Arc::clone(&transport);
            handles.push(tokio::spawn(async move {
                transport.exchange(&RequestDescriptor::get("/a")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(transport.max_active(), 3);
        assert_eq!(transport.active(), 0);
    }

    #[tokio::test]
    async fn test_recording_clock_advances_virtually() {
        let clock = RecordingClock::new();
        let start = clock.now();

        clock.sleep(Duration::from_millis(400)).await;
        clock.sleep(Duration::from_millis(800)).await;

        assert_eq!(clock.sleeps(), vec![Duration::from_millis(400), Duration::from_millis(800)]);
        assert_eq!(clock.now() - start, Duration::from_millis(1200));
    }

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_test_tracing();
        init_test_tracing();
    }
}
