//! Request orchestrator - the single entry point for outbound calls
//!
//! ```text
//! call(descriptor)
//!   │
//!   ├─ key? ── hit ──────────────────────────────► await shared outcome
//!   │    └──── miss / multipart ─► spawn pipeline:
//!   │                                rate window admit
//!   │                                concurrency slot acquire
//!   │                                retry(transport.exchange)
//!   │                                slot release (drop)
//!   │                              deregister key
//!   └─ decode payload into T ──► ApiResponse<T>
//! ```
//!
//! Failures never escape as errors or panics: every call settles into an
//! [`ApiResponse`].

use crate::dedup::{DedupRegistry, Outcome, settle};
use crate::gate::ConcurrencyGate;
use crate::metrics::RequestMetrics;
use crate::rate_limiter::SlidingWindowLimiter;
use crate::retry::{RetryPolicy, retry_with_policy};
use hearth_core::{
    ApiResponse, OrchestratorConfig, RequestDescriptor, RequestError, RequestKey, Transport,
    environment::{Clock, TokioClock},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{Instrument, Span, debug, info, info_span, warn};

/// Composes deduplication, rate limiting, concurrency gating and retry
/// around a [`Transport`]
///
/// Cheap to clone; clones share all pipeline state.
///
/// # Example
///
/// ```ignore
/// let orchestrator = RequestOrchestrator::new(HttpTransport::new(&config)?, &config);
///
/// let feed: ApiResponse<Vec<Post>> = orchestrator
///     .call(RequestDescriptor::get("/communities/42/posts"))
///     .await;
///
/// match feed.into_result() {
///     Ok(posts) => render(posts),
///     Err(message) => show_error(message),
/// }
/// ```
pub struct RequestOrchestrator<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RequestOrchestrator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    transport: T,
    limiter: SlidingWindowLimiter,
    gate: ConcurrencyGate,
    registry: DedupRegistry,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    dedupe_writes: bool,
}

impl<T: Transport> RequestOrchestrator<T> {
    /// Create an orchestrator on tokio's clock
    #[must_use]
    pub fn new(transport: T, config: &OrchestratorConfig) -> Self {
        Self::with_clock(transport, config, Arc::new(TokioClock))
    }

    /// Create an orchestrator with an injected clock
    #[must_use]
    pub fn with_clock(transport: T, config: &OrchestratorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                limiter: SlidingWindowLimiter::per_minute(
                    config.max_requests_per_minute,
                    Arc::clone(&clock),
                ),
                gate: ConcurrencyGate::new(config.concurrency_limit),
                registry: DedupRegistry::new(),
                policy: RetryPolicy::from_config(config),
                clock,
                dedupe_writes: config.dedupe_writes,
            }),
        }
    }

    /// Issue one logical call and decode its payload as `R`
    ///
    /// Never fails: pipeline failures are folded into the returned
    /// [`ApiResponse`]. A payload that does not fit `R` is reported as a
    /// malformed response.
    pub async fn call<R: DeserializeOwned>(&self, request: RequestDescriptor) -> ApiResponse<R> {
        let span = info_span!(
            "request",
            method = %request.method(),
            path = %request.path(),
        );

        async {
            let started = self.inner.clock.now();

            let outcome = self.call_raw(request).await.and_then(|value| {
                serde_json::from_value::<R>(value).map_err(|e| {
                    warn!(error = %e, "Response did not match the expected shape");
                    RequestError::malformed("Unexpected response format")
                })
            });

            let elapsed = self.inner.clock.now().saturating_duration_since(started);
            let label = match &outcome {
                Ok(_) => "success",
                Err(e) if e.is_network() => "network_error",
                Err(_) => "failure",
            };
            RequestMetrics::record_settled(label, elapsed);

            match &outcome {
                Ok(_) => info!(duration_ms = elapsed.as_millis(), "Request settled"),
                Err(e) => info!(
                    duration_ms = elapsed.as_millis(),
                    kind = %e.kind,
                    status = e.status,
                    error = %e.message,
                    "Request failed"
                ),
            }

            ApiResponse::from(outcome)
        }
        .instrument(span)
        .await
    }

    /// Issue one logical call and return the raw JSON outcome
    ///
    /// # Errors
    ///
    /// Returns the classified failure of the final attempt.
    pub async fn call_raw(&self, request: RequestDescriptor) -> Outcome {
        let span = Span::current();
        let inner = Arc::clone(&self.inner);

        match request.key(self.inner.dedupe_writes) {
            Some(key) => {
                self.inner
                    .registry
                    .dedupe(key, move || inner.pipeline(request).instrument(span))
                    .await
            }
            None => {
                debug!("Request bypasses deduplication");
                settle(tokio::spawn(inner.pipeline(request).instrument(span))).await
            }
        }
    }

    /// Exchanges currently holding a concurrency slot
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.gate.in_flight()
    }

    /// Calls waiting for a concurrency slot
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.gate.queued()
    }

    /// Keys with an exchange currently in flight
    #[must_use]
    pub fn pending_keys(&self) -> Vec<RequestKey> {
        self.inner.registry.pending_keys()
    }

    /// Calls admissible right now without a rate wait; `None` when unbounded
    #[must_use]
    pub fn remaining_budget(&self) -> Option<usize> {
        self.inner.limiter.remaining_budget()
    }

    /// The wrapped transport
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }
}

impl<T: Transport> Inner<T> {
    async fn pipeline(self: Arc<Self>, request: RequestDescriptor) -> Outcome {
        debug!("Waiting for rate window");
        let waited = self.limiter.admit().await;
        if !waited.is_zero() {
            debug!(waited_ms = waited.as_millis(), "Admitted after rate wait");
        }

        debug!(queued = self.gate.queued(), "Waiting for concurrency slot");
        self.gate
            .run(retry_with_policy(&self.policy, self.clock.as_ref(), || {
                self.transport.exchange(&request)
            }))
            .await?
    }
}
