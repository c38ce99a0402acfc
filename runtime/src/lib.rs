//! # Hearth Runtime
//!
//! Request orchestration for the Hearth community app.
//!
//! Every UI surface funnels its network calls through one
//! [`RequestOrchestrator`], which coordinates concurrency, fairness,
//! deduplication, rate compliance and failure recovery against the remote
//! service.
//!
//! ## Core Components
//!
//! - **Rate Limiter**: sliding one-minute window; delays, never drops
//! - **Concurrency Gate**: bounded in-flight exchanges with a FIFO queue
//! - **Deduplication Registry**: collapses concurrent identical calls
//! - **Retry Policy**: classified retries with exponential backoff and jitter
//! - **Orchestrator**: composes the above around a [`Transport`](hearth_core::Transport)
//!
//! ## Example
//!
//! ```ignore
//! use hearth_core::{ApiResponse, OrchestratorConfig, RequestDescriptor};
//! use hearth_http::HttpTransport;
//! use hearth_runtime::RequestOrchestrator;
//!
//! let config = OrchestratorConfig::from_env()?;
//! let orchestrator = RequestOrchestrator::new(HttpTransport::new(&config)?, &config);
//!
//! let notifications: ApiResponse<Vec<Notification>> = orchestrator
//!     .call(RequestDescriptor::get("/notifications"))
//!     .await;
//!
//! if notifications.is_network_error() {
//!     show_offline_banner();
//! }
//! ```

/// Deduplication of concurrent identical calls
pub mod dedup;

/// Bounded concurrency with FIFO admission
pub mod gate;

/// Prometheus metrics for observability
pub mod metrics;

/// Orchestrator facade
pub mod orchestrator;

/// Sliding-window rate limiting
pub mod rate_limiter;

/// Retry logic with exponential backoff
pub mod retry;

// Re-export commonly used types
pub use dedup::{DedupRegistry, Outcome};
pub use gate::{ConcurrencyGate, GatePermit};
pub use orchestrator::RequestOrchestrator;
pub use rate_limiter::SlidingWindowLimiter;
pub use retry::{RetryPolicy, RetryPolicyBuilder, Retryable, retry_with_policy};
