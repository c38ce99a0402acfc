//! # Hearth Core
//!
//! Core types for the Hearth request orchestration layer.
//!
//! Every network call made by the community app (feeds, posts, comments,
//! reactions, milestones, journal entries) funnels through a single
//! orchestrator. This crate holds the vocabulary that orchestrator speaks:
//!
//! - **Request Descriptor**: method, path, optional JSON body or multipart payload
//! - **Request Key**: the deduplication identity of a descriptor
//! - **Request Error**: the classified failure taxonomy and its retry semantics
//! - **Api Response**: the `{ data, error, isNetworkError }` shape returned to callers
//! - **Transport**: the trait a concrete HTTP adapter implements
//! - **Environment**: injected time source (`Clock`) so limiter and backoff are testable
//!
//! ## Example
//!
//! ```
//! use hearth_core::request::RequestDescriptor;
//! use serde_json::json;
//!
//! let read = RequestDescriptor::get("/communities/42/posts");
//! let write = RequestDescriptor::post("/posts/7/reactions").with_body(json!({ "kind": "heart" }));
//!
//! assert!(read.key(true).is_some());
//! assert_ne!(read.key(true), write.key(true));
//! ```

pub mod config;
pub mod error;
pub mod request;
pub mod response;
pub mod transport;

// Re-export commonly used types
pub use config::{ConfigError, IdentityHeaders, OrchestratorConfig};
pub use error::{ErrorKind, RequestError};
pub use request::{Method, MultipartPayload, Part, RequestDescriptor, RequestKey};
pub use response::ApiResponse;
pub use transport::Transport;

/// Environment module - injected time source
///
/// The rate limiter and the backoff policy never call `tokio::time` directly;
/// they go through a [`Clock`](environment::Clock) so a test can swap in its
/// own notion of time, or drive tokio's paused clock deterministically.
pub mod environment {
    use futures::future::BoxFuture;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Clock trait - abstracts "now" and "wake me later"
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - tokio's timer wheel
    /// let clock = TokioClock;
    /// let started = clock.now();
    /// clock.sleep(Duration::from_millis(400)).await;
    /// assert!(clock.now() - started >= Duration::from_millis(400));
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current monotonic instant
        fn now(&self) -> Instant;

        /// Suspend the caller for `duration`
        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
    }

    /// Clock backed by `tokio::time`
    ///
    /// Honors `tokio::time::pause()`, which is how the test-suite advances
    /// through minute-long rate windows without waiting on them.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct TokioClock;

    impl Clock for TokioClock {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            Box::pin(tokio::time::sleep(duration))
        }
    }
}
