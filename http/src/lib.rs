//! # Hearth HTTP Transport
//!
//! reqwest-backed [`Transport`](hearth_core::Transport) for the Hearth
//! request orchestrator. Performs exactly one round trip per exchange and
//! classifies every outcome before the retry policy sees it.
//!
//! ## Example
//!
//! ```no_run
//! use hearth_core::{ApiResponse, OrchestratorConfig, RequestDescriptor};
//! use hearth_http::HttpTransport;
//! use hearth_runtime::RequestOrchestrator;
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OrchestratorConfig::from_env()?;
//!     let orchestrator = RequestOrchestrator::new(HttpTransport::new(&config)?, &config);
//!
//!     let feed: ApiResponse<Value> = orchestrator
//!         .call(RequestDescriptor::get("/communities/1/posts"))
//!         .await;
//!
//!     println!("Feed: {feed:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Behaviour
//!
//! - JSON requests carry `content-type: application/json` plus identity headers
//! - Multipart submissions are always `POST`; the encoder sets the content type
//! - Connection, DNS and timeout failures become network failures
//! - Non-2xx bodies are searched for a `message` or `error` field, else `HTTP {status}`
//! - An empty 2xx body is returned as `null`

pub mod client;
pub mod error;

// Re-export main types for convenience
pub use client::HttpTransport;
pub use error::HttpError;
