//! Error types for building the HTTP transport

use thiserror::Error;

/// Errors that can occur while constructing an [`HttpTransport`](crate::HttpTransport)
///
/// Exchange failures are never reported through this type; they are
/// classified into [`RequestError`](hearth_core::RequestError).
#[derive(Debug, Error)]
pub enum HttpError {
    /// An identity header value is not a valid HTTP header value
    #[error("Invalid value for header {name}")]
    InvalidHeader {
        /// Header name
        name: String,
    },

    /// The underlying HTTP client could not be built
    #[error("HTTP client construction failed: {0}")]
    Client(String),
}
