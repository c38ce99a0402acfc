//! Failure taxonomy for outbound requests
//!
//! Every failure inside the pipeline is classified once, at the transport
//! boundary, into a [`RequestError`]. The retry policy and the facade only
//! ever look at [`ErrorKind`]; they never see transport-specific exceptions.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The exchange could not complete at all (DNS, refused, reset, timeout)
    NetworkUnreachable,
    /// 4xx other than 429
    ClientRejected,
    /// 429 Too Many Requests
    RateLimitedRemote,
    /// 5xx
    ServerFault,
    /// 2xx with a body that could not be parsed into the expected shape
    MalformedResponse,
    /// The pipeline itself failed (task panicked, gate closed)
    Internal,
}

impl ErrorKind {
    /// Whether a failure of this kind is worth another attempt
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimitedRemote | Self::ServerFault)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NetworkUnreachable => "network unreachable",
            Self::ClientRejected => "client rejected",
            Self::RateLimitedRemote => "rate limited",
            Self::ServerFault => "server fault",
            Self::MalformedResponse => "malformed response",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// A classified failure
///
/// `Clone` so a single settled outcome can be handed to every caller that
/// was collapsed onto the same in-flight exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RequestError {
    /// Failure class
    pub kind: ErrorKind,
    /// HTTP status, when the remote answered
    pub status: Option<u16>,
    /// Human-readable message surfaced to the caller
    pub message: String,
}

impl RequestError {
    /// Transport could not complete the exchange
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NetworkUnreachable,
            status: None,
            message: message.into(),
        }
    }

    /// Classify a non-2xx status
    ///
    /// 429 is rate limiting, 4xx is a client rejection, everything else
    /// (5xx and unexpected 1xx/3xx) is treated as a server fault.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            429 => ErrorKind::RateLimitedRemote,
            400..=499 => ErrorKind::ClientRejected,
            _ => ErrorKind::ServerFault,
        };
        Self {
            kind,
            status: Some(status),
            message: message.into(),
        }
    }

    /// 2xx whose body could not be parsed
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::MalformedResponse,
            status: None,
            message: message.into(),
        }
    }

    /// Pipeline failure not attributable to the remote
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Internal,
            status: None,
            message: message.into(),
        }
    }

    /// Whether another attempt may succeed
    #[must_use]
    pub const fn retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Whether the remote was unreachable
    #[must_use]
    pub fn is_network(&self) -> bool {
        self.kind == ErrorKind::NetworkUnreachable
    }
}
