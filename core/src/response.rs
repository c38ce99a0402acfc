//! Caller-facing result shape

use crate::error::RequestError;
use serde::{Deserialize, Serialize};

/// Result of one logical call, as handed to UI callers
///
/// Exactly one of `data` and `error` is present. `is_network_error` is set
/// on failures so the UI can tell "offline" apart from "request failed".
///
/// Serializes as `{ "data": ..., "error": ..., "isNetworkError": ... }`
/// with absent fields omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Successful payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the failure was a connectivity problem
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_network_error: Option<bool>,
}

impl<T> ApiResponse<T> {
    /// Successful outcome
    #[must_use]
    pub const fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            is_network_error: None,
        }
    }

    /// Failed outcome
    #[must_use]
    pub fn failure(error: &RequestError) -> Self {
        Self {
            data: None,
            error: Some(error.message.clone()),
            is_network_error: Some(error.is_network()),
        }
    }

    /// Check if the call succeeded
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.data.is_some()
    }

    /// Check if the call failed because the remote was unreachable
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        self.is_network_error.unwrap_or(false)
    }

    /// Convert into a plain `Result`
    ///
    /// # Errors
    ///
    /// Returns the failure message when the call did not succeed.
    pub fn into_result(self) -> Result<T, String> {
        match (self.data, self.error) {
            (Some(data), _) => Ok(data),
            (None, Some(error)) => Err(error),
            (None, None) => Err("request produced no outcome".to_string()),
        }
    }
}

impl<T> From<Result<T, RequestError>> for ApiResponse<T> {
    fn from(result: Result<T, RequestError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(error) => Self::failure(&error),
        }
    }
}
