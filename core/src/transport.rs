//! Transport trait - one HTTP round trip

use crate::{error::RequestError, request::RequestDescriptor};
use async_trait::async_trait;
use serde_json::Value;

/// Performs exactly one exchange with the remote service
///
/// Implementations must normalize every transport-level exception into
/// [`ErrorKind::NetworkUnreachable`](crate::error::ErrorKind::NetworkUnreachable)
/// and every non-2xx status through [`RequestError::from_status`]. Retrying
/// is not the transport's job.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Issue `request` once and return the parsed JSON body
    ///
    /// An empty 2xx body is `Value::Null`.
    ///
    /// # Errors
    ///
    /// Returns a classified [`RequestError`] for unreachable hosts, non-2xx
    /// statuses, and unparseable bodies.
    async fn exchange(&self, request: &RequestDescriptor) -> Result<Value, RequestError>;
}
