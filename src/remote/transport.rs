// Transport seam.
// A store performs every network call through this trait.

use async_trait::async_trait;

use crate::error::TransportError;

use super::types::{FetchRequest, FetchResponse};

/// Performs a fetch for a fully formed request.
///
/// Timeouts are the transport's job: `request.timeout` says how long the call
/// may take before it fails with [`TransportError::Timeout`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TransportError>;
}
