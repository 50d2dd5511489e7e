//! Envelope delivery

use async_trait::async_trait;

use pqshare_core::{ShareResult, UploadEnvelope, UploadReceipt};

/// Delivers a finished envelope to the backend in a single request.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Fails with `TransportFailure` when the backend answers with a
    /// non-success status and `NetworkUnreachable` when it cannot be reached.
    async fn upload(&self, envelope: &UploadEnvelope) -> ShareResult<UploadReceipt>;
}
