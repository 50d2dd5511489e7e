//! Recipient public key lookup

use async_trait::async_trait;

use pqshare_core::ShareResult;
use pqshare_crypto::RecipientPublicKey;

/// Resolves recipient identifiers to ML-KEM encapsulation keys.
///
/// Implementations must use the identifier verbatim: no trimming, case
/// folding, or deduplication.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Fails with `RecipientNotFound` when the directory does not know the
    /// identifier and with `DirectoryUnavailable` when it could not be asked.
    async fn lookup(&self, recipient_id: &str) -> ShareResult<RecipientPublicKey>;
}
