//! Recipient side: recover the content key from an entry and open the file

use pqshare_core::{EncryptedContent, EnvelopeMetadata, RecipientEntry, ShareError, ShareResult};

use crate::content::decrypt_content;
use crate::kem::RecipientKeypair;
use crate::keys::ContentKey;
use crate::wrap::{derive_wrapping_key, unwrap_content_key};
use crate::WRAP_CONTEXT;

/// Decapsulate, re-derive with the entry's salt, and unwrap.
pub fn open_entry(keypair: &RecipientKeypair, entry: &RecipientEntry) -> ShareResult<ContentKey> {
    let shared_secret = keypair.decapsulate(&entry.kem_ciphertext)?;
    let (wrap_key, _) =
        derive_wrapping_key(shared_secret.as_bytes(), Some(&entry.hkdf_salt), WRAP_CONTEXT)?;
    unwrap_content_key(&wrap_key, &entry.wrapped_content_key, &entry.wrap_nonce)
}

/// Open a downloaded file using this keypair's entry in `metadata`.
///
/// When the recipient appears more than once, the first entry that opens
/// successfully wins; every entry wraps the same content key.
pub fn open_envelope(
    keypair: &RecipientKeypair,
    metadata: &EnvelopeMetadata,
    encrypted_content: &[u8],
) -> ShareResult<Vec<u8>> {
    let mut last_err = None;
    for entry in metadata
        .recipients
        .iter()
        .filter(|e| e.recipient_id == keypair.recipient_id())
    {
        match open_entry(keypair, entry) {
            Ok(content_key) => {
                let content = EncryptedContent {
                    ciphertext: encrypted_content.to_vec(),
                    nonce: metadata.content_nonce.clone(),
                };
                return decrypt_content(&content_key, &content);
            }
            Err(e) => {
                tracing::debug!(recipient = %entry.recipient_id, error = %e, "entry did not open");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| ShareError::NoEntryForRecipient(keypair.recipient_id().to_string())))
}
