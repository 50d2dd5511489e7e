//! Whole-file AES-256-GCM encryption
//!
//! Encrypted content format:
//! ```text
//! nonce      = 12 random bytes, sent separately as `contentNonce`
//! ciphertext = [N bytes: encrypted file][16 bytes: GCM tag]
//! ```
//!
//! No AAD: the layout matches WebCrypto `AES-GCM` output so any recipient
//! client can open it.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use pqshare_core::{EncryptedContent, ShareError, ShareResult};

use crate::keys::ContentKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Encrypt the file payload once under `key` with a fresh random nonce.
pub fn encrypt_content(key: &ContentKey, plaintext: &[u8]) -> ShareResult<EncryptedContent> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| ShareError::EncryptionFailure(format!("content encryption: {e}")))?;

    Ok(EncryptedContent {
        ciphertext,
        nonce: nonce_bytes.to_vec(),
    })
}

/// Decrypt content produced by [`encrypt_content`].
///
/// Any change to the ciphertext, tag, or nonce, or a wrong key, yields
/// [`ShareError::Authentication`].
pub fn decrypt_content(key: &ContentKey, content: &EncryptedContent) -> ShareResult<Vec<u8>> {
    if content.nonce.len() != NONCE_SIZE {
        return Err(ShareError::MalformedEnvelope(format!(
            "content nonce is {} bytes (expected {NONCE_SIZE})",
            content.nonce.len()
        )));
    }
    if content.ciphertext.len() < TAG_SIZE {
        return Err(ShareError::MalformedEnvelope(format!(
            "encrypted content too short: {} bytes (minimum {TAG_SIZE})",
            content.ciphertext.len()
        )));
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(&content.nonce), content.ciphertext.as_ref())
        .map_err(|_| ShareError::Authentication)
}
