//! Per-recipient wrapping key derivation and content key wrapping
//!
//! ```text
//! wrap_key = HKDF-SHA256(salt, ikm = kem shared secret, info = context)
//! wrapped  = AES-256-GCM(wrap_key, wrap_nonce, content_key)   // 32 + 16 bytes
//! ```
//!
//! The salt and nonce travel in the recipient entry so the recipient can
//! repeat the derivation.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use pqshare_core::{ShareError, ShareResult};

use crate::keys::ContentKey;
use crate::{KEY_SIZE, NONCE_SIZE, SALT_SIZE, TAG_SIZE};

/// HKDF salt persisted alongside a wrapped key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapSalt(Vec<u8>);

impl WrapSalt {
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

/// A 256-bit wrapping key derived for one recipient. Zeroized on drop.
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A content key sealed for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    /// Encrypted content key with GCM tag appended
    pub wrapped: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Derive a wrapping key from a KEM shared secret.
///
/// With `salt = None` a fresh random salt is generated; pass the returned
/// salt on to the recipient. With `Some(salt)` the salt is used verbatim,
/// which is how a recipient re-derives the same key.
pub fn derive_wrapping_key(
    shared_secret: &[u8],
    salt: Option<&[u8]>,
    context: &str,
) -> ShareResult<(DerivedKey, WrapSalt)> {
    let salt = match salt {
        Some(s) => WrapSalt(s.to_vec()),
        None => WrapSalt::generate(),
    };

    let hkdf = Hkdf::<Sha256>::new(Some(salt.as_bytes()), shared_secret);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(context.as_bytes(), &mut okm)
        .map_err(|e| ShareError::EncryptionFailure(format!("HKDF expand failed: {e}")))?;

    Ok((DerivedKey { bytes: okm }, salt))
}

/// Seal the content key under a derived key with a fresh nonce.
pub fn wrap_content_key(key: &DerivedKey, content_key: &ContentKey) -> ShareResult<WrappedKey> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let wrapped = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), content_key.as_bytes().as_ref())
        .map_err(|e| ShareError::EncryptionFailure(format!("key wrapping failed: {e}")))?;

    Ok(WrappedKey {
        wrapped,
        nonce: nonce_bytes.to_vec(),
    })
}

/// Recover a content key sealed by [`wrap_content_key`].
pub fn unwrap_content_key(key: &DerivedKey, wrapped: &[u8], nonce: &[u8]) -> ShareResult<ContentKey> {
    if nonce.len() != NONCE_SIZE {
        return Err(ShareError::MalformedEnvelope(format!(
            "wrap nonce is {} bytes (expected {NONCE_SIZE})",
            nonce.len()
        )));
    }
    if wrapped.len() != KEY_SIZE + TAG_SIZE {
        return Err(ShareError::MalformedEnvelope(format!(
            "wrapped key is {} bytes (expected {})",
            wrapped.len(),
            KEY_SIZE + TAG_SIZE
        )));
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(nonce), wrapped)
            .map_err(|_| ShareError::Authentication)?,
    );

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    Ok(ContentKey::from_bytes(key_bytes))
}
