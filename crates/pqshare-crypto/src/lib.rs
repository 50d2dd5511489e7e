//! pqshare-crypto: client-side encryption and per-recipient key distribution
//!
//! Pipeline: content key → AES-256-GCM(file) once → per recipient:
//! ML-KEM-768 encapsulate → HKDF-SHA256 → AES-256-GCM(content key)
//!
//! ```text
//! ContentKey (256-bit random, one per upload, never leaves memory)
//!   ├── Content AEAD: AES-256-GCM (key=content_key, nonce=random_96bit)
//!   └── per recipient i:
//!         (kem_ct_i, ss_i)  = ML-KEM-768.Encaps(pk_i)
//!         wrap_key_i        = HKDF-SHA256(salt=random_256bit, ikm=ss_i, info="file-wrap")
//!         wrapped_i         = AES-256-GCM(key=wrap_key_i, nonce=random_96bit, content_key)
//! ```
//!
//! All key types zeroize on drop and redact themselves in `Debug` output.

pub mod content;
pub mod kem;
pub mod keys;
pub mod recipient;
pub mod wrap;

pub use content::{decrypt_content, encrypt_content};
pub use kem::{encapsulate, EncapsulationResult, RecipientKeypair, RecipientPublicKey, SharedSecret};
pub use keys::{generate_content_key, ContentKey};
pub use recipient::{open_entry, open_envelope};
pub use wrap::{derive_wrapping_key, unwrap_content_key, wrap_content_key, DerivedKey, WrapSalt, WrappedKey};

/// Size of the content key and of every derived wrapping key (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of an AES-GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the per-recipient HKDF salt
pub const SALT_SIZE: usize = 32;

/// HKDF `info` label for the wrapping key.
///
/// Changing this breaks every existing recipient entry; bump
/// `PROTOCOL_VERSION` alongside it.
pub const WRAP_CONTEXT: &str = "file-wrap";

/// Envelope protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Algorithm suite identifier for `PROTOCOL_VERSION`
pub const SUITE_V1: &str = "ML-KEM-768+HKDF-SHA256+AES-256-GCM";
