//! ML-KEM-768 key encapsulation against recipient public keys

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, EncodedSizeUser, KemCore, MlKem768};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use pqshare_core::{ShareError, ShareResult};

use crate::KEY_SIZE;

type DecapsulationKey = <MlKem768 as KemCore>::DecapsulationKey;
type EncapsulationKey = <MlKem768 as KemCore>::EncapsulationKey;

/// Encoded ML-KEM-768 encapsulation key size
pub const PUBLIC_KEY_SIZE: usize = 1184;

/// ML-KEM-768 ciphertext size
pub const CIPHERTEXT_SIZE: usize = 1088;

/// A recipient's encapsulation key as published in the key directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientPublicKey {
    recipient_id: String,
    bytes: Vec<u8>,
}

impl RecipientPublicKey {
    pub fn new(recipient_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            bytes,
        }
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// KEM shared secret. Single use; zeroized on drop.
pub struct SharedSecret {
    bytes: [u8; KEY_SIZE],
}

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    fn from_slice(slice: &[u8]) -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(slice);
        Self { bytes }
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Output of one encapsulation: the ciphertext for the recipient and the
/// shared secret only the sender and that recipient can compute.
#[derive(Debug)]
pub struct EncapsulationResult {
    pub kem_ciphertext: Vec<u8>,
    pub shared_secret: SharedSecret,
}

/// Run ML-KEM-768 encapsulation against `public_key`.
///
/// Every call draws fresh randomness, so encapsulating twice to the same key
/// yields unrelated ciphertexts and secrets.
pub fn encapsulate(public_key: &RecipientPublicKey) -> ShareResult<EncapsulationResult> {
    let invalid = || ShareError::InvalidPublicKey(public_key.recipient_id.clone());

    if public_key.bytes.len() != PUBLIC_KEY_SIZE {
        return Err(invalid());
    }
    let pk_bytes: &[u8] = &public_key.bytes;
    let ek = EncapsulationKey::from_bytes(&pk_bytes.try_into().map_err(|_| invalid())?);
    // Coefficients >= q are reduced on decode, so a non-canonical key
    // does not re-encode to the same bytes.
    if ek.as_bytes().as_slice() != pk_bytes {
        return Err(invalid());
    }

    let (kem_ct, shared) = ek.encapsulate(&mut OsRng).map_err(|_| invalid())?;

    Ok(EncapsulationResult {
        kem_ciphertext: kem_ct.as_slice().to_vec(),
        shared_secret: SharedSecret::from_slice(shared.as_slice()),
    })
}

/// A recipient's ML-KEM-768 key pair.
pub struct RecipientKeypair {
    recipient_id: String,
    decapsulation_key: DecapsulationKey,
    public_key: Vec<u8>,
}

/// On-disk key file written by `pqshare keygen`
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyFile {
    recipient_id: String,
    public_key: String,
    secret_key: String,
}

impl Drop for KeyFile {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

impl RecipientKeypair {
    pub fn generate(recipient_id: impl Into<String>) -> Self {
        let (dk, ek) = MlKem768::generate(&mut OsRng);
        Self {
            recipient_id: recipient_id.into(),
            decapsulation_key: dk,
            public_key: ek.as_bytes().to_vec(),
        }
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    pub fn public_key(&self) -> RecipientPublicKey {
        RecipientPublicKey::new(self.recipient_id.clone(), self.public_key.clone())
    }

    /// Public key in the transport encoding the key directory serves.
    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(&self.public_key)
    }

    /// Recover the shared secret from an encapsulation ciphertext.
    ///
    /// ML-KEM decapsulation never reports a wrong key directly: a ciphertext
    /// meant for someone else yields an unrelated secret, which then fails
    /// authentication when unwrapping.
    pub fn decapsulate(&self, kem_ciphertext: &[u8]) -> ShareResult<SharedSecret> {
        if kem_ciphertext.len() != CIPHERTEXT_SIZE {
            return Err(ShareError::MalformedEnvelope(format!(
                "kem ciphertext is {} bytes (expected {CIPHERTEXT_SIZE})",
                kem_ciphertext.len()
            )));
        }
        let kem_ct: Ciphertext<MlKem768> = kem_ciphertext
            .try_into()
            .map_err(|_| ShareError::MalformedEnvelope("kem ciphertext".into()))?;
        let shared = self
            .decapsulation_key
            .decapsulate(&kem_ct)
            .map_err(|_| ShareError::MalformedEnvelope("decapsulation".into()))?;
        Ok(SharedSecret::from_slice(shared.as_slice()))
    }

    pub fn to_json(&self) -> ShareResult<Zeroizing<String>> {
        let secret = Zeroizing::new(self.decapsulation_key.as_bytes().to_vec());
        let file = KeyFile {
            recipient_id: self.recipient_id.clone(),
            public_key: STANDARD.encode(&self.public_key),
            secret_key: STANDARD.encode(secret.as_slice()),
        };
        serde_json::to_string_pretty(&file)
            .map(Zeroizing::new)
            .map_err(|e| ShareError::MalformedEnvelope(format!("key file serialization: {e}")))
    }

    pub fn from_json(json: &str) -> ShareResult<Self> {
        let file: KeyFile = serde_json::from_str(json)
            .map_err(|e| ShareError::MalformedEnvelope(format!("key file: {e}")))?;

        let public_key = STANDARD
            .decode(&file.public_key)
            .map_err(|e| ShareError::MalformedEnvelope(format!("key file public key: {e}")))?;
        if public_key.len() != PUBLIC_KEY_SIZE {
            return Err(ShareError::InvalidPublicKey(file.recipient_id.clone()));
        }

        let secret = Zeroizing::new(
            STANDARD
                .decode(&file.secret_key)
                .map_err(|e| ShareError::MalformedEnvelope(format!("key file secret key: {e}")))?,
        );
        let sk_bytes: &[u8] = &secret;
        let decapsulation_key = DecapsulationKey::from_bytes(
            &sk_bytes
                .try_into()
                .map_err(|_| ShareError::MalformedEnvelope("key file secret key length".into()))?,
        );

        Ok(Self {
            recipient_id: file.recipient_id.clone(),
            decapsulation_key,
            public_key,
        })
    }

    /// Write the key file, readable only by the owner on Unix.
    pub fn save(&self, path: &Path) -> ShareResult<()> {
        let json = self.to_json()?;
        std::fs::write(path, json.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), recipient = %self.recipient_id, "wrote key file");
        Ok(())
    }

    pub fn load(path: &Path) -> ShareResult<Self> {
        let json = Zeroizing::new(std::fs::read_to_string(path)?);
        Self::from_json(&json)
    }
}

impl std::fmt::Debug for RecipientKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipientKeypair")
            .field("recipient_id", &self.recipient_id)
            .field("decapsulation_key", &"[REDACTED]")
            .finish()
    }
}
