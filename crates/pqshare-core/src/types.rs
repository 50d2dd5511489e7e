use serde::{Deserialize, Serialize};

/// File payload after content encryption.
///
/// `ciphertext` carries the 16-byte AEAD tag at its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedContent {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Per-recipient wrap record.
///
/// Self-contained: a recipient holding the matching decapsulation key can
/// recover the content key from this entry alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientEntry {
    /// Directory identifier, verbatim as supplied by the sender
    pub recipient_id: String,
    /// ML-KEM ciphertext
    #[serde(with = "b64")]
    pub kem_ciphertext: Vec<u8>,
    /// Content key sealed under the HKDF-derived wrapping key (tag appended)
    #[serde(with = "b64")]
    pub wrapped_content_key: Vec<u8>,
    #[serde(with = "b64")]
    pub wrap_nonce: Vec<u8>,
    #[serde(with = "b64")]
    pub hkdf_salt: Vec<u8>,
}

/// Everything in an upload except the encrypted payload itself.
///
/// This is what the backend keeps next to the stored blob and what a
/// recipient needs, together with the blob, to open the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    pub filename: String,
    #[serde(with = "b64")]
    pub content_nonce: Vec<u8>,
    pub recipients: Vec<RecipientEntry>,
}

impl EnvelopeMetadata {
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| anyhow::anyhow!("metadata serialization: {e}"))
    }

    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(data).map_err(|e| anyhow::anyhow!("metadata deserialization: {e}"))
    }
}

/// Backend acknowledgement of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Identifier the backend assigned to the stored file
    pub file_id: String,
}

/// Where a send currently is.
///
/// Transitions only move forward; any failure jumps straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    KeyGenerated,
    ContentEncrypted,
    /// Wrapping for recipient `index` (0-based) of `total`
    WrappingRecipient { index: usize, total: usize },
    Ready,
    Uploading,
    Succeeded,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed)
    }
}

pub(crate) mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD
            .decode(s.as_bytes())
            .map_err(|e| serde::de::Error::custom(format!("base64 decode: {e}")))
    }
}
