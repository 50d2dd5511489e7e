use std::fmt;

use thiserror::Error;

pub type ShareResult<T> = Result<T, ShareError>;

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("no file selected")]
    NoFileSelected,

    #[error("no recipients given")]
    NoRecipients,

    #[error("recipient not found in key directory: {0}")]
    RecipientNotFound(String),

    #[error("key directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("invalid public key for recipient {0}")]
    InvalidPublicKey(String),

    #[error("encryption failed: {0}")]
    EncryptionFailure(String),

    #[error("upload rejected ({status}): {body}")]
    TransportFailure { status: u16, body: String },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    /// AEAD tag mismatch: wrong key, tampered ciphertext, or tampered nonce.
    #[error("authentication failed: wrong key or corrupted data")]
    Authentication,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("envelope has no entry for recipient {0}")]
    NoEntryForRecipient(String),

    #[error("another send is already in progress for this session")]
    PipelineBusy,

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShareError {
    /// Recipient this error is attributable to, if any.
    pub fn recipient(&self) -> Option<&str> {
        match self {
            ShareError::RecipientNotFound(id)
            | ShareError::InvalidPublicKey(id)
            | ShareError::NoEntryForRecipient(id) => Some(id),
            _ => None,
        }
    }

    /// Whether repeating the whole operation later could plausibly succeed.
    ///
    /// Informational only; the pipeline itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            ShareError::DirectoryUnavailable(_) | ShareError::NetworkUnreachable(_) => true,
            ShareError::TransportFailure { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Pipeline step a failure occurred in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    SelectFile,
    Validate,
    GenerateKey,
    EncryptContent,
    Lookup(String),
    Encapsulate(String),
    Wrap(String),
    Assemble,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::SelectFile => f.write_str("select-file"),
            Stage::Validate => f.write_str("validate"),
            Stage::GenerateKey => f.write_str("generate-key"),
            Stage::EncryptContent => f.write_str("encrypt-content"),
            Stage::Lookup(id) => write!(f, "lookup({id})"),
            Stage::Encapsulate(id) => write!(f, "encapsulate({id})"),
            Stage::Wrap(id) => write!(f, "wrap({id})"),
            Stage::Assemble => f.write_str("assemble"),
            Stage::Upload => f.write_str("upload"),
        }
    }
}

/// A failed send: the error plus the step that produced it.
#[derive(Debug, Error)]
#[error("{stage}: {error}")]
pub struct SendFailure {
    pub stage: Stage,
    #[source]
    pub error: ShareError,
}

impl SendFailure {
    pub fn new(stage: Stage, error: ShareError) -> Self {
        Self { stage, error }
    }
}
