//! Upload envelope: one encrypted payload plus one wrap record per recipient
//!
//! ```text
//! multipart/form-data
//!   filename          text    original file name, untouched
//!   contentNonce      text    base64 content cipher nonce
//!   recipients        text    JSON array of RecipientEntry, input order
//!   encryptedContent  binary  ciphertext || tag (not base64)
//! ```

use crate::error::{ShareError, ShareResult};
use crate::types::{EncryptedContent, EnvelopeMetadata, RecipientEntry};

/// A complete, immutable upload.
#[derive(Debug, Clone)]
pub struct UploadEnvelope {
    filename: String,
    content: EncryptedContent,
    recipients: Vec<RecipientEntry>,
}

impl UploadEnvelope {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_nonce(&self) -> &[u8] {
        &self.content.nonce
    }

    pub fn encrypted_content(&self) -> &[u8] {
        &self.content.ciphertext
    }

    pub fn recipients(&self) -> &[RecipientEntry] {
        &self.recipients
    }

    /// The `recipients` form field.
    pub fn recipients_json(&self) -> ShareResult<String> {
        serde_json::to_string(&self.recipients)
            .map_err(|e| ShareError::MalformedEnvelope(format!("recipients serialization: {e}")))
    }

    pub fn metadata(&self) -> EnvelopeMetadata {
        EnvelopeMetadata {
            filename: self.filename.clone(),
            content_nonce: self.content.nonce.clone(),
            recipients: self.recipients.clone(),
        }
    }
}

/// Accumulates recipient entries for a single encrypted payload.
///
/// The number of recipients is fixed up front so that `finalize` can refuse
/// to produce a partial envelope.
#[derive(Debug)]
pub struct EnvelopeBuilder {
    filename: String,
    content: EncryptedContent,
    expected: usize,
    recipients: Vec<RecipientEntry>,
}

impl EnvelopeBuilder {
    pub fn new(filename: impl Into<String>, content: EncryptedContent, expected: usize) -> Self {
        Self {
            filename: filename.into(),
            content,
            expected,
            recipients: Vec::with_capacity(expected),
        }
    }

    /// Append the next recipient's entry. Order is preserved.
    pub fn push(&mut self, entry: RecipientEntry) {
        self.recipients.push(entry);
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.expected > 0 && self.recipients.len() == self.expected
    }

    pub fn finalize(self) -> ShareResult<UploadEnvelope> {
        if self.expected == 0 || self.recipients.is_empty() {
            return Err(ShareError::NoRecipients);
        }
        if self.recipients.len() != self.expected {
            return Err(ShareError::MalformedEnvelope(format!(
                "expected {} recipient entries, have {}",
                self.expected,
                self.recipients.len()
            )));
        }

        Ok(UploadEnvelope {
            filename: self.filename,
            content: self.content,
            recipients: self.recipients,
        })
    }
}
