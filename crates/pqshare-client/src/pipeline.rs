//! Sender session and the send state machine
//!
//! One send per session at a time. Recipients are processed strictly in the
//! order given, one at a time, so only a single shared secret and derived key
//! exist at any moment and progress reporting is monotonic. Any failure
//! aborts the whole send: nothing is uploaded and all key material built so
//! far is dropped (and zeroized) before the error is returned.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use pqshare_core::{
    EnvelopeBuilder, PipelineState, RecipientEntry, SendFailure, ShareError, Stage, UploadReceipt,
};
use pqshare_crypto::{
    derive_wrapping_key, encapsulate, encrypt_content, generate_content_key, wrap_content_key,
    WRAP_CONTEXT,
};

use crate::directory::KeyDirectory;
use crate::transport::UploadTransport;

/// Progress callback, invoked on every state transition with a status line
pub type ProgressFn = Box<dyn Fn(&PipelineState, &str) + Send + Sync>;

/// The file queued for sending
#[derive(Debug, Clone)]
pub struct SelectedFile {
    /// Original file name, sent untouched
    pub name: String,
    pub bytes: Arc<[u8]>,
}

/// Split a comma-separated recipient list, trimming whitespace and dropping
/// empty items. Duplicates are kept: each listed entry gets its own wrap.
pub fn parse_recipients(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub struct SenderSession {
    directory: Arc<dyn KeyDirectory>,
    transport: Arc<dyn UploadTransport>,
    selected: Option<SelectedFile>,
    state: Mutex<PipelineState>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a send returns, on every path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SenderSession {
    pub fn new(directory: Arc<dyn KeyDirectory>, transport: Arc<dyn UploadTransport>) -> Self {
        Self {
            directory,
            transport,
            selected: None,
            state: Mutex::new(PipelineState::Idle),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn select_file(&mut self, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        let file = SelectedFile {
            name: name.into(),
            bytes: bytes.into(),
        };
        debug!(name = %file.name, bytes = file.bytes.len(), "file selected");
        self.selected = Some(file);
    }

    /// Read `path` and select it under its file name.
    pub async fn select_path(&mut self, path: &Path) -> Result<(), ShareError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ShareError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("not a file path: {}", path.display()),
                ))
            })?;
        let bytes = tokio::fs::read(path).await?;
        self.select_file(name, bytes);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&SelectedFile> {
        self.selected.as_ref()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Encrypt the selected file for `recipients` and upload it.
    ///
    /// Rejected with `PipelineBusy` while another send on this session is
    /// running. No retries: after a failure, call `send` again.
    pub async fn send(
        &self,
        recipients: &[String],
        progress: Option<&ProgressFn>,
    ) -> Result<UploadReceipt, SendFailure> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SendFailure::new(Stage::Validate, ShareError::PipelineBusy));
        }
        let _guard = InFlightGuard(&self.in_flight);

        self.transition(PipelineState::Idle, "starting", progress);
        let result = self.run(recipients, progress).await;

        match &result {
            Ok(receipt) => {
                info!(file_id = %receipt.file_id, recipients = recipients.len(), "upload succeeded");
                self.transition(
                    PipelineState::Succeeded,
                    &format!("uploaded, file id {}", receipt.file_id),
                    progress,
                );
            }
            Err(failure) => {
                warn!(stage = %failure.stage, error = %failure.error, "send failed");
                self.transition(PipelineState::Failed, &failure.to_string(), progress);
            }
        }
        result
    }

    async fn run(
        &self,
        recipients: &[String],
        progress: Option<&ProgressFn>,
    ) -> Result<UploadReceipt, SendFailure> {
        let file = self
            .selected
            .clone()
            .ok_or_else(|| SendFailure::new(Stage::SelectFile, ShareError::NoFileSelected))?;
        if recipients.is_empty() {
            return Err(SendFailure::new(Stage::Validate, ShareError::NoRecipients));
        }
        let total = recipients.len();

        let content_key = generate_content_key();
        self.transition(
            PipelineState::KeyGenerated,
            &format!("encrypting {}", file.name),
            progress,
        );

        // AES-GCM over the whole file can take a while; keep it off the
        // async workers.
        let bytes = Arc::clone(&file.bytes);
        let (content_key, encrypted) =
            tokio::task::spawn_blocking(move || {
                let encrypted = encrypt_content(&content_key, &bytes);
                (content_key, encrypted)
            })
            .await
            .map_err(|e| {
                SendFailure::new(
                    Stage::EncryptContent,
                    ShareError::EncryptionFailure(format!("encryption task: {e}")),
                )
            })?;
        let encrypted = encrypted.map_err(|e| SendFailure::new(Stage::EncryptContent, e))?;
        self.transition(
            PipelineState::ContentEncrypted,
            &format!("file encrypted, wrapping key for {total} recipient(s)"),
            progress,
        );

        let mut builder = EnvelopeBuilder::new(file.name.clone(), encrypted, total);
        for (index, recipient_id) in recipients.iter().enumerate() {
            self.transition(
                PipelineState::WrappingRecipient { index, total },
                &format!("fetching public key for {recipient_id} ({}/{total})", index + 1),
                progress,
            );

            let public_key = self
                .directory
                .lookup(recipient_id)
                .await
                .map_err(|e| SendFailure::new(Stage::Lookup(recipient_id.clone()), e))?;

            let encap = encapsulate(&public_key)
                .map_err(|e| SendFailure::new(Stage::Encapsulate(recipient_id.clone()), e))?;

            let wrap_stage = || Stage::Wrap(recipient_id.clone());
            let (wrap_key, salt) =
                derive_wrapping_key(encap.shared_secret.as_bytes(), None, WRAP_CONTEXT)
                    .map_err(|e| SendFailure::new(wrap_stage(), e))?;
            let wrapped = wrap_content_key(&wrap_key, &content_key)
                .map_err(|e| SendFailure::new(wrap_stage(), e))?;

            builder.push(RecipientEntry {
                recipient_id: recipient_id.clone(),
                kem_ciphertext: encap.kem_ciphertext,
                wrapped_content_key: wrapped.wrapped,
                wrap_nonce: wrapped.nonce,
                hkdf_salt: salt.into_vec(),
            });
            debug!(recipient = %recipient_id, done = index + 1, total, "wrapped content key");
        }

        let envelope = builder
            .finalize()
            .map_err(|e| SendFailure::new(Stage::Assemble, e))?;
        drop(content_key);
        self.transition(PipelineState::Ready, "envelope ready", progress);

        self.transition(
            PipelineState::Uploading,
            "uploading encrypted file",
            progress,
        );
        self.transport
            .upload(&envelope)
            .await
            .map_err(|e| SendFailure::new(Stage::Upload, e))
    }

    fn transition(&self, next: PipelineState, message: &str, progress: Option<&ProgressFn>) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
        debug!(state = ?next, "{message}");
        if let Some(report) = progress {
            report(&next, message);
        }
    }
}
