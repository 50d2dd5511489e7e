//! In-memory key directory and upload transport for pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use pqshare_client::{KeyDirectory, SenderSession, UploadTransport};
use pqshare_core::{ShareError, ShareResult, UploadEnvelope, UploadReceipt};
use pqshare_crypto::{RecipientKeypair, RecipientPublicKey};

/// Directory backed by generated keypairs; unknown ids are `RecipientNotFound`.
#[derive(Default)]
pub struct MemoryDirectory {
    keys: HashMap<String, Vec<u8>>,
    lookups: Mutex<Vec<String>>,
    unavailable: bool,
    gate: Option<Arc<Gate>>,
}

/// Parks a lookup until released, to hold a send in flight.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl MemoryDirectory {
    pub fn with_recipients(ids: &[&str]) -> (Self, HashMap<String, RecipientKeypair>) {
        let mut dir = Self::default();
        let mut keypairs = HashMap::new();
        for id in ids {
            let keypair = RecipientKeypair::generate(*id);
            dir.keys.insert(id.to_string(), keypair.public_key().as_bytes().to_vec());
            keypairs.insert(id.to_string(), keypair);
        }
        (dir, keypairs)
    }

    pub fn insert_raw(&mut self, id: &str, bytes: Vec<u8>) {
        self.keys.insert(id.to_string(), bytes);
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn gated(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeyDirectory for MemoryDirectory {
    async fn lookup(&self, recipient_id: &str) -> ShareResult<RecipientPublicKey> {
        self.lookups.lock().unwrap().push(recipient_id.to_string());
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.unavailable {
            return Err(ShareError::DirectoryUnavailable("connection refused".into()));
        }
        self.keys
            .get(recipient_id)
            .map(|bytes| RecipientPublicKey::new(recipient_id, bytes.clone()))
            .ok_or_else(|| ShareError::RecipientNotFound(recipient_id.to_string()))
    }
}

/// Records every envelope it receives.
#[derive(Default)]
pub struct RecordingTransport {
    uploads: Mutex<Vec<UploadEnvelope>>,
    reject_with: Option<(u16, String)>,
}

impl RecordingTransport {
    pub fn rejecting(status: u16, body: &str) -> Self {
        Self {
            reject_with: Some((status, body.to_string())),
            ..Default::default()
        }
    }

    pub fn uploads(&self) -> Vec<UploadEnvelope> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadTransport for RecordingTransport {
    async fn upload(&self, envelope: &UploadEnvelope) -> ShareResult<UploadReceipt> {
        self.uploads.lock().unwrap().push(envelope.clone());
        if let Some((status, body)) = &self.reject_with {
            return Err(ShareError::TransportFailure {
                status: *status,
                body: body.clone(),
            });
        }
        let n = self.uploads.lock().unwrap().len();
        Ok(UploadReceipt {
            file_id: format!("file-{n:04}"),
        })
    }
}

pub fn session(
    directory: Arc<MemoryDirectory>,
    transport: Arc<RecordingTransport>,
) -> SenderSession {
    SenderSession::new(directory, transport)
}

pub fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
