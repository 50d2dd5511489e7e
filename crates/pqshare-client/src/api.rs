//! HTTP backend client: key directory lookups and envelope uploads

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use pqshare_core::config::ApiConfig;
use pqshare_core::{ShareError, ShareResult, UploadEnvelope, UploadReceipt};
use pqshare_crypto::RecipientPublicKey;

use crate::directory::KeyDirectory;
use crate::transport::UploadTransport;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyResponse {
    public_key: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    id: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base: Url,
    keys_path: String,
    upload_path: String,
    client: Client,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> ShareResult<Self> {
        config.check_transport_security()?;

        let base = Url::parse(config.base_url())
            .map_err(|e| ShareError::Config(format!("invalid api.base_url {}: {e}", config.base_url())))?;
        if base.cannot_be_a_base() {
            return Err(ShareError::Config(format!(
                "api.base_url cannot be used as a base: {base}"
            )));
        }

        let mut builder = Client::builder();
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| ShareError::Config(format!("building HTTP client: {e}")))?;

        Ok(Self {
            base,
            keys_path: config.keys_path.clone(),
            upload_path: config.upload_path.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `{base}{keys_path}/{recipient_id}`, with the id percent-encoded as a
    /// single path segment.
    pub fn key_url(&self, recipient_id: &str) -> Url {
        let mut url = self.route(&self.keys_path);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(recipient_id);
        }
        url
    }

    pub fn upload_url(&self) -> Url {
        self.route(&self.upload_path)
    }

    fn route(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }
}

#[async_trait]
impl KeyDirectory for ApiClient {
    async fn lookup(&self, recipient_id: &str) -> ShareResult<RecipientPublicKey> {
        let url = self.key_url(recipient_id);
        debug!(recipient = %recipient_id, url = %url, "looking up public key");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ShareError::DirectoryUnavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ShareError::RecipientNotFound(recipient_id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShareError::DirectoryUnavailable(format!(
                "status {}: {body}",
                status.as_u16()
            )));
        }

        let body: PublicKeyResponse = response
            .json()
            .await
            .map_err(|e| ShareError::DirectoryUnavailable(format!("malformed directory response: {e}")))?;
        let bytes = STANDARD
            .decode(body.public_key.trim())
            .map_err(|_| ShareError::InvalidPublicKey(recipient_id.to_string()))?;

        debug!(recipient = %recipient_id, bytes = bytes.len(), "public key resolved");
        Ok(RecipientPublicKey::new(recipient_id, bytes))
    }
}

#[async_trait]
impl UploadTransport for ApiClient {
    async fn upload(&self, envelope: &UploadEnvelope) -> ShareResult<UploadReceipt> {
        let url = self.upload_url();

        let payload = multipart::Part::bytes(envelope.encrypted_content().to_vec())
            .file_name("file.bin")
            .mime_str("application/octet-stream")
            .map_err(|e| ShareError::MalformedEnvelope(format!("payload part: {e}")))?;
        let form = multipart::Form::new()
            .text("filename", envelope.filename().to_string())
            .text("contentNonce", STANDARD.encode(envelope.content_nonce()))
            .text("recipients", envelope.recipients_json()?)
            .part("encryptedContent", payload);

        debug!(
            url = %url,
            recipients = envelope.recipients().len(),
            bytes = envelope.encrypted_content().len(),
            "uploading envelope"
        );

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ShareError::NetworkUnreachable(e.to_string()))?;

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) if status.is_success() => return Err(ShareError::NetworkUnreachable(e.to_string())),
            Err(e) => {
                debug!(status = status.as_u16(), error = %e, "rejection body unreadable");
                String::new()
            }
        };

        if !status.is_success() {
            return Err(ShareError::TransportFailure {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: UploadResponse = serde_json::from_str(&body).map_err(|_| ShareError::TransportFailure {
            status: status.as_u16(),
            body: body.clone(),
        })?;
        let file_id = match parsed.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            _ => String::new(),
        };
        if file_id.is_empty() {
            return Err(ShareError::TransportFailure {
                status: status.as_u16(),
                body: format!("response carried no file id: {body}"),
            });
        }

        Ok(UploadReceipt { file_id })
    }
}
