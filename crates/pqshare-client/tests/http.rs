//! `ApiClient` against a local axum backend speaking the share protocol.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;

use pqshare_client::{ApiClient, KeyDirectory, SenderSession, UploadTransport};
use pqshare_core::config::ApiConfig;
use pqshare_core::{
    EncryptedContent, EnvelopeBuilder, EnvelopeMetadata, RecipientEntry, ShareError, Stage,
    UploadEnvelope,
};
use pqshare_crypto::kem::PUBLIC_KEY_SIZE;
use pqshare_crypto::{open_envelope, RecipientKeypair};

/// Multipart fields as the backend received them
#[derive(Debug, Default, Clone)]
struct Received {
    filename: Option<String>,
    content_nonce: Option<String>,
    recipients: Option<String>,
    content: Option<Vec<u8>>,
    content_file_name: Option<String>,
    content_type: Option<String>,
}

struct Backend {
    keys: HashMap<String, String>,
    upload_status: StatusCode,
    upload_body: String,
    received: Mutex<Vec<Received>>,
}

impl Backend {
    fn new(keypairs: &[&RecipientKeypair]) -> Self {
        let mut keys: HashMap<String, String> = keypairs
            .iter()
            .map(|k| (k.recipient_id().to_string(), k.public_key_base64()))
            .collect();
        keys.insert("garbled".into(), "@@not base64@@".into());
        Self {
            keys,
            upload_status: StatusCode::OK,
            upload_body: json!({ "id": "f-7c1e" }).to_string(),
            received: Mutex::new(Vec::new()),
        }
    }

    fn replying(mut self, status: StatusCode, body: impl Into<String>) -> Self {
        self.upload_status = status;
        self.upload_body = body.into();
        self
    }

    fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

async fn public_key(State(backend): State<Arc<Backend>>, Path(id): Path<String>) -> Response {
    if id == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "key store offline").into_response();
    }
    match backend.keys.get(&id) {
        Some(key) => Json(json!({ "publicKey": key })).into_response(),
        None => (StatusCode::NOT_FOUND, "no such user").into_response(),
    }
}

async fn upload(State(backend): State<Arc<Backend>>, mut multipart: Multipart) -> Response {
    let mut received = Received::default();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "filename" => received.filename = Some(field.text().await.unwrap()),
            "contentNonce" => received.content_nonce = Some(field.text().await.unwrap()),
            "recipients" => received.recipients = Some(field.text().await.unwrap()),
            "encryptedContent" => {
                received.content_file_name = field.file_name().map(String::from);
                received.content_type = field.content_type().map(String::from);
                received.content = Some(field.bytes().await.unwrap().to_vec());
            }
            other => panic!("unexpected form field {other}"),
        }
    }
    backend.received.lock().unwrap().push(received);
    (backend.upload_status, backend.upload_body.clone()).into_response()
}

async fn serve(backend: Arc<Backend>) -> ApiClient {
    let router = Router::new()
        .route("/keys/{id}", get(public_key))
        .route("/files/upload", post(upload))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    client(&format!("http://{addr}"))
}

fn client(base_url: &str) -> ApiClient {
    ApiClient::new(&ApiConfig {
        base_url: base_url.into(),
        request_timeout_secs: 10,
        ..Default::default()
    })
    .unwrap()
}

fn small_envelope() -> UploadEnvelope {
    let mut builder = EnvelopeBuilder::new(
        "notes.txt",
        EncryptedContent {
            ciphertext: vec![0xAB; 40],
            nonce: vec![7; 12],
        },
        1,
    );
    builder.push(RecipientEntry {
        recipient_id: "alice".into(),
        kem_ciphertext: vec![1; 1088],
        wrapped_content_key: vec![2; 48],
        wrap_nonce: vec![3; 12],
        hkdf_salt: vec![4; 32],
    });
    builder.finalize().unwrap()
}

#[tokio::test]
async fn lookup_decodes_public_key() {
    let alice = RecipientKeypair::generate("alice");
    let api = serve(Arc::new(Backend::new(&[&alice]))).await;

    let key = api.lookup("alice").await.unwrap();

    assert_eq!(key.recipient_id(), "alice");
    assert_eq!(key.as_bytes().len(), PUBLIC_KEY_SIZE);
    assert_eq!(key, alice.public_key());
}

#[tokio::test]
async fn lookup_not_found_names_recipient() {
    let api = serve(Arc::new(Backend::new(&[]))).await;

    match api.lookup("unknown-user").await {
        Err(ShareError::RecipientNotFound(id)) => assert_eq!(id, "unknown-user"),
        other => panic!("expected RecipientNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn lookup_server_error_is_directory_unavailable() {
    let api = serve(Arc::new(Backend::new(&[]))).await;

    match api.lookup("broken").await {
        Err(ShareError::DirectoryUnavailable(msg)) => {
            assert!(msg.contains("500"), "{msg}");
            assert!(msg.contains("key store offline"), "{msg}");
        }
        other => panic!("expected DirectoryUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn lookup_undecodable_key_is_invalid_public_key() {
    let api = serve(Arc::new(Backend::new(&[]))).await;

    assert!(matches!(
        api.lookup("garbled").await,
        Err(ShareError::InvalidPublicKey(id)) if id == "garbled"
    ));
}

#[tokio::test]
async fn upload_sends_protocol_fields() {
    let backend = Arc::new(Backend::new(&[]));
    let api = serve(backend.clone()).await;
    let envelope = small_envelope();

    let receipt = api.upload(&envelope).await.unwrap();
    assert_eq!(receipt.file_id, "f-7c1e");

    let received = backend.received();
    assert_eq!(received.len(), 1);
    let got = &received[0];
    assert_eq!(got.filename.as_deref(), Some("notes.txt"));
    assert_eq!(got.content_nonce.as_deref(), Some(STANDARD.encode([7u8; 12]).as_str()));
    assert_eq!(got.content.as_deref(), Some(&[0xAB; 40][..]), "payload is raw bytes");
    assert_eq!(got.content_file_name.as_deref(), Some("file.bin"));
    assert_eq!(got.content_type.as_deref(), Some("application/octet-stream"));

    let recipients: serde_json::Value =
        serde_json::from_str(got.recipients.as_deref().unwrap()).unwrap();
    let entry = &recipients[0];
    assert_eq!(entry["recipientId"], "alice");
    assert_eq!(entry["hkdfSalt"], STANDARD.encode([4u8; 32]));
    assert_eq!(entry["wrapNonce"], STANDARD.encode([3u8; 12]));
    assert!(entry["kemCiphertext"].is_string());
    assert!(entry["wrappedContentKey"].is_string());
}

#[tokio::test]
async fn upload_accepts_numeric_id() {
    let backend = Backend::new(&[]).replying(StatusCode::CREATED, r#"{"id": 42}"#);
    let api = serve(Arc::new(backend)).await;

    let receipt = api.upload(&small_envelope()).await.unwrap();
    assert_eq!(receipt.file_id, "42");
}

#[tokio::test]
async fn upload_rejection_keeps_server_body() {
    let backend = Backend::new(&[]).replying(StatusCode::PAYLOAD_TOO_LARGE, "file too large");
    let api = serve(Arc::new(backend)).await;

    match api.upload(&small_envelope()).await {
        Err(ShareError::TransportFailure { status, body }) => {
            assert_eq!(status, 413);
            assert_eq!(body, "file too large");
        }
        other => panic!("expected TransportFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn upload_without_id_is_rejected() {
    let backend = Backend::new(&[]).replying(StatusCode::OK, r#"{"ok": true}"#);
    let api = serve(Arc::new(backend)).await;

    assert!(matches!(
        api.upload(&small_envelope()).await,
        Err(ShareError::TransportFailure { status: 200, .. })
    ));
}

/// Reads one request, then answers with a status line and a body cut short.
async fn serve_truncated_rejection(status_line: &'static str) -> ApiClient {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            if request_complete(&request) {
                break;
            }
        }
        let response = format!("HTTP/1.1 {status_line}\r\ncontent-length: 64\r\n\r\npartial");
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });

    client(&format!("http://{addr}"))
}

fn request_complete(request: &[u8]) -> bool {
    let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
    let body = &request[end + 4..];
    let content_length = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok());
    match content_length {
        Some(len) => body.len() >= len,
        None => body.ends_with(b"0\r\n\r\n"),
    }
}

#[tokio::test]
async fn upload_rejection_with_unreadable_body_keeps_status() {
    let api = serve_truncated_rejection("502 Bad Gateway").await;

    match api.upload(&small_envelope()).await {
        Err(ShareError::TransportFailure { status, body }) => {
            assert_eq!(status, 502);
            assert!(body.is_empty(), "{body}");
        }
        other => panic!("expected TransportFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_backend() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let api = client(&format!("http://{addr}"));

    let upload = api.upload(&small_envelope()).await;
    assert!(matches!(upload, Err(ShareError::NetworkUnreachable(_))));
    assert!(upload.unwrap_err().is_retryable());

    assert!(matches!(
        api.lookup("alice").await,
        Err(ShareError::DirectoryUnavailable(_))
    ));
}

#[tokio::test]
async fn send_over_http_and_open_as_recipient() {
    let alice = RecipientKeypair::generate("alice");
    let bob = RecipientKeypair::generate("bob");
    let backend = Arc::new(Backend::new(&[&alice, &bob]));
    let api = Arc::new(serve(backend.clone()).await);

    let mut sender = SenderSession::new(api.clone(), api);
    sender.select_file("report.pdf", b"numbers and more numbers".to_vec());
    let receipt = sender
        .send(&["alice".to_string(), "bob".to_string()], None)
        .await
        .unwrap();
    assert_eq!(receipt.file_id, "f-7c1e");

    let got = backend.received().pop().unwrap();
    let metadata = EnvelopeMetadata {
        filename: got.filename.unwrap(),
        content_nonce: STANDARD.decode(got.content_nonce.unwrap()).unwrap(),
        recipients: serde_json::from_str::<Vec<RecipientEntry>>(&got.recipients.unwrap()).unwrap(),
    };
    let content = got.content.unwrap();

    assert_eq!(metadata.filename, "report.pdf");
    for keypair in [&alice, &bob] {
        let plaintext = open_envelope(keypair, &metadata, &content).unwrap();
        assert_eq!(plaintext, b"numbers and more numbers");
    }
}

#[tokio::test]
async fn send_over_http_stops_at_missing_recipient() {
    let alice = RecipientKeypair::generate("alice");
    let backend = Arc::new(Backend::new(&[&alice]));
    let api = Arc::new(serve(backend.clone()).await);

    let mut sender = SenderSession::new(api.clone(), api);
    sender.select_file("a.txt", b"x".to_vec());
    let failure = sender
        .send(&["alice".to_string(), "nobody".to_string()], None)
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Lookup("nobody".into()));
    assert!(backend.received().is_empty());
}
