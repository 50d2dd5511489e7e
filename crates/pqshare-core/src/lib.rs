//! pqshare-core: types shared by the pqshare crypto, client, and CLI crates
//!
//! - `error`: the failure taxonomy every pipeline step reports through
//! - `types`: wire records and pipeline state
//! - `envelope`: the upload envelope and its builder
//! - `config`: TOML configuration schema

pub mod config;
pub mod envelope;
pub mod error;
pub mod types;

pub use envelope::{EnvelopeBuilder, UploadEnvelope};
pub use error::{SendFailure, ShareError, ShareResult, Stage};
pub use types::{EncryptedContent, EnvelopeMetadata, PipelineState, RecipientEntry, UploadReceipt};
