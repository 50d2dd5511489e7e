//! pqshare-client: the sender side of a share
//!
//! ```text
//! SenderSession::send
//!   Idle → KeyGenerated → ContentEncrypted
//!     → WrappingRecipient(0..N)   lookup → encapsulate → derive → wrap, one at a time
//!     → Ready → Uploading → Succeeded | Failed
//! ```
//!
//! The backend is reached through two traits, [`KeyDirectory`] and
//! [`UploadTransport`]; [`ApiClient`] implements both over HTTP.

pub mod api;
pub mod directory;
pub mod pipeline;
pub mod transport;

pub use api::ApiClient;
pub use directory::KeyDirectory;
pub use pipeline::{parse_recipients, ProgressFn, SelectedFile, SenderSession};
pub use transport::UploadTransport;
