use serde::{Deserialize, Serialize};

use crate::error::{ShareError, ShareResult};

/// Environment variable that overrides `api.base_url`
pub const API_BASE_URL_ENV: &str = "PQSHARE_API_BASE_URL";

/// Top-level client configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PqshareConfig {
    pub api: ApiConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Backend base URL (default: http://localhost:5000)
    pub base_url: String,
    /// Per-request timeout in seconds; 0 disables the client-side timeout
    pub request_timeout_secs: u64,
    /// Refuse plaintext HTTP endpoints
    pub enforce_tls: bool,
    /// Route prefix for public key lookups; the recipient id is appended
    pub keys_path: String,
    /// Route for envelope uploads
    pub upload_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".into(),
            request_timeout_secs: 60,
            enforce_tls: false,
            keys_path: "/keys".into(),
            upload_path: "/files/upload".into(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl PqshareConfig {
    pub fn from_toml(s: &str) -> ShareResult<Self> {
        toml::from_str(s).map_err(|e| ShareError::Config(format!("parsing config: {e}")))
    }

    /// Apply `PQSHARE_API_BASE_URL` if set and non-empty.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_BASE_URL_ENV) {
            self.apply_base_url_override(&url);
        }
    }

    fn apply_base_url_override(&mut self, url: &str) {
        let url = url.trim();
        if !url.is_empty() {
            self.api.base_url = url.to_string();
        }
    }
}

impl ApiConfig {
    /// Base URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    /// Reject or warn about plaintext HTTP endpoints.
    ///
    /// With `enforce_tls` an `http://` base URL is a config error; otherwise
    /// it is allowed with a warning (local development).
    pub fn check_transport_security(&self) -> ShareResult<()> {
        let base = self.base_url();
        if base.is_empty() {
            return Err(ShareError::Config("api.base_url is empty".into()));
        }
        if base.starts_with("http://") {
            if self.enforce_tls {
                return Err(ShareError::Config(format!(
                    "API endpoint uses plaintext HTTP ({base}), but enforce_tls is enabled. \
                     Use an HTTPS endpoint or set api.enforce_tls = false for local development."
                )));
            }
            tracing::warn!(
                endpoint = %base,
                "API endpoint uses plaintext HTTP; envelope metadata is transmitted unprotected"
            );
        }
        Ok(())
    }
}
