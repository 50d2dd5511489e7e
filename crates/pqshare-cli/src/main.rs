//! pqshare: post-quantum file sharing CLI
//!
//! Commands:
//!   send <file> --to <ids>   - encrypt a file for one or more recipients and upload it
//!   keygen --out <path>      - create a recipient keypair file
//!   open --key ... --out ... - decrypt a downloaded file with a keypair file
//!   config show              - display current configuration

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pqshare_client::{parse_recipients, ApiClient, ProgressFn, SenderSession, UploadTransport};
use pqshare_core::config::PqshareConfig;
use pqshare_core::{EnvelopeMetadata, PipelineState, ShareError, ShareResult, UploadEnvelope, UploadReceipt};
use pqshare_crypto::{open_envelope, RecipientKeypair};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "pqshare",
    version,
    about = "Post-quantum multi-recipient file sharing",
    long_about = "pqshare: encrypt a file once, wrap its key for each recipient with ML-KEM-768, and upload the envelope"
)]
struct Cli {
    /// Path to pqshare config.toml
    #[arg(
        long,
        short = 'c',
        env = "PQSHARE_CONFIG",
        default_value = "~/.config/pqshare/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "PQSHARE_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides [log] format
    #[arg(long, env = "PQSHARE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file for the given recipients and upload it
    ///
    /// The backend is taken from [api] base_url, or PQSHARE_API_BASE_URL.
    Send {
        /// File to send
        file: PathBuf,
        /// Recipient ids, comma-separated; may be repeated
        #[arg(long = "to", short = 't', required = true)]
        to: Vec<String>,
        /// Also write the uploaded envelope (meta.json + file.bin) to this directory
        #[arg(long)]
        save_envelope: Option<PathBuf>,
    },

    /// Generate a recipient keypair file
    Keygen {
        /// Key file to write
        #[arg(long, short = 'o')]
        out: PathBuf,
        /// Recipient id stored in the key file (default: key file stem)
        #[arg(long)]
        id: Option<String>,
        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Decrypt a downloaded file as one of its recipients
    Open {
        /// Key file written by `pqshare keygen`
        #[arg(long, short = 'k')]
        key: PathBuf,
        /// Envelope metadata JSON (filename, contentNonce, recipients)
        #[arg(long, short = 'm')]
        metadata: PathBuf,
        /// Encrypted payload as uploaded
        #[arg(long)]
        content: PathBuf,
        /// Output path (default: original file name in the current directory)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (defaults + config file + environment)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let (config, from_file) = load_config(&config_path).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or_else(|| {
        if config.log.format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    });
    init_logging(&level, &format);

    if !from_file {
        tracing::debug!(
            "config file not found: {}  (using defaults)",
            config_path.display()
        );
    }

    match cli.command {
        Commands::Send { file, to, save_envelope } => {
            cmd_send(&config, &file, &to, save_envelope.as_deref()).await
        }
        Commands::Keygen { out, id, force } => cmd_keygen(&out, id.as_deref(), force),
        Commands::Open { key, metadata, content, out } => {
            cmd_open(&key, &metadata, &content, out.as_deref()).await
        }
        Commands::Config { action: ConfigAction::Show } => {
            cmd_config_show(&config, &config_path, from_file)
        }
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<(PqshareConfig, bool)> {
    let (mut config, from_file) = if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = PqshareConfig::from_toml(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        (config, true)
    } else {
        (PqshareConfig::default(), false)
    };
    config.apply_env();
    Ok((config, from_file))
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `pqshare send` ────────────────────────────────────────────────────────────

/// Writes the envelope to a local directory, then hands it to the backend.
struct SavingTransport {
    inner: Arc<ApiClient>,
    dir: PathBuf,
}

#[async_trait]
impl UploadTransport for SavingTransport {
    async fn upload(&self, envelope: &UploadEnvelope) -> ShareResult<UploadReceipt> {
        let metadata = envelope
            .metadata()
            .to_bytes()
            .map_err(|e| ShareError::MalformedEnvelope(e.to_string()))?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join("meta.json"), metadata).await?;
        tokio::fs::write(self.dir.join("file.bin"), envelope.encrypted_content()).await?;
        tracing::debug!(dir = %self.dir.display(), "saved envelope copy");

        self.inner.upload(envelope).await
    }
}

async fn cmd_send(
    config: &PqshareConfig,
    file: &Path,
    to: &[String],
    save_envelope: Option<&Path>,
) -> Result<()> {
    let recipients: Vec<String> = to.iter().flat_map(|s| parse_recipients(s)).collect();
    if recipients.is_empty() {
        anyhow::bail!("no recipients given; use --to alice,bob");
    }

    let api = Arc::new(ApiClient::new(&config.api).context("configuring backend client")?);
    let transport: Arc<dyn UploadTransport> = match save_envelope {
        Some(dir) => Arc::new(SavingTransport {
            inner: api.clone(),
            dir: dir.to_path_buf(),
        }),
        None => api.clone(),
    };

    let mut session = SenderSession::new(api.clone(), transport);
    session
        .select_path(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let size = session.selected().map(|f| f.bytes.len() as u64).unwrap_or(0);
    println!(
        "Sending {} ({}) → {} (endpoint: {})",
        file.display(),
        fmt_bytes(size),
        recipients.join(", "),
        api.base_url(),
    );

    let pb = make_spinner("send");
    let pb_clone = pb.clone();
    let progress: ProgressFn = Box::new(move |state: &PipelineState, msg: &str| {
        if !state.is_terminal() {
            pb_clone.set_message(msg.to_string());
        }
    });

    match session.send(&recipients, Some(&progress)).await {
        Ok(receipt) => {
            pb.finish_with_message("done".to_string());
            println!();
            println!("Uploaded:");
            println!("  file id:    {}", receipt.file_id);
            println!("  recipients: {}", recipients.len());
            if let Some(dir) = save_envelope {
                println!("  envelope:   {}", dir.display());
            }
            Ok(())
        }
        Err(failure) => {
            pb.abandon_with_message("failed".to_string());
            if failure.error.is_retryable() {
                eprintln!("  (temporary failure; re-run the command to retry)");
            }
            Err(failure).context("send failed")
        }
    }
}

// ── `pqshare keygen` ──────────────────────────────────────────────────────────

fn cmd_keygen(out: &Path, id: Option<&str>, force: bool) -> Result<()> {
    if out.exists() && !force {
        anyhow::bail!(
            "key file already exists: {} (use --force to overwrite)",
            out.display()
        );
    }

    let recipient_id = match id {
        Some(id) => id.to_string(),
        None => out
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .context("cannot derive a recipient id from the key path; pass --id")?,
    };

    let keypair = RecipientKeypair::generate(recipient_id);
    keypair
        .save(out)
        .with_context(|| format!("writing key file: {}", out.display()))?;

    println!("Wrote keypair for '{}' to {}", keypair.recipient_id(), out.display());
    println!();
    println!("Public key (register this in the key directory):");
    println!("{}", keypair.public_key_base64());
    Ok(())
}

// ── `pqshare open` ────────────────────────────────────────────────────────────

async fn cmd_open(
    key_path: &Path,
    metadata_path: &Path,
    content_path: &Path,
    out: Option<&Path>,
) -> Result<()> {
    let keypair = RecipientKeypair::load(key_path)
        .with_context(|| format!("loading key file: {}", key_path.display()))?;

    let raw = tokio::fs::read(metadata_path)
        .await
        .with_context(|| format!("reading metadata: {}", metadata_path.display()))?;
    let metadata = EnvelopeMetadata::from_bytes(&raw)
        .with_context(|| format!("parsing metadata: {}", metadata_path.display()))?;
    let content = tokio::fs::read(content_path)
        .await
        .with_context(|| format!("reading content: {}", content_path.display()))?;

    let plaintext = open_envelope(&keypair, &metadata, &content)
        .with_context(|| format!("opening as '{}'", keypair.recipient_id()))?;

    let out_path = match out {
        Some(p) => p.to_path_buf(),
        None => default_output_path(&metadata.filename)?,
    };
    tokio::fs::write(&out_path, &plaintext)
        .await
        .with_context(|| format!("writing {}", out_path.display()))?;

    println!("Decrypted {} → {}", metadata.filename, out_path.display());
    println!("  bytes:  {}", fmt_bytes(plaintext.len() as u64));
    Ok(())
}

/// Only the final component of the sender-supplied name is used.
fn default_output_path(filename: &str) -> Result<PathBuf> {
    Path::new(filename)
        .file_name()
        .map(PathBuf::from)
        .with_context(|| format!("metadata file name is not usable as a path: {filename:?}; pass --out"))
}

// ── `pqshare config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &PqshareConfig, config_path: &Path, from_file: bool) -> Result<()> {
    if from_file {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(
            expand_tilde(Path::new("~/.config/pqshare/config.toml")),
            PathBuf::from("/home/tester/.config/pqshare/config.toml")
        );
        assert_eq!(expand_tilde(Path::new("/etc/x.toml")), PathBuf::from("/etc/x.toml"));
    }

    #[test]
    fn test_default_output_path_strips_directories() {
        assert_eq!(
            default_output_path("../../etc/passwd").unwrap(),
            PathBuf::from("passwd")
        );
        assert_eq!(default_output_path("report.pdf").unwrap(), PathBuf::from("report.pdf"));
        assert!(default_output_path("..").is_err());
    }

    #[test]
    fn test_fmt_bytes() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
        assert_eq!(fmt_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_cli_accepts_repeated_to() {
        let cli = Cli::try_parse_from([
            "pqshare", "send", "report.pdf", "--to", "alice,bob", "--to", "carol",
        ])
        .unwrap();
        match cli.command {
            Commands::Send { to, .. } => {
                let all: Vec<String> = to.iter().flat_map(|s| parse_recipients(s)).collect();
                assert_eq!(all, ["alice", "bob", "carol"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, from_file) = load_config(&dir.path().join("absent.toml")).await.unwrap();
        assert!(!from_file);
        assert_eq!(config.api.upload_path, "/files/upload");
    }

    #[tokio::test]
    async fn test_config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api]\nrequest_timeout_secs = 5\n").unwrap();

        let (config, from_file) = load_config(&path).await.unwrap();
        assert!(from_file);
        assert_eq!(config.api.request_timeout_secs, 5);
    }

    #[test]
    fn test_keygen_refuses_overwrite_and_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alice.json");

        cmd_keygen(&path, None, false).unwrap();
        let keypair = RecipientKeypair::load(&path).unwrap();
        assert_eq!(keypair.recipient_id(), "alice");

        assert!(cmd_keygen(&path, None, false).is_err());
        cmd_keygen(&path, Some("alice2"), true).unwrap();
        assert_eq!(RecipientKeypair::load(&path).unwrap().recipient_id(), "alice2");
    }
}
