//! strata server binary.
//!
//! Reads `config.toml` (or the path given with `--config`, plus `STRATA_*`
//! environment overrides), opens an in-process SQLite store, and serves the
//! object API over HTTP.
//!
//! # Token generation
//!
//! API access requires a token; generate one with:
//!
//! ```
//! cargo run -p strata-server -- --generate-token \
//!   --contact "A. Person" --email a@example.org
//! ```

mod notify;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use chrono::Utc;
use clap::Parser;
use rand_core::{OsRng, RngCore as _};
use serde::Deserialize;
use strata_api::AppState;
use strata_core::{permission::TokenAuth, store::ObjectStore as _};
use strata_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use notify::TracingNotifier;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `STRATA_*` environment variables.
#[derive(Deserialize, Clone)]
struct ServerConfig {
  #[serde(default = "default_host")]
  host:       String,
  #[serde(default = "default_port")]
  port:       u16,
  /// Base URL object representations are addressed under.
  #[serde(default = "default_base_url")]
  base_url:   String,
  #[serde(default = "default_store_path")]
  store_path: PathBuf,
}

fn default_host() -> String {
  "127.0.0.1".to_string()
}

fn default_port() -> u16 {
  8000
}

fn default_base_url() -> String {
  format!("http://{}:{}", default_host(), default_port())
}

fn default_store_path() -> PathBuf {
  PathBuf::from("strata.db")
}

// ─── CLI ─────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Strata object record server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Generate an API token, store it, print the key, and exit.
  #[arg(long)]
  generate_token: bool,

  /// Contact person recorded on the generated token.
  #[arg(long, default_value = "", requires = "generate_token")]
  contact: String,

  /// Contact email recorded on the generated token.
  #[arg(long, default_value = "", requires = "generate_token")]
  email: String,

  /// Mark the generated token as a superuser (bypasses type permissions).
  #[arg(long, requires = "generate_token")]
  superuser: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("STRATA"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Open SQLite store.
  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  // Helper mode: mint a token and exit.
  if cli.generate_token {
    let key = generate_key();
    store
      .put_token(TokenAuth {
        token:          key.clone(),
        contact_person: cli.contact,
        email:          cli.email,
        organization:   String::new(),
        application:    String::new(),
        administration: String::new(),
        is_superuser:   cli.superuser,
        created_at:     Utc::now(),
      })
      .await
      .context("failed to store token")?;
    println!("{key}");
    return Ok(());
  }

  // Build application state and router.
  let state = AppState::new(Arc::new(store), server_cfg.base_url.clone())
    .with_notifier(Arc::new(TracingNotifier));
  let app = strata_api::api_router(state).layer(TraceLayer::new_for_http());

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// A fresh token key: 20 random bytes, hex-encoded.
fn generate_key() -> String {
  let mut bytes = [0u8; 20];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
