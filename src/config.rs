//! Command line and configuration file for the `promptpos` binary.

use clap::{Parser, Subcommand};
use promptpos_types::config::{LiteralOrEnv, SessionTiming};
use promptpos_types::util::BahtAmount;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// CLI arguments for the promptpos terminal tool.
#[derive(Parser, Debug)]
#[command(name = "promptpos", version)]
#[command(about = "PromptPay QR payloads and member sessions for POS terminals")]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json", global = true)]
    pub config: PathBuf,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the PromptPay payload for a payee and amount
    Qr {
        /// Mobile number (10 digits, leading 0) or 13-digit tax ID
        #[arg(long, short)]
        target: String,
        /// Amount in baht; omit for an open-amount payload
        #[arg(long, short)]
        amount: Option<BahtAmount>,
    },
    /// Check the checksum and field structure of a payload
    Verify { payload: String },
    /// Manage the stored member session
    #[command(subcommand)]
    Session(SessionCommand),
    /// Authenticated GET against the API, path relative to `api_base`
    Get { path: String },
    /// Keep the stored session refreshed until interrupted or logged out
    Keepalive,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Store a token pair issued by a login
    Import {
        #[arg(long, env = "POS_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
        #[arg(long, env = "POS_REFRESH_TOKEN", hide_env_values = true)]
        refresh_token: String,
    },
    /// Show whether a session is stored and when it expires
    Status,
    /// Refresh the access token now
    Refresh,
    /// End the session
    Logout,
}

/// Terminal configuration.
///
/// Fields use serde defaults that fall back to environment variables,
/// then to hardcoded defaults.
///
/// ```json
/// {
///   "api_base": "$POS_API_BASE",
///   "token_store": "/var/lib/promptpos/session.json",
///   "access_token_ttl_secs": 900,
///   "refresh_lead_secs": 120,
///   "request_timeout_secs": 15
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_api_base")]
    api_base: LiteralOrEnv<Url>,
    #[serde(default = "config_defaults::default_token_store")]
    token_store: LiteralOrEnv<PathBuf>,
    #[serde(flatten)]
    session: SessionTiming,
    #[serde(default = "config_defaults::default_request_timeout_secs")]
    request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base: config_defaults::default_api_base(),
            token_store: config_defaults::default_token_store(),
            session: SessionTiming::default(),
            request_timeout_secs: config_defaults::default_request_timeout_secs(),
        }
    }
}

pub mod config_defaults {
    use promptpos_types::config::LiteralOrEnv;
    use std::env;
    use std::path::PathBuf;
    use url::Url;

    pub const DEFAULT_API_BASE: &str = "http://localhost:3000/api/";
    pub const DEFAULT_TOKEN_STORE: &str = ".promptpos/session.json";
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

    /// Returns the default API base with fallback: $POS_API_BASE env var -> localhost
    pub fn default_api_base() -> LiteralOrEnv<Url> {
        let url = env::var("POS_API_BASE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| DEFAULT_API_BASE.parse().unwrap());
        LiteralOrEnv::from_literal(url)
    }

    /// Returns the default session file with fallback: $POS_TOKEN_STORE env var -> ./.promptpos/session.json
    pub fn default_token_store() -> LiteralOrEnv<PathBuf> {
        let path = env::var("POS_TOKEN_STORE").unwrap_or_else(|_| DEFAULT_TOKEN_STORE.to_string());
        LiteralOrEnv::from_literal(PathBuf::from(path))
    }

    pub fn default_request_timeout_secs() -> u64 {
        DEFAULT_REQUEST_TIMEOUT_SECS
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    pub fn api_base(&self) -> &Url {
        self.api_base.inner()
    }

    pub fn token_store(&self) -> &Path {
        self.token_store.inner()
    }

    pub fn session(&self) -> SessionTiming {
        self.session
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Loads the file at `path`. A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Config::default());
            }
            Err(e) => return Err(ConfigError::FileRead(path.to_path_buf(), e)),
        };
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}
