//! Configuration module for dbsync.
//!
//! Typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder used to layer command
//! line and environment overrides on top of the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Direction, RemotePath};

/// Single-shot upload threshold and session chunk size (4 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Largest body the store accepts in a single upload request (150 MiB).
pub const MAX_CHUNK_SIZE: u64 = 150 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for dbsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub transfer: TransferConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local directory mirrored to the remote folder.
    pub local_root: PathBuf,
    /// Folder on the remote store, relative to its root. Empty means the root.
    pub remote_folder: String,
    /// Seconds between periodic reconciliation cycles.
    pub interval_secs: u64,
    /// Which side wins differing files during the bootstrap pass.
    pub direction: Direction,
    /// Name of the per-root ignore file.
    pub ignore_file: String,
    /// Window (in milliseconds) during which notifications about paths the
    /// engine wrote itself are dropped.
    pub suppress_window_ms: u64,
}

/// Transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Files up to this size are uploaded in one request; larger files are
    /// sent in chunks of this size.
    pub chunk_size_bytes: u64,
}

/// Credentials for the remote store.
///
/// Either `access_token`, or the `app_key` / `app_secret` / `refresh_token`
/// triple. When both are present the refresh triple is preferred.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub access_token: Option<String>,
    pub app_key: Option<String>,
    pub app_secret: Option<String>,
    pub refresh_token: Option<String>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/dbsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("dbsync")
            .join("config.yaml")
    }
}

/// Expand a leading `~` against the current user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_root: PathBuf::from("~/Downloads"),
            remote_folder: String::new(),
            interval_secs: 10,
            direction: Direction::Neither,
            ignore_file: ".dropboxignore".to_string(),
            suppress_window_ms: 2000,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn suppress_window(&self) -> Duration {
        Duration::from_millis(self.suppress_window_ms)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AuthConfig {
    /// `true` when the refresh-token triple is complete
    pub fn has_refresh_credentials(&self) -> bool {
        self.app_key.is_some() && self.app_secret.is_some() && self.refresh_token.is_some()
    }

    /// `true` when some usable credential is configured
    pub fn has_credentials(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty()) || self.has_refresh_credentials()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.interval_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. The local root is
    /// not checked here; it is checked separately at startup because it maps
    /// to its own exit status.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.interval_secs == 0 {
            errors.push(ValidationError {
                field: "sync.interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if RemotePath::new(&self.sync.remote_folder).is_err() {
            errors.push(ValidationError {
                field: "sync.remote_folder".into(),
                message: format!("not a valid remote folder: {}", self.sync.remote_folder),
            });
        }
        let ignore_file = self.sync.ignore_file.as_str();
        if ignore_file.is_empty() || ignore_file.contains('/') {
            errors.push(ValidationError {
                field: "sync.ignore_file".into(),
                message: "must be a plain file name".into(),
            });
        }

        // --- transfer ---
        let chunk = self.transfer.chunk_size_bytes;
        if chunk == 0 || chunk > MAX_CHUNK_SIZE {
            errors.push(ValidationError {
                field: "transfer.chunk_size_bytes".into(),
                message: format!("must be between 1 and {MAX_CHUNK_SIZE}"),
            });
        }

        // --- auth ---
        let refresh_parts = [
            self.auth.app_key.is_some(),
            self.auth.app_secret.is_some(),
            self.auth.refresh_token.is_some(),
        ];
        if refresh_parts.iter().any(|p| *p) && !refresh_parts.iter().all(|p| *p) {
            errors.push(ValidationError {
                field: "auth".into(),
                message: "app_key, app_secret and refresh_token must be given together".into(),
            });
        }
        if !self.auth.has_credentials() {
            errors.push(ValidationError {
                field: "auth".into(),
                message: "an access token or a refresh token is required".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Layers overrides on top of a base configuration.
///
/// `None` arguments leave the base value untouched, which lets the daemon
/// feed optional command line values straight through.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from the built-in defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already loaded configuration.
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn local_root(mut self, root: Option<PathBuf>) -> Self {
        if let Some(root) = root {
            self.config.sync.local_root = root;
        }
        self
    }

    pub fn remote_folder(mut self, folder: Option<String>) -> Self {
        if let Some(folder) = folder {
            self.config.sync.remote_folder = folder;
        }
        self
    }

    pub fn interval_secs(mut self, seconds: Option<u64>) -> Self {
        if let Some(seconds) = seconds {
            self.config.sync.interval_secs = seconds;
        }
        self
    }

    pub fn direction(mut self, direction: Option<Direction>) -> Self {
        if let Some(direction) = direction {
            self.config.sync.direction = direction;
        }
        self
    }

    pub fn access_token(mut self, token: Option<String>) -> Self {
        if token.is_some() {
            self.config.auth.access_token = token;
        }
        self
    }

    pub fn refresh_credentials(
        mut self,
        app_key: Option<String>,
        app_secret: Option<String>,
        refresh_token: Option<String>,
    ) -> Self {
        if app_key.is_some() {
            self.config.auth.app_key = app_key;
        }
        if app_secret.is_some() {
            self.config.auth.app_secret = app_secret;
        }
        if refresh_token.is_some() {
            self.config.auth.refresh_token = refresh_token;
        }
        self
    }

    pub fn logging_level(mut self, level: Option<String>) -> Self {
        if let Some(level) = level {
            self.config.logging.level = level;
        }
        self
    }

    /// Expand `~` in the local root and return the configuration.
    pub fn build(mut self) -> Config {
        self.config.sync.local_root = expand_home(&self.config.sync.local_root);
        self.config
    }
}
