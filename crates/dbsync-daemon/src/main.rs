//! dbsync - keeps a local directory and a Dropbox folder in sync
//!
//! Startup:
//! 1. Parse the command line and merge it over the configuration file
//! 2. Validate the result (exit code 2) and the local root (exit code 1)
//! 3. Run one bootstrap pass in the configured direction of truth
//!
//! Then two tasks share one [`Reconciler`] until SIGINT/SIGTERM: the
//! [`EventBridge`] reacting to filesystem events and [`PeriodicSync`]
//! reconciling every interval.
//!
//! `--authorize` instead walks through approving the app and prints the
//! refresh token to use from then on.

mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dbsync_core::config::{AuthConfig, Config};
use dbsync_core::ports::IRemoteStore;
use dbsync_dropbox::{Credentials, DropboxClient, DropboxStore, NoRedirectFlow};
use dbsync_sync::{EventBridge, FsWatcher, PeriodicSync, Reconciler, SyncRoot, WriteJournal};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

/// The local root is missing or not a directory
const EXIT_BAD_ROOT: u8 = 1;
/// Invalid arguments or configuration
const EXIT_USAGE: u8 = 2;

// ============================================================================
// Startup checks
// ============================================================================

/// Choose credentials, preferring the refresh-token grant
fn credentials(auth: &AuthConfig) -> Option<Credentials> {
    match (&auth.app_key, &auth.app_secret, &auth.refresh_token) {
        (Some(app_key), Some(app_secret), Some(refresh_token)) => Some(Credentials::RefreshToken {
            app_key: app_key.clone(),
            app_secret: app_secret.clone(),
            refresh_token: refresh_token.clone(),
        }),
        _ => auth.access_token.clone().map(Credentials::AccessToken),
    }
}

/// Canonical form of the local root, which must be an existing directory
fn resolve_root(path: &Path) -> Result<PathBuf> {
    let meta = std::fs::metadata(path).with_context(|| format!("local root {} does not exist", path.display()))?;
    if !meta.is_dir() {
        anyhow::bail!("local root {} is not a directory", path.display());
    }
    path.canonicalize()
        .with_context(|| format!("cannot resolve local root {}", path.display()))
}

fn build_runtime() -> Option<tokio::runtime::Runtime> {
    match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => Some(runtime),
        Err(e) => {
            error!(error = %e, "Failed to start the async runtime");
            None
        }
    }
}

fn init_tracing(level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Authorize
// ============================================================================

/// Read the pasted authorization code from the first line of `input`
async fn read_code<R: AsyncBufRead + Unpin>(mut input: R) -> Result<String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .await
        .context("Cannot read the authorization code")?;
    let code = line.trim();
    if code.is_empty() {
        anyhow::bail!("No authorization code entered");
    }
    Ok(code.to_string())
}

async fn authorize(app_key: &str, app_secret: &str) -> Result<String> {
    let flow = NoRedirectFlow::new(app_key, app_secret)?;

    println!("1. Go to: {}", flow.authorize_url());
    println!("2. Click \"Allow\" (you might have to log in first).");
    println!("3. Copy the authorization code and paste it here:");

    let code = read_code(BufReader::new(tokio::io::stdin())).await?;
    let refresh_token = flow.exchange_code(&code).await?;
    info!("App authorized; pass the refresh token with --refresh-token or DROPBOX_REFRESH_TOKEN");
    Ok(refresh_token)
}

// ============================================================================
// Run
// ============================================================================

async fn run(config: Config, local_root: PathBuf, store: Arc<dyn IRemoteStore>) -> Result<()> {
    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let root = Arc::new(
        SyncRoot::new(&local_root, &config.sync.remote_folder, &config.sync.ignore_file)
            .context("Invalid remote folder")?,
    );
    let journal = Arc::new(WriteJournal::new(config.sync.suppress_window()));
    let reconciler = Arc::new(Reconciler::new(
        root,
        store,
        journal,
        config.transfer.chunk_size_bytes,
    ));

    info!(
        local_root = %local_root.display(),
        remote_folder = %reconciler.root().remote_base(),
        direction = %config.sync.direction,
        "Bootstrap pass starting"
    );
    tokio::select! {
        result = reconciler.bootstrap(config.sync.direction) => {
            let report = result.context("Bootstrap pass failed")?;
            info!(
                downloaded = report.downloaded,
                uploaded = report.uploaded,
                conflicts = report.conflicts,
                in_sync = report.in_sync,
                remote_errors = report.remote_errors,
                "Bootstrap pass complete"
            );
        }
        _ = shutdown.cancelled() => {
            info!("Shutdown requested during bootstrap");
            return Ok(());
        }
    }

    let (watcher, events) = FsWatcher::start(&local_root)?;
    let bridge = tokio::spawn(EventBridge::new(Arc::clone(&reconciler)).run(events));
    let periodic = tokio::spawn(
        PeriodicSync::new(Arc::clone(&reconciler), config.sync.interval()).run(shutdown.clone()),
    );

    shutdown.cancelled().await;
    info!("Shutting down");

    watcher.stop().await;
    if let Err(e) = bridge.await {
        error!(error = %e, "Event bridge task failed");
    }
    if let Err(e) = periodic.await {
        error!(error = %e, "Periodic sync task failed");
    }
    Ok(())
}

// ============================================================================
// Main entry point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    let authorize_only = cli.authorize;

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let base = if config_path.exists() {
        match Config::load(&config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("dbsync: cannot load {}: {e:#}", config_path.display());
                return ExitCode::from(EXIT_USAGE);
            }
        }
    } else {
        Config::default()
    };
    let config = cli.apply(base).build();

    init_tracing(&config.logging.level);

    if authorize_only {
        let (Some(app_key), Some(app_secret)) = (&config.auth.app_key, &config.auth.app_secret) else {
            error!("--authorize needs an app key and an app secret");
            return ExitCode::from(EXIT_USAGE);
        };
        let Some(runtime) = build_runtime() else {
            return ExitCode::FAILURE;
        };
        return match runtime.block_on(authorize(app_key, app_secret)) {
            Ok(refresh_token) => {
                println!("Refresh token: {refresh_token}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "Authorization failed");
                ExitCode::FAILURE
            }
        };
    }

    info!(config = %config_path.display(), "dbsync starting");

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!(field = %e.field, "Invalid configuration: {}", e.message);
        }
        return ExitCode::from(EXIT_USAGE);
    }

    let local_root = match resolve_root(&config.sync.local_root) {
        Ok(root) => root,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(EXIT_BAD_ROOT);
        }
    };

    let Some(credentials) = credentials(&config.auth) else {
        error!("An access token or a refresh token is required");
        return ExitCode::from(EXIT_USAGE);
    };
    let store: Arc<dyn IRemoteStore> = Arc::new(DropboxStore::new(DropboxClient::new(credentials)));

    let Some(runtime) = build_runtime() else {
        return ExitCode::FAILURE;
    };

    match runtime.block_on(run(config, local_root, store)) {
        Ok(()) => {
            info!("dbsync shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "dbsync exiting with error");
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
