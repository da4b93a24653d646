//! Command line interface
//!
//! Every flag has an environment fallback; values given here override the
//! configuration file.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use dbsync_core::config::{Config, ConfigBuilder};
use dbsync_core::domain::Direction;

#[derive(Debug, Parser)]
#[command(
    name = "dbsync",
    version,
    about = "Keep a local directory and a Dropbox folder in sync"
)]
pub struct Cli {
    /// Local directory to synchronize
    #[arg(long, env = "DROPBOX_ROOTDIR", value_name = "DIR")]
    pub rootdir: Option<PathBuf>,

    /// Dropbox folder to synchronize (empty for the Dropbox root)
    #[arg(short = 'f', long, env = "DROPBOX_FOLDER", value_name = "FOLDER")]
    pub folder: Option<String>,

    /// Long-lived access token
    #[arg(short = 't', long, env = "DROPBOX_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// App key, for the refresh-token grant
    #[arg(long, env = "DROPBOX_APP_KEY")]
    pub app_key: Option<String>,

    /// App secret, for the refresh-token grant
    #[arg(long, env = "DROPBOX_APP_SECRET", hide_env_values = true)]
    pub app_secret: Option<String>,

    /// Refresh token issued to the app
    #[arg(long, env = "DROPBOX_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,

    /// Seconds between periodic sync cycles
    #[arg(short = 'i', long, env = "DROPBOX_INTERVAL", value_name = "SECONDS")]
    pub interval: Option<u64>,

    /// Bootstrap with Dropbox as the source of truth
    #[arg(long, alias = "fromDropbox", conflicts_with = "from_host")]
    pub from_remote: bool,

    /// Bootstrap with the local directory as the source of truth
    #[arg(long, alias = "fromLocal")]
    pub from_host: bool,

    /// Approve the app with its key and secret, print a refresh token and exit
    #[arg(long)]
    pub authorize: bool,

    /// Use alternate config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Direction requested on the command line, if any
    pub fn direction(&self) -> Option<Direction> {
        if self.from_remote {
            Some(Direction::Remote)
        } else if self.from_host {
            Some(Direction::Host)
        } else {
            None
        }
    }

    /// Log level selected by `-v` flags
    pub fn log_level(&self) -> Option<String> {
        match self.verbose {
            0 => None,
            1 => Some("debug".into()),
            _ => Some("trace".into()),
        }
    }

    /// Layer the command line over `base`
    pub fn apply(self, base: Config) -> ConfigBuilder {
        let direction = self.direction();
        let level = self.log_level();
        ConfigBuilder::from_config(base)
            .local_root(self.rootdir)
            .remote_folder(self.folder)
            .interval_secs(self.interval)
            .direction(direction)
            .access_token(self.token)
            .refresh_credentials(self.app_key, self.app_secret, self.refresh_token)
            .logging_level(level)
    }
}
