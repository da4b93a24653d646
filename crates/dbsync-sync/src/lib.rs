//! dbsync Sync - bidirectional reconciliation engine
//!
//! Provides:
//! - Ignore-list matching for the sync root
//! - Remote directory snapshots and chunked transfers
//! - Full reconciliation passes in both directions
//! - Live propagation of local filesystem events
//! - The periodic reconciliation loop
//!
//! ## Modules
//!
//! - [`ignore`] - `.dropboxignore` patterns compiled into one predicate
//! - [`root`] - the sync root: local directory, remote folder, ignore list
//! - [`journal`] - paths recently written by the engine itself
//! - [`filesystem`] - local stat, atomic writes and timestamp handling
//! - [`index`] - one-level snapshots of remote folders
//! - [`transfer`] - uploads (single-shot or sessions), downloads, deletes, moves
//! - [`reconciler`] - `sync_from_remote`, `sync_from_host`, steady cycle, bootstrap
//! - [`watcher`] - `notify` events mapped into [`watcher::FsEvent`]s
//! - [`bridge`] - applies [`watcher::FsEvent`]s to the remote store
//! - [`scheduler`] - periodic steady-state cycles until cancelled

pub mod bridge;
pub mod filesystem;
pub mod ignore;
pub mod index;
pub mod journal;
pub mod reconciler;
pub mod root;
pub mod scheduler;
pub mod transfer;
pub mod watcher;

use std::path::PathBuf;

use thiserror::Error;

pub use bridge::{EventBridge, Outcome};
pub use ignore::IgnoreMatcher;
pub use index::RemoteDirectoryIndex;
pub use journal::WriteJournal;
pub use reconciler::{Reconciler, SyncReport};
pub use root::SyncRoot;
pub use scheduler::PeriodicSync;
pub use transfer::ChunkedTransfer;
pub use watcher::{FsEvent, FsWatcher};

/// Errors that abort a synchronization pass
///
/// Remote failures never show up here: they are logged where they happen
/// and only skip the affected entry.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A local I/O operation failed
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A path could not be mapped between the local tree and the remote folder
    #[error("Domain error: {0}")]
    DomainError(#[from] dbsync_core::domain::DomainError),
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The underlying I/O error kind, if this is an I/O error
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            Self::DomainError(_) => None,
        }
    }
}

/// Result alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Joins a relative subfolder and a leaf name with `/`
pub(crate) fn join_rel(subfolder: &str, name: &str) -> String {
    if subfolder.is_empty() {
        name.to_string()
    } else {
        format!("{subfolder}/{name}")
    }
}

/// Splits a relative path into `(subfolder, name)`
pub fn split_rel(rel: &str) -> (&str, &str) {
    match rel.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", rel),
    }
}
