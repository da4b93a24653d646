//! Resolution decisions for pulled files
//!
//! When the reconciler pulls a remote file it compares the remote
//! `(size, modified)` pair against the local one and asks the policy what to
//! do. Timestamps compare at second resolution because the store keeps
//! client timestamps to the second.
//!
//! In keep-both resolution the local copy is the one renamed: the remote
//! version keeps the canonical name and the local edit survives under a
//! conflict name stamped with the local modification time.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::namer::{is_conflict_copy, ConflictNamer};

/// Size and modification time of one side of a file pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl FileStat {
    pub fn new(size: u64, modified: DateTime<Utc>) -> Self {
        Self { size, modified }
    }

    /// Same size and same modification second
    pub fn matches(&self, other: &FileStat) -> bool {
        self.size == other.size && self.modified.timestamp() == other.modified.timestamp()
    }
}

/// Which side wins when both copies of a file differ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullMode {
    /// Overwrite the local copy with the remote one
    RemoteWins,
    /// Keep the local copy under a conflict name, take the remote one
    KeepBoth,
    /// Leave the local copy alone; a later push decides
    LocalWins,
}

impl PullMode {
    /// `overwrite = true` is [`PullMode::RemoteWins`], otherwise [`PullMode::KeepBoth`]
    pub fn from_overwrite(overwrite: bool) -> Self {
        if overwrite {
            Self::RemoteWins
        } else {
            Self::KeepBoth
        }
    }
}

/// What to do with one remote file during a pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullDecision {
    /// The entry is a conflict copy and takes no part in reconciliation
    Skip,
    /// No local file exists: download it
    Create,
    /// Both sides agree
    InSync,
    /// Replace the local file with the remote one
    Overwrite,
    /// Rename the local file to `conflict_name`, push it, then download
    KeepBoth { conflict_name: String },
    /// Differing, but the local side wins
    KeepLocal,
}

/// Decides how a pulled remote file is applied locally
#[derive(Debug, Clone, Copy)]
pub struct ConflictPolicy {
    mode: PullMode,
}

impl ConflictPolicy {
    pub fn new(mode: PullMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> PullMode {
        self.mode
    }

    /// Decide for remote file `name` given both stats
    pub fn decide(&self, name: &str, local: Option<&FileStat>, remote: &FileStat) -> PullDecision {
        if is_conflict_copy(name) {
            return PullDecision::Skip;
        }
        let Some(local) = local else {
            return PullDecision::Create;
        };
        if local.matches(remote) {
            return PullDecision::InSync;
        }

        trace!(
            name,
            local_size = local.size,
            remote_size = remote.size,
            local_modified = %local.modified,
            remote_modified = %remote.modified,
            mode = ?self.mode,
            "Local and remote copies differ"
        );

        match self.mode {
            PullMode::RemoteWins => PullDecision::Overwrite,
            PullMode::LocalWins => PullDecision::KeepLocal,
            PullMode::KeepBoth => PullDecision::KeepBoth {
                conflict_name: ConflictNamer::generate(name, local.modified),
            },
        }
    }
}
