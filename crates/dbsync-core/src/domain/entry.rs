//! Remote listing entries and transfer descriptors

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::path::RemotePath;

// ============================================================================
// Listing entries
// ============================================================================

/// Metadata of a remote file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Leaf name
    pub name: String,
    /// Full path as reported by the store
    pub path: RemotePath,
    /// Size in bytes
    pub size: u64,
    /// Client-supplied modification timestamp, second resolution
    pub modified_at: DateTime<Utc>,
    /// Opaque content reference (revision or id)
    pub content_ref: String,
    /// Store-computed content hash, when reported
    pub content_hash: Option<String>,
}

/// Metadata of a remote folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFolder {
    pub name: String,
    pub path: RemotePath,
}

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEntry {
    File(RemoteFile),
    Folder(RemoteFolder),
}

impl RemoteEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::File(f) => &f.name,
            Self::Folder(f) => &f.name,
        }
    }

    pub fn path(&self) -> &RemotePath {
        match self {
            Self::File(f) => &f.path,
            Self::Folder(f) => &f.path,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder(_))
    }

    pub fn as_file(&self) -> Option<&RemoteFile> {
        match self {
            Self::File(f) => Some(f),
            Self::Folder(_) => None,
        }
    }
}

// ============================================================================
// Uploads
// ============================================================================

/// How an upload treats an existing remote file at the same path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with a conflict if a different file already exists
    Add,
    /// Replace whatever is there
    Overwrite,
}

impl WriteMode {
    /// `true` maps to [`WriteMode::Overwrite`]
    pub fn from_overwrite(overwrite: bool) -> Self {
        if overwrite {
            Self::Overwrite
        } else {
            Self::Add
        }
    }
}

/// Position inside an open upload session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCursor {
    pub session_id: String,
    /// Number of bytes the store has accepted so far
    pub offset: u64,
}

/// Where and how a finished upload is committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub path: RemotePath,
    pub mode: WriteMode,
    pub client_modified: DateTime<Utc>,
}

// ============================================================================
// Direction
// ============================================================================

/// Which side wins differing files during the bootstrap pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Remote content overwrites differing local files
    Remote,
    /// Local content overwrites differing remote files
    Host,
    /// Differing files are kept on both sides as conflict copies
    #[default]
    Neither,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Remote => "remote",
            Self::Host => "host",
            Self::Neither => "neither",
        };
        f.write_str(s)
    }
}

impl FromStr for Direction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remote" | "dropbox" => Ok(Self::Remote),
            "host" | "local" => Ok(Self::Host),
            "neither" | "none" => Ok(Self::Neither),
            _ => Err(DomainError::InvalidDirection(s.to_string())),
        }
    }
}
