//! Local filesystem helpers
//!
//! - **Atomic writes**: content goes to a hidden sibling first, then is
//!   renamed into place, then gets the remote modification time
//! - **Stats**: size and modification time as compared against remote entries
//! - **Directory listing**: UTF-8 entries only, symlinks followed
//!
//! Every failure is wrapped into [`SyncError::Io`] with the offending path.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dbsync_conflict::FileStat;
use filetime::FileTime;
use tracing::{debug, warn};

use crate::{Result, SyncError};

/// Suffix of in-flight download files
pub const PARTIAL_SUFFIX: &str = ".dbsync-partial";

/// Size and modification time of a local path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalStat {
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub is_dir: bool,
}

impl LocalStat {
    pub fn file_stat(&self) -> FileStat {
        FileStat::new(self.size, self.modified)
    }
}

/// One entry of a local directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Stat `path`, following symlinks; `None` if it does not exist
pub async fn stat(path: &Path) -> Result<Option<LocalStat>> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => {
            let modified = meta.modified().map_err(|e| SyncError::io(path, e))?;
            Ok(Some(LocalStat {
                size: meta.len(),
                modified: DateTime::<Utc>::from(modified),
                is_dir: meta.is_dir(),
            }))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SyncError::io(path, e)),
    }
}

/// List a directory, sorted by name
///
/// Entries with non UTF-8 names and dangling symlinks are skipped with a
/// warning.
pub async fn read_dir(path: &Path) -> Result<Vec<LocalEntry>> {
    let mut dir = tokio::fs::read_dir(path).await.map_err(|e| SyncError::io(path, e))?;
    let mut entries = Vec::new();

    while let Some(entry) = dir.next_entry().await.map_err(|e| SyncError::io(path, e))? {
        let entry_path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            warn!(path = %entry_path.display(), "Skipping entry with non UTF-8 name");
            continue;
        };
        match tokio::fs::metadata(&entry_path).await {
            Ok(meta) => entries.push(LocalEntry {
                name,
                is_dir: meta.is_dir(),
            }),
            Err(e) => {
                warn!(path = %entry_path.display(), error = %e, "Skipping unreadable entry");
            }
        }
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

pub async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| SyncError::io(path, e))
}

/// Name of the hidden sibling a download is written to before the rename
pub fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}{PARTIAL_SUFFIX}"))
}

pub fn is_partial(name: &str) -> bool {
    name.ends_with(PARTIAL_SUFFIX)
}

/// Write `data` to `target` atomically and set its modification time
///
/// Missing parent directories are created.
pub async fn store_file(target: &Path, data: &[u8], modified: DateTime<Utc>) -> Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SyncError::io(parent, e))?;
    }

    let tmp_path = partial_path(target);
    debug!(path = %tmp_path.display(), size = data.len(), "Writing to temporary file");
    tokio::fs::write(&tmp_path, data)
        .await
        .map_err(|e| SyncError::io(&tmp_path, e))?;

    if let Err(e) = tokio::fs::rename(&tmp_path, target).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(SyncError::io(target, e));
    }

    set_modified(target, modified)
}

/// Set the modification time of `path` to `modified` (second resolution)
pub fn set_modified(path: &Path, modified: DateTime<Utc>) -> Result<()> {
    let mtime = FileTime::from_unix_time(modified.timestamp(), 0);
    filetime::set_file_mtime(path, mtime).map_err(|e| SyncError::io(path, e))
}

pub async fn rename(from: &Path, to: &Path) -> Result<()> {
    tokio::fs::rename(from, to).await.map_err(|e| SyncError::io(from, e))
}

pub async fn remove_file(path: &Path) -> Result<()> {
    tokio::fs::remove_file(path).await.map_err(|e| SyncError::io(path, e))
}

pub async fn remove_dir_all(path: &Path) -> Result<()> {
    tokio::fs::remove_dir_all(path).await.map_err(|e| SyncError::io(path, e))
}

pub async fn create_dir_all(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await.map_err(|e| SyncError::io(path, e))
}
