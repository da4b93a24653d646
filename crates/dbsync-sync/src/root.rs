//! The sync root
//!
//! Binds a local directory to a folder on the remote store and owns the
//! compiled ignore list. Paths inside the root are handled as `/`-separated
//! strings relative to the root (`""` is the root itself), which map 1:1 to
//! paths below the remote folder.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use dbsync_core::domain::RemotePath;
use tracing::info;

use crate::ignore::IgnoreMatcher;
use crate::Result;

/// A local directory mirrored to a remote folder
#[derive(Debug)]
pub struct SyncRoot {
    local_root: PathBuf,
    remote_folder: String,
    remote_base: RemotePath,
    ignore_file: String,
    ignore: RwLock<Arc<IgnoreMatcher>>,
}

impl SyncRoot {
    /// Create the root and load its ignore file
    ///
    /// # Errors
    /// Returns error if `remote_folder` is not a valid remote path
    pub fn new(local_root: impl Into<PathBuf>, remote_folder: &str, ignore_file: &str) -> Result<Self> {
        let local_root = local_root.into();
        let remote_base = RemotePath::from_parts(remote_folder, "", "")?;
        let ignore = IgnoreMatcher::load(&local_root.join(ignore_file));
        Ok(Self {
            local_root,
            remote_folder: remote_folder.to_string(),
            remote_base,
            ignore_file: ignore_file.to_string(),
            ignore: RwLock::new(Arc::new(ignore)),
        })
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// The remote folder this root is mirrored to
    pub fn remote_base(&self) -> &RemotePath {
        &self.remote_base
    }

    /// Absolute local path of the ignore file
    pub fn ignore_file_path(&self) -> PathBuf {
        self.local_root.join(&self.ignore_file)
    }

    /// Whether `path` is this root's ignore file
    pub fn is_ignore_file(&self, path: &Path) -> bool {
        path == self.ignore_file_path()
    }

    /// Re-read the ignore file and swap in the new predicate
    pub fn reload_ignore(&self) {
        let matcher = IgnoreMatcher::load(&self.ignore_file_path());
        info!(patterns = matcher.patterns().len(), "Reloaded ignore list");
        *self.ignore.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(matcher);
    }

    /// The ignore predicate currently in effect
    pub fn ignore(&self) -> Arc<IgnoreMatcher> {
        self.ignore.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_ignored(&self, rel: &str, is_dir: bool) -> bool {
        self.ignore().is_ignored(rel, is_dir)
    }

    /// Local path of a root-relative path
    pub fn local_path(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.local_root.clone()
        } else {
            self.local_root.join(rel)
        }
    }

    /// Remote path of a root-relative path
    ///
    /// # Errors
    /// Returns error if `rel` contains `.` or `..` components
    pub fn remote_path(&self, rel: &str) -> Result<RemotePath> {
        Ok(RemotePath::from_parts(&self.remote_folder, rel, "")?)
    }

    /// Root-relative form of a local path, `None` if it lies outside the root
    ///
    /// Non UTF-8 names are rejected as well.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rest = path.strip_prefix(&self.local_root).ok()?;
        let mut parts = Vec::new();
        for component in rest.components() {
            match component {
                Component::Normal(name) => parts.push(name.to_str()?),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(parts.join("/"))
    }
}
