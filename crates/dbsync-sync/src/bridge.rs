//! Filesystem events applied to the remote store
//!
//! Each [`FsEvent`] becomes at most one remote operation:
//!
//! | event    | remote operation                        |
//! |----------|-----------------------------------------|
//! | Created  | folder subtree push, or upload in add mode |
//! | Modified | upload in overwrite mode                   |
//! | Deleted  | delete                                     |
//! | Moved    | move, or upload of the target              |
//!
//! A folder event pushes everything already inside the folder, since the
//! watcher reports a folder moved into the root as one event.
//!
//! Events for conflict copies, ignored paths and paths the reconciler wrote
//! within the suppression window are dropped. An event touching the ignore
//! file reloads the ignore list before anything else.

use std::path::Path;
use std::sync::Arc;

use dbsync_conflict::is_conflict_copy;
use dbsync_core::domain::WriteMode;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::filesystem;
use crate::ignore::IgnoreMatcher;
use crate::reconciler::Reconciler;
use crate::watcher::{transient_matcher, FsEvent};

/// Result of handling one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A remote operation was issued and succeeded
    Applied,
    /// Nothing to do, with the reason
    Skipped(&'static str),
    /// The remote operation (or reading the local file) failed
    Failed,
}

/// Event-driven steady-state task
pub struct EventBridge {
    reconciler: Arc<Reconciler>,
    transient: IgnoreMatcher,
}

impl EventBridge {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            transient: transient_matcher(),
        }
    }

    /// Handle events until the channel closes
    pub async fn run(self, mut events: mpsc::Receiver<FsEvent>) {
        info!("Event bridge starting");
        while let Some(event) = events.recv().await {
            match self.handle(&event).await {
                Outcome::Applied => debug!(?event, "Applied"),
                Outcome::Skipped(reason) => trace!(?event, reason, "Skipped"),
                Outcome::Failed => debug!(?event, "Failed"),
            }
        }
        info!("Event bridge stopped");
    }

    pub async fn handle(&self, event: &FsEvent) -> Outcome {
        let root = self.reconciler.root();
        if event.paths().iter().any(|p| root.is_ignore_file(p)) {
            root.reload_ignore();
        }

        match event {
            FsEvent::Created { path, is_dir } => self.on_created(path, *is_dir).await,
            FsEvent::Modified { path } => self.on_modified(path).await,
            FsEvent::Deleted { path, is_dir } => self.on_deleted(path, *is_dir).await,
            FsEvent::Moved { from, to, is_dir } => self.on_moved(from, to, *is_dir).await,
        }
    }

    /// Root-relative path, or the reason to skip it
    fn admit(&self, path: &Path, is_dir: bool) -> Result<String, &'static str> {
        let root = self.reconciler.root();
        let rel = match root.relative(path) {
            Some(rel) if !rel.is_empty() => rel,
            _ => return Err("outside sync root"),
        };
        if is_conflict_copy(&rel) {
            return Err("conflict copy");
        }
        if self.reconciler.journal().is_recent(path) {
            return Err("own write");
        }
        if root.is_ignored(&rel, is_dir) {
            return Err("ignored");
        }
        Ok(rel)
    }

    async fn on_created(&self, path: &Path, is_dir: bool) -> Outcome {
        let rel = match self.admit(path, is_dir) {
            Ok(rel) => rel,
            Err(reason) => return Outcome::Skipped(reason),
        };
        if is_dir {
            info!(path = %rel, "Local folder created");
            return self.push_subtree(&rel).await;
        }
        info!(path = %rel, "Local file created");
        self.upload(&rel, WriteMode::Add).await
    }

    async fn on_modified(&self, path: &Path) -> Outcome {
        match filesystem::stat(path).await {
            Ok(Some(stat)) if stat.is_dir => return Outcome::Skipped("directory"),
            Ok(Some(_)) => {}
            Ok(None) => return Outcome::Skipped("vanished"),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot stat modified file");
                return Outcome::Failed;
            }
        }
        let rel = match self.admit(path, false) {
            Ok(rel) => rel,
            Err(reason) => return Outcome::Skipped(reason),
        };
        info!(path = %rel, "Local file modified");
        self.upload(&rel, WriteMode::Overwrite).await
    }

    async fn on_deleted(&self, path: &Path, is_dir: bool) -> Outcome {
        let rel = match self.admit(path, is_dir) {
            Ok(rel) => rel,
            Err(reason) => return Outcome::Skipped(reason),
        };
        info!(path = %rel, "Local entry deleted");
        self.applied(self.reconciler.transfer().delete(&rel).await)
    }

    async fn on_moved(&self, from: &Path, to: &Path, is_dir: bool) -> Outcome {
        let root = self.reconciler.root();
        let from_rel = root.relative(from).filter(|rel| !rel.is_empty());
        if from_rel.as_deref().is_some_and(is_conflict_copy) {
            return Outcome::Skipped("conflict copy");
        }
        let to_rel = match self.admit(to, is_dir) {
            Ok(rel) => rel,
            Err(reason) => return Outcome::Skipped(reason),
        };

        let from_rel = match from_rel {
            Some(rel) if !self.is_transient(from) && !root.is_ignored(&rel, is_dir) => rel,
            // Editors write a temp file and rename it over the target
            _ => {
                info!(path = %to_rel, "Replaced by rename; uploading");
                if is_dir {
                    return self.push_subtree(&to_rel).await;
                }
                return self.upload(&to_rel, WriteMode::Overwrite).await;
            }
        };

        info!(from = %from_rel, to = %to_rel, "Local entry moved");
        if self.reconciler.transfer().move_entry(&from_rel, &to_rel).await {
            return Outcome::Applied;
        }
        // The source may never have reached the store
        if is_dir {
            return self.push_subtree(&to_rel).await;
        }
        self.upload(&to_rel, WriteMode::Overwrite).await
    }

    async fn push_subtree(&self, rel: &str) -> Outcome {
        match self.reconciler.push_subtree(rel).await {
            Ok(report) if report.remote_errors == 0 => Outcome::Applied,
            Ok(_) => Outcome::Failed,
            Err(e) => {
                warn!(path = rel, error = %e, "Cannot walk local folder");
                Outcome::Failed
            }
        }
    }

    async fn upload(&self, rel: &str, mode: WriteMode) -> Outcome {
        match self.reconciler.transfer().upload(rel, mode).await {
            Ok(Some(_)) => Outcome::Applied,
            Ok(None) => Outcome::Failed,
            Err(e) => {
                warn!(path = rel, error = %e, "Cannot read local file for upload");
                Outcome::Failed
            }
        }
    }

    fn applied(&self, ok: bool) -> Outcome {
        if ok {
            Outcome::Applied
        } else {
            Outcome::Failed
        }
    }

    fn is_transient(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| self.transient.is_ignored(name, false))
    }
}
