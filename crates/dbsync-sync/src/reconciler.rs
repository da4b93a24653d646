//! Bidirectional reconciliation
//!
//! Two full passes walk the local tree and the remote folder side by side:
//!
//! - [`Reconciler::sync_from_remote`] pulls: every remote file is compared
//!   to its local counterpart and the [`ConflictPolicy`] decides what
//!   happens. Nothing local is ever deleted by a pull.
//! - [`Reconciler::sync_from_host`] pushes: local entries missing remotely
//!   are uploaded, or removed locally when `remove` is set.
//!
//! No state is kept between passes. Every pass re-lists both sides, so a
//! pass over two converged trees performs no transfer at all.
//!
//! Remote failures skip the affected entry (or subtree, for listings) and
//! are counted in the [`SyncReport`]. Local I/O failures abort the pass.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use dbsync_conflict::{is_conflict_copy, ConflictNamer, ConflictPolicy, FileStat, PullDecision, PullMode};
use dbsync_core::domain::{Direction, RemoteEntry, RemoteFile, WriteMode};
use dbsync_core::ports::IRemoteStore;
use tracing::{debug, info, trace, warn};

use crate::filesystem;
use crate::index::RemoteDirectoryIndex;
use crate::journal::WriteJournal;
use crate::root::SyncRoot;
use crate::transfer::ChunkedTransfer;
use crate::{join_rel, Result};

type PassFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

// ============================================================================
// SyncReport
// ============================================================================

/// Counters for one or more reconciliation passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Files written locally from remote content
    pub downloaded: usize,
    /// Files sent to the remote store (conflict copies included)
    pub uploaded: usize,
    /// Local files or folders removed because they no longer exist remotely
    pub deleted_local: usize,
    /// Folders created on either side
    pub folders_created: usize,
    /// Local copies renamed to a conflict name
    pub conflicts: usize,
    /// Files found identical on both sides
    pub in_sync: usize,
    /// Remote calls that failed and were skipped
    pub remote_errors: usize,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.downloaded += other.downloaded;
        self.uploaded += other.uploaded;
        self.deleted_local += other.deleted_local;
        self.folders_created += other.folders_created;
        self.conflicts += other.conflicts;
        self.in_sync += other.in_sync;
        self.remote_errors += other.remote_errors;
    }

    /// Number of content transfers in either direction
    pub fn transfers(&self) -> usize {
        self.downloaded + self.uploaded
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Walks both trees and applies the minimal set of operations
pub struct Reconciler {
    root: Arc<SyncRoot>,
    index: RemoteDirectoryIndex,
    transfer: ChunkedTransfer,
    journal: Arc<WriteJournal>,
}

impl Reconciler {
    /// # Arguments
    /// * `root` - the local directory and remote folder to reconcile
    /// * `store` - remote store the passes talk to
    /// * `journal` - receives every local path the passes write, rename or delete
    /// * `chunk_size` - single-shot upload threshold and session chunk size
    pub fn new(
        root: Arc<SyncRoot>,
        store: Arc<dyn IRemoteStore>,
        journal: Arc<WriteJournal>,
        chunk_size: u64,
    ) -> Self {
        Self {
            index: RemoteDirectoryIndex::new(Arc::clone(&store), Arc::clone(&root)),
            transfer: ChunkedTransfer::new(store, Arc::clone(&root), chunk_size),
            root,
            journal,
        }
    }

    pub fn root(&self) -> &Arc<SyncRoot> {
        &self.root
    }

    pub fn transfer(&self) -> &ChunkedTransfer {
        &self.transfer
    }

    pub fn journal(&self) -> &Arc<WriteJournal> {
        &self.journal
    }

    /// Pull `subfolder` (relative to the root) and everything below it
    ///
    /// With `overwrite` the remote copy wins every difference; without it a
    /// differing local copy is kept under a conflict name.
    pub async fn sync_from_remote(&self, subfolder: &str, overwrite: bool) -> Result<SyncReport> {
        self.sync_from_remote_with(subfolder, PullMode::from_overwrite(overwrite))
            .await
    }

    /// Pull with an explicit resolution mode
    #[tracing::instrument(skip(self))]
    pub async fn sync_from_remote_with(&self, subfolder: &str, mode: PullMode) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        self.pull_folder(subfolder, ConflictPolicy::new(mode), &mut report)
            .await?;
        info!(
            downloaded = report.downloaded,
            conflicts = report.conflicts,
            in_sync = report.in_sync,
            remote_errors = report.remote_errors,
            "Pull finished"
        );
        Ok(report)
    }

    /// Push the whole local tree
    ///
    /// Local entries absent remotely are uploaded, or removed locally when
    /// `remove` is set. With `overwrite`, files present on both sides with
    /// differing stats are compared byte for byte and uploaded only if the
    /// content differs.
    #[tracing::instrument(skip(self))]
    pub async fn sync_from_host(&self, overwrite: bool, remove: bool) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        self.push_folder("", overwrite, remove, &mut report).await?;
        info!(
            uploaded = report.uploaded,
            deleted_local = report.deleted_local,
            folders_created = report.folders_created,
            remote_errors = report.remote_errors,
            "Push finished"
        );
        Ok(report)
    }

    /// Mirror a local folder that appeared with its contents already inside
    ///
    /// A folder moved in from outside the root, copied or unpacked in place
    /// produces a single event. The remote folder is created and every file
    /// below it uploaded in add mode; entries already present remotely are
    /// left alone.
    #[tracing::instrument(skip(self))]
    pub async fn push_subtree(&self, rel: &str) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        if self.transfer.create_folder(rel).await {
            report.folders_created += 1;
        } else {
            // Uploads create missing parents, so the walk still runs
            report.remote_errors += 1;
        }
        self.push_folder(rel, false, false, &mut report).await?;
        info!(
            uploaded = report.uploaded,
            folders_created = report.folders_created,
            remote_errors = report.remote_errors,
            "Subtree pushed"
        );
        Ok(report)
    }

    /// One periodic cycle: pull, push with removal, pull again
    pub async fn steady_cycle(&self) -> Result<SyncReport> {
        let mut report = self.sync_from_remote("", true).await?;
        report.merge(self.sync_from_host(false, true).await?);
        report.merge(self.sync_from_remote("", true).await?);
        Ok(report)
    }

    /// The startup pass for the configured direction of truth
    #[tracing::instrument(skip(self))]
    pub async fn bootstrap(&self, direction: Direction) -> Result<SyncReport> {
        let (pull, verify) = match direction {
            Direction::Remote => (PullMode::RemoteWins, false),
            Direction::Neither => (PullMode::KeepBoth, false),
            Direction::Host => (PullMode::LocalWins, true),
        };
        let mut report = self.sync_from_remote_with("", pull).await?;
        report.merge(self.sync_from_host(verify, false).await?);
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Pull
    // ------------------------------------------------------------------------

    fn pull_folder<'a>(
        &'a self,
        subfolder: &'a str,
        policy: ConflictPolicy,
        report: &'a mut SyncReport,
    ) -> PassFuture<'a> {
        Box::pin(async move {
            let Some(listing) = self.index.list_checked(subfolder, false).await else {
                report.remote_errors += 1;
                return Ok(());
            };

            for (name, entry) in listing {
                if is_conflict_copy(&name) {
                    trace!(name = %name, "Skipping conflict copy");
                    continue;
                }
                let rel = join_rel(subfolder, &name);

                match entry {
                    RemoteEntry::Folder(_) => {
                        let local = self.root.local_path(&rel);
                        match filesystem::stat(&local).await? {
                            Some(stat) if !stat.is_dir => {
                                warn!(path = %rel, "Remote folder shadows a local file; skipping");
                                continue;
                            }
                            Some(_) => {}
                            None => {
                                self.journal.record(&local);
                                filesystem::create_dir_all(&local).await?;
                                info!(path = %rel, "Created local folder");
                                report.folders_created += 1;
                            }
                        }
                        self.pull_folder(&rel, policy, report).await?;
                    }
                    RemoteEntry::File(file) => {
                        self.pull_file(subfolder, &rel, &file, policy, report)
                            .await?;
                    }
                }
            }
            Ok(())
        })
    }

    async fn pull_file(
        &self,
        subfolder: &str,
        rel: &str,
        file: &RemoteFile,
        policy: ConflictPolicy,
        report: &mut SyncReport,
    ) -> Result<()> {
        let local = self.root.local_path(rel);
        let local_stat = filesystem::stat(&local).await?;
        if local_stat.is_some_and(|s| s.is_dir) {
            warn!(path = %rel, "Remote file shadows a local folder; skipping");
            return Ok(());
        }

        let remote_stat = FileStat::new(file.size, file.modified_at);
        let local_file_stat = local_stat.map(|s| s.file_stat());

        match policy.decide(&file.name, local_file_stat.as_ref(), &remote_stat) {
            PullDecision::Skip => {}
            PullDecision::InSync => {
                debug!(path = %rel, "Already synced");
                report.in_sync += 1;
            }
            PullDecision::KeepLocal => {
                debug!(path = %rel, "Local copy differs; keeping it");
            }
            PullDecision::Create | PullDecision::Overwrite => {
                self.fetch(rel, &local, report).await?;
            }
            PullDecision::KeepBoth { conflict_name } => {
                let stamp = local_file_stat.map_or(file.modified_at, |s| s.modified);
                let dir = local.parent().unwrap_or(self.root.local_root()).to_path_buf();
                let conflict_name = if dir.join(&conflict_name).exists() {
                    ConflictNamer::generate_unique(&file.name, stamp, |candidate| dir.join(candidate).exists())
                } else {
                    conflict_name
                };
                let conflict_rel = join_rel(subfolder, &conflict_name);
                let conflict_local = self.root.local_path(&conflict_rel);

                self.journal.record(&local);
                self.journal.record(&conflict_local);
                filesystem::rename(&local, &conflict_local).await?;
                warn!(path = %rel, conflict_copy = %conflict_rel, "Conflict: local copy renamed");
                report.conflicts += 1;

                match self.transfer.upload(&conflict_rel, WriteMode::Add).await? {
                    Some(_) => report.uploaded += 1,
                    None => report.remote_errors += 1,
                }
                self.fetch(rel, &local, report).await?;
            }
        }
        Ok(())
    }

    /// Download `rel` and store it at `local` with the remote timestamp
    async fn fetch(&self, rel: &str, local: &Path, report: &mut SyncReport) -> Result<()> {
        let Some((file, data)) = self.transfer.download(rel).await else {
            report.remote_errors += 1;
            return Ok(());
        };
        self.journal.record(local);
        filesystem::store_file(local, &data, file.modified_at).await?;
        info!(path = %rel, size = data.len(), "Downloaded");
        report.downloaded += 1;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------------

    fn push_folder<'a>(
        &'a self,
        subfolder: &'a str,
        overwrite: bool,
        remove: bool,
        report: &'a mut SyncReport,
    ) -> PassFuture<'a> {
        Box::pin(async move {
            let Some(listing) = self.index.list_checked(subfolder, false).await else {
                report.remote_errors += 1;
                return Ok(());
            };
            let entries = filesystem::read_dir(&self.root.local_path(subfolder)).await?;

            for entry in entries {
                if is_conflict_copy(&entry.name) || filesystem::is_partial(&entry.name) {
                    trace!(name = %entry.name, "Skipping");
                    continue;
                }
                let rel = join_rel(subfolder, &entry.name);
                if self.root.is_ignored(&rel, entry.is_dir) {
                    debug!(path = %rel, "Ignored");
                    continue;
                }
                let local = self.root.local_path(&rel);
                let remote = listing.get(&entry.name);

                if entry.is_dir {
                    match remote {
                        Some(RemoteEntry::Folder(_)) => {
                            self.push_folder(&rel, overwrite, remove, report).await?;
                        }
                        Some(RemoteEntry::File(_)) => {
                            warn!(path = %rel, "Local folder shadows a remote file; skipping");
                        }
                        None if remove => {
                            self.journal.record(&local);
                            filesystem::remove_dir_all(&local).await?;
                            info!(path = %rel, "Removed local folder absent remotely");
                            report.deleted_local += 1;
                        }
                        None => {
                            if self.transfer.create_folder(&rel).await {
                                report.folders_created += 1;
                                self.push_folder(&rel, overwrite, remove, report).await?;
                            } else {
                                report.remote_errors += 1;
                            }
                        }
                    }
                    continue;
                }

                match remote {
                    Some(RemoteEntry::Folder(_)) => {
                        warn!(path = %rel, "Local file shadows a remote folder; skipping");
                    }
                    Some(RemoteEntry::File(file)) => {
                        if overwrite {
                            self.verify(&rel, &local, file, report).await?;
                        }
                    }
                    None if remove => {
                        self.journal.record(&local);
                        filesystem::remove_file(&local).await?;
                        info!(path = %rel, "Removed local file absent remotely");
                        report.deleted_local += 1;
                    }
                    None => {
                        match self.transfer.upload(&rel, WriteMode::from_overwrite(overwrite)).await? {
                            Some(_) => report.uploaded += 1,
                            None => report.remote_errors += 1,
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// Settle a file present on both sides, local content authoritative
    async fn verify(&self, rel: &str, local: &Path, remote: &RemoteFile, report: &mut SyncReport) -> Result<()> {
        let Some(stat) = filesystem::stat(local).await? else {
            return Ok(());
        };
        if stat.file_stat().matches(&FileStat::new(remote.size, remote.modified_at)) {
            debug!(path = %rel, "Already synced");
            report.in_sync += 1;
            return Ok(());
        }

        let Some((remote, remote_data)) = self.transfer.download(rel).await else {
            report.remote_errors += 1;
            return Ok(());
        };
        let local_data = filesystem::read_file(local).await?;
        if local_data == remote_data {
            debug!(path = %rel, "Already synced [content match]");
            self.journal.record(local);
            filesystem::set_modified(local, remote.modified_at)?;
            report.in_sync += 1;
            return Ok(());
        }

        match self.transfer.upload(rel, WriteMode::Overwrite).await? {
            Some(_) => report.uploaded += 1,
            None => report.remote_errors += 1,
        }
        Ok(())
    }
}
