//! Transfers between the local tree and the remote store
//!
//! Files up to the chunk size go up in one request. Larger files are read
//! chunk by chunk and sent through an upload session: the first chunk opens
//! the session, middle chunks are appended at the running offset, and the
//! chunk that ends at end of file finishes the session and commits it. A
//! 10 MiB file with 4 MiB chunks is therefore start, one append, finish.
//!
//! Remote failures are logged and reported as `None`/`false`; only local I/O
//! failures are returned as errors.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use dbsync_core::domain::{CommitInfo, RemoteFile, RemotePath, SessionCursor, WriteMode};
use dbsync_core::ports::{IRemoteStore, RemoteResult};
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};

use crate::filesystem;
use crate::root::SyncRoot;
use crate::{Result, SyncError};

/// Moves file content between the sync root and the remote folder
pub struct ChunkedTransfer {
    store: Arc<dyn IRemoteStore>,
    root: Arc<SyncRoot>,
    chunk_size: u64,
}

impl ChunkedTransfer {
    pub fn new(store: Arc<dyn IRemoteStore>, root: Arc<SyncRoot>, chunk_size: u64) -> Self {
        Self {
            store,
            root,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Upload the local file at `rel` to the same relative remote path
    ///
    /// Returns the committed remote metadata, or `None` if the store refused.
    pub async fn upload(&self, rel: &str, mode: WriteMode) -> Result<Option<RemoteFile>> {
        let local = self.root.local_path(rel);
        let remote = self.root.remote_path(rel)?;
        self.upload_to(&local, &remote, mode).await
    }

    /// Upload `local` to `remote`
    pub async fn upload_to(&self, local: &Path, remote: &RemotePath, mode: WriteMode) -> Result<Option<RemoteFile>> {
        let stat = filesystem::stat(local).await?.ok_or_else(|| {
            SyncError::io(local, std::io::Error::from(std::io::ErrorKind::NotFound))
        })?;

        let started = Instant::now();
        let result = if stat.size <= self.chunk_size {
            let data = filesystem::read_file(local).await?;
            self.store.upload(remote, data, mode, stat.modified).await
        } else {
            let commit = CommitInfo {
                path: remote.clone(),
                mode,
                client_modified: stat.modified,
            };
            self.upload_chunked(local, stat.size, &commit).await?
        };

        match result {
            Ok(file) => {
                info!(
                    path = %remote,
                    size = stat.size,
                    ?mode,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Uploaded"
                );
                Ok(Some(file))
            }
            Err(e) => {
                error!(path = %remote, error = %e, "Upload failed");
                Ok(None)
            }
        }
    }

    /// Session upload; the outer result carries local I/O errors, the inner
    /// one remote errors
    async fn upload_chunked(
        &self,
        local: &Path,
        size: u64,
        commit: &CommitInfo,
    ) -> Result<RemoteResult<RemoteFile>> {
        let mut file = tokio::fs::File::open(local)
            .await
            .map_err(|e| SyncError::io(local, e))?;

        let first = read_chunk(&mut file, local, self.chunk_size).await?;
        let mut offset = first.len() as u64;
        let session_id = match self.store.upload_session_start(first).await {
            Ok(id) => id,
            Err(e) => return Ok(Err(e)),
        };
        debug!(path = %commit.path, session_id = %session_id, size, "Upload session opened");

        // A short read is end of file, so each chunk is only sent once the
        // next one is known; the last chunk goes with the finish call
        let mut pending = read_chunk(&mut file, local, self.chunk_size).await?;
        loop {
            let next = if pending.len() as u64 == self.chunk_size {
                read_chunk(&mut file, local, self.chunk_size).await?
            } else {
                Vec::new()
            };
            let cursor = SessionCursor {
                session_id: session_id.clone(),
                offset,
            };
            let len = pending.len() as u64;

            if next.is_empty() {
                if offset + len != size {
                    warn!(
                        path = %commit.path,
                        expected = size,
                        sent = offset + len,
                        "File changed size during upload"
                    );
                }
                return Ok(self.store.upload_session_finish(&cursor, pending, commit).await);
            }
            if let Err(e) = self.store.upload_session_append(&cursor, pending).await {
                return Ok(Err(e));
            }
            offset += len;
            pending = next;
        }
    }

    /// Download the remote file at `rel`
    pub async fn download(&self, rel: &str) -> Option<(RemoteFile, Vec<u8>)> {
        let remote = match self.root.remote_path(rel) {
            Ok(remote) => remote,
            Err(e) => {
                error!(path = rel, error = %e, "Cannot map path to a remote path");
                return None;
            }
        };

        let started = Instant::now();
        match self.store.download(&remote).await {
            Ok((file, data)) => {
                debug!(
                    path = %remote,
                    size = data.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "download"
                );
                Some((file, data))
            }
            Err(e) => {
                error!(path = %remote, error = %e, "Download failed");
                None
            }
        }
    }

    /// Create the remote folder for `rel`
    pub async fn create_folder(&self, rel: &str) -> bool {
        let Some(remote) = self.map(rel) else {
            return false;
        };
        match self.store.create_folder(&remote).await {
            Ok(_) => {
                info!(path = %remote, "Created remote folder");
                true
            }
            Err(e) => {
                error!(path = %remote, error = %e, "Create folder failed");
                false
            }
        }
    }

    /// Delete the remote file or folder for `rel`
    pub async fn delete(&self, rel: &str) -> bool {
        let Some(remote) = self.map(rel) else {
            return false;
        };
        match self.store.delete(&remote).await {
            Ok(()) => {
                info!(path = %remote, "Deleted remote entry");
                true
            }
            Err(e) => {
                error!(path = %remote, error = %e, "Delete failed");
                false
            }
        }
    }

    /// Move the remote entry for `from_rel` to `to_rel`
    pub async fn move_entry(&self, from_rel: &str, to_rel: &str) -> bool {
        let (Some(from), Some(to)) = (self.map(from_rel), self.map(to_rel)) else {
            return false;
        };
        match self.store.move_entry(&from, &to).await {
            Ok(_) => {
                info!(from = %from, to = %to, "Moved remote entry");
                true
            }
            Err(e) => {
                error!(from = %from, to = %to, error = %e, "Move failed");
                false
            }
        }
    }

    fn map(&self, rel: &str) -> Option<RemotePath> {
        match self.root.remote_path(rel) {
            Ok(remote) => Some(remote),
            Err(e) => {
                error!(path = rel, error = %e, "Cannot map path to a remote path");
                None
            }
        }
    }
}

/// Read up to `limit` bytes, fewer only at end of file
async fn read_chunk(file: &mut tokio::fs::File, path: &Path, limit: u64) -> Result<Vec<u8>> {
    let mut chunk = Vec::with_capacity(limit as usize);
    (&mut *file)
        .take(limit)
        .read_to_end(&mut chunk)
        .await
        .map_err(|e| SyncError::io(path, e))?;
    Ok(chunk)
}
