//! DropboxStore - IRemoteStore implementation for the Dropbox API
//!
//! Wraps a [`DropboxClient`], delegates to the [`files`] and [`upload`]
//! modules and converts API metadata into port-level entries.

use chrono::{DateTime, Utc};
use tracing::debug;

use dbsync_core::domain::{CommitInfo, RemoteEntry, RemoteFile, RemoteFolder, RemotePath, SessionCursor, WriteMode};
use dbsync_core::ports::{IRemoteStore, RemoteError, RemoteResult};

use crate::client::DropboxClient;
use crate::files::{self, FileMetadata, FolderMetadata, Metadata};
use crate::upload;

// ============================================================================
// Metadata conversion
// ============================================================================

fn display_path(
    name: &str,
    path_display: Option<&str>,
    path_lower: Option<&str>,
) -> RemoteResult<RemotePath> {
    let raw = path_display
        .or(path_lower)
        .ok_or_else(|| RemoteError::InvalidResponse(format!("entry without path: {name}")))?;
    RemotePath::new(raw).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
}

fn parse_timestamp(raw: &str) -> RemoteResult<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| RemoteError::InvalidResponse(format!("bad timestamp '{raw}': {e}")))
}

fn to_remote_file(meta: FileMetadata) -> RemoteResult<RemoteFile> {
    Ok(RemoteFile {
        path: display_path(&meta.name, meta.path_display.as_deref(), meta.path_lower.as_deref())?,
        modified_at: parse_timestamp(&meta.client_modified)?,
        size: meta.size,
        content_ref: meta.rev,
        content_hash: meta.content_hash,
        name: meta.name,
    })
}

fn to_remote_folder(meta: FolderMetadata) -> RemoteResult<RemoteFolder> {
    Ok(RemoteFolder {
        path: display_path(&meta.name, meta.path_display.as_deref(), meta.path_lower.as_deref())?,
        name: meta.name,
    })
}

/// Converts a listing entry; deleted entries yield `None`
fn to_remote_entry(meta: Metadata) -> RemoteResult<Option<RemoteEntry>> {
    match meta {
        Metadata::File(f) => to_remote_file(f).map(|f| Some(RemoteEntry::File(f))),
        Metadata::Folder(f) => to_remote_folder(f).map(|f| Some(RemoteEntry::Folder(f))),
        Metadata::Deleted(_) => Ok(None),
    }
}

// ============================================================================
// DropboxStore
// ============================================================================

/// Remote store backed by a Dropbox account
pub struct DropboxStore {
    client: DropboxClient,
}

impl DropboxStore {
    pub fn new(client: DropboxClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &DropboxClient {
        &self.client
    }
}

#[async_trait::async_trait]
impl IRemoteStore for DropboxStore {
    async fn list_folder(&self, path: &RemotePath, recursive: bool) -> RemoteResult<Vec<RemoteEntry>> {
        debug!(path = %path, recursive, "DropboxStore::list_folder");
        let entries = files::list_folder(&self.client, path.as_str(), recursive).await?;

        let mut converted = Vec::with_capacity(entries.len());
        for meta in entries {
            if let Some(entry) = to_remote_entry(meta)? {
                // A recursive listing includes the listed folder itself
                if entry.path().relative_to(path).is_some_and(|r| r.is_empty()) {
                    continue;
                }
                converted.push(entry);
            }
        }
        Ok(converted)
    }

    async fn download(&self, path: &RemotePath) -> RemoteResult<(RemoteFile, Vec<u8>)> {
        debug!(path = %path, "DropboxStore::download");
        let (meta, data) = files::download(&self.client, path.as_str()).await?;
        Ok((to_remote_file(meta)?, data))
    }

    async fn upload(
        &self,
        path: &RemotePath,
        data: Vec<u8>,
        mode: WriteMode,
        client_modified: DateTime<Utc>,
    ) -> RemoteResult<RemoteFile> {
        debug!(path = %path, size = data.len(), ?mode, "DropboxStore::upload");
        let meta = upload::upload(&self.client, path.as_str(), data, mode, client_modified).await?;
        to_remote_file(meta)
    }

    async fn upload_session_start(&self, first_chunk: Vec<u8>) -> RemoteResult<String> {
        Ok(upload::session_start(&self.client, first_chunk).await?)
    }

    async fn upload_session_append(&self, cursor: &SessionCursor, chunk: Vec<u8>) -> RemoteResult<()> {
        Ok(upload::session_append(&self.client, &cursor.session_id, cursor.offset, chunk).await?)
    }

    async fn upload_session_finish(
        &self,
        cursor: &SessionCursor,
        last_chunk: Vec<u8>,
        commit: &CommitInfo,
    ) -> RemoteResult<RemoteFile> {
        let meta = upload::session_finish(
            &self.client,
            &cursor.session_id,
            cursor.offset,
            last_chunk,
            commit.path.as_str(),
            commit.mode,
            commit.client_modified,
        )
        .await?;
        to_remote_file(meta)
    }

    async fn create_folder(&self, path: &RemotePath) -> RemoteResult<RemoteFolder> {
        debug!(path = %path, "DropboxStore::create_folder");
        let meta = files::create_folder(&self.client, path.as_str()).await?;
        to_remote_folder(meta)
    }

    async fn delete(&self, path: &RemotePath) -> RemoteResult<()> {
        debug!(path = %path, "DropboxStore::delete");
        files::delete(&self.client, path.as_str()).await?;
        Ok(())
    }

    async fn move_entry(&self, from: &RemotePath, to: &RemotePath) -> RemoteResult<RemoteEntry> {
        debug!(from = %from, to = %to, "DropboxStore::move_entry");
        let meta = files::move_entry(&self.client, from.as_str(), to.as_str()).await?;
        to_remote_entry(meta)?
            .ok_or_else(|| RemoteError::InvalidResponse(format!("move of {from} returned a deleted entry")))
    }
}
