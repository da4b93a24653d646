//! Remote store port (driven/secondary port)
//!
//! The sync engine talks to the cloud exclusively through [`IRemoteStore`].
//! The Dropbox adapter implements it over HTTP; tests implement it in
//! memory.
//!
//! ## Design Notes
//!
//! - Errors are classified into [`RemoteError`] so callers can tell a missing
//!   path apart from a failing store without inspecting adapter types.
//! - Single-object operations only. Listing is non-recursive unless asked
//!   for, and must return the complete folder (adapters follow pagination).

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{CommitInfo, RemoteEntry, RemoteFile, RemoteFolder, RemotePath, SessionCursor, WriteMode};

/// Result alias for remote store calls
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failure of a remote store call
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The path does not exist on the store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Something different already exists at the target path
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Credentials were rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The store asked us to slow down
    #[error("Too many requests, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The store failed internally (5xx)
    #[error("Server error: {0}")]
    Server(String),

    /// Any other error reported by the store
    #[error("API error: {0}")]
    Api(String),

    /// The request never got a response
    #[error("Network error: {0}")]
    Network(String),

    /// The response could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Port trait for remote file store operations
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// List the entries of a folder
    ///
    /// With `recursive`, entries of all descendants are included as well.
    ///
    /// # Errors
    /// [`RemoteError::NotFound`] when `path` does not exist.
    async fn list_folder(&self, path: &RemotePath, recursive: bool) -> RemoteResult<Vec<RemoteEntry>>;

    /// Fetch the full content of a file together with its metadata
    async fn download(&self, path: &RemotePath) -> RemoteResult<(RemoteFile, Vec<u8>)>;

    /// Upload a whole file in one request
    async fn upload(
        &self,
        path: &RemotePath,
        data: Vec<u8>,
        mode: WriteMode,
        client_modified: DateTime<Utc>,
    ) -> RemoteResult<RemoteFile>;

    /// Open an upload session carrying the first chunk
    ///
    /// Returns the session id.
    async fn upload_session_start(&self, first_chunk: Vec<u8>) -> RemoteResult<String>;

    /// Append a chunk at `cursor.offset`
    async fn upload_session_append(&self, cursor: &SessionCursor, chunk: Vec<u8>) -> RemoteResult<()>;

    /// Send the last chunk and commit the session to `commit.path`
    async fn upload_session_finish(
        &self,
        cursor: &SessionCursor,
        last_chunk: Vec<u8>,
        commit: &CommitInfo,
    ) -> RemoteResult<RemoteFile>;

    /// Create a folder (parents are created as needed)
    async fn create_folder(&self, path: &RemotePath) -> RemoteResult<RemoteFolder>;

    /// Delete a file or a folder with all its content
    async fn delete(&self, path: &RemotePath) -> RemoteResult<()>;

    /// Move or rename a file or folder
    async fn move_entry(&self, from: &RemotePath, to: &RemotePath) -> RemoteResult<RemoteEntry>;
}
