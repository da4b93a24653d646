//! Upload operations for the Dropbox API
//!
//! - [`upload`] - single request, for files that fit in one chunk
//! - [`session_start`] / [`session_append`] / [`session_finish`] - upload
//!   sessions for larger files, driven chunk by chunk by the caller
//!
//! ## Dropbox API References
//!
//! - [files/upload](https://www.dropbox.com/developers/documentation/http/documentation#files-upload)
//! - [files/upload_session/start](https://www.dropbox.com/developers/documentation/http/documentation#files-upload_session-start)

use chrono::{DateTime, Utc};
use dbsync_core::domain::WriteMode;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::DropboxClient;
use crate::files::FileMetadata;
use crate::DropboxError;

/// Timestamp layout accepted for `client_modified`
const CLIENT_MODIFIED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// ============================================================================
// Request arguments
// ============================================================================

/// Commit descriptor shared by `files/upload` and `upload_session/finish`
#[derive(Debug, Serialize)]
struct CommitArg<'a> {
    path: &'a str,
    mode: &'static str,
    autorename: bool,
    client_modified: String,
    mute: bool,
}

impl<'a> CommitArg<'a> {
    fn new(path: &'a str, mode: WriteMode, client_modified: DateTime<Utc>) -> Self {
        Self {
            path,
            mode: mode_tag(mode),
            autorename: false,
            client_modified: client_modified.format(CLIENT_MODIFIED_FORMAT).to_string(),
            mute: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionStartArg {
    close: bool,
}

#[derive(Debug, Deserialize)]
struct SessionStartResult {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct CursorArg<'a> {
    session_id: &'a str,
    offset: u64,
}

#[derive(Debug, Serialize)]
struct SessionAppendArg<'a> {
    cursor: CursorArg<'a>,
    close: bool,
}

#[derive(Debug, Serialize)]
struct SessionFinishArg<'a> {
    cursor: CursorArg<'a>,
    commit: CommitArg<'a>,
}

fn mode_tag(mode: WriteMode) -> &'static str {
    match mode {
        WriteMode::Add => "add",
        WriteMode::Overwrite => "overwrite",
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Uploads a file in a single request
pub async fn upload(
    client: &DropboxClient,
    path: &str,
    data: Vec<u8>,
    mode: WriteMode,
    client_modified: DateTime<Utc>,
) -> Result<FileMetadata, DropboxError> {
    let size = data.len();
    debug!(path, size, mode = mode_tag(mode), "Uploading file");

    let metadata: FileMetadata = client
        .upload_content("files/upload", &CommitArg::new(path, mode, client_modified), data)
        .await?;

    info!(path, size, "Upload complete");
    Ok(metadata)
}

/// Opens an upload session with its first chunk and returns the session id
pub async fn session_start(client: &DropboxClient, first_chunk: Vec<u8>) -> Result<String, DropboxError> {
    let size = first_chunk.len();
    let result: SessionStartResult = client
        .upload_content(
            "files/upload_session/start",
            &SessionStartArg { close: false },
            first_chunk,
        )
        .await?;
    debug!(session_id = %result.session_id, size, "Upload session started");
    Ok(result.session_id)
}

/// Appends a chunk to an open session at `offset`
pub async fn session_append(
    client: &DropboxClient,
    session_id: &str,
    offset: u64,
    chunk: Vec<u8>,
) -> Result<(), DropboxError> {
    let size = chunk.len();
    let _: IgnoredAny = client
        .upload_content(
            "files/upload_session/append_v2",
            &SessionAppendArg {
                cursor: CursorArg { session_id, offset },
                close: false,
            },
            chunk,
        )
        .await?;
    debug!(session_id, offset, size, "Upload session chunk appended");
    Ok(())
}

/// Sends the last chunk and commits the session
pub async fn session_finish(
    client: &DropboxClient,
    session_id: &str,
    offset: u64,
    last_chunk: Vec<u8>,
    path: &str,
    mode: WriteMode,
    client_modified: DateTime<Utc>,
) -> Result<FileMetadata, DropboxError> {
    let size = last_chunk.len() as u64;
    let metadata: FileMetadata = client
        .upload_content(
            "files/upload_session/finish",
            &SessionFinishArg {
                cursor: CursorArg { session_id, offset },
                commit: CommitArg::new(path, mode, client_modified),
            },
            last_chunk,
        )
        .await?;
    info!(path, session_id, total = offset + size, "Upload session committed");
    Ok(metadata)
}
