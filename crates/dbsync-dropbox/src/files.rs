//! File and folder operations for the Dropbox API
//!
//! - [`list_folder`] - complete folder listing, following `has_more` cursors
//! - [`download`] - file content plus metadata
//! - [`create_folder`], [`delete`], [`move_entry`] - namespace operations
//!
//! ## Dropbox API References
//!
//! - [files/list_folder](https://www.dropbox.com/developers/documentation/http/documentation#files-list_folder)
//! - [files/download](https://www.dropbox.com/developers/documentation/http/documentation#files-download)

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::DropboxClient;
use crate::DropboxError;

// ============================================================================
// Metadata types
// ============================================================================

/// Metadata of a file as returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub id: String,
    pub path_lower: Option<String>,
    pub path_display: Option<String>,
    /// Client-supplied modification time, `%Y-%m-%dT%H:%M:%SZ`
    pub client_modified: String,
    pub server_modified: String,
    pub rev: String,
    pub size: u64,
    pub content_hash: Option<String>,
}

/// Metadata of a folder as returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct FolderMetadata {
    pub name: String,
    pub id: String,
    pub path_lower: Option<String>,
    pub path_display: Option<String>,
}

/// Metadata of a deleted entry (only appears in some listings)
#[derive(Debug, Clone, Deserialize)]
pub struct DeletedMetadata {
    pub name: String,
    pub path_lower: Option<String>,
    pub path_display: Option<String>,
}

/// Any entry, tagged by `.tag`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
pub enum Metadata {
    File(FileMetadata),
    Folder(FolderMetadata),
    Deleted(DeletedMetadata),
}

/// Wrapper returned by the `_v2` namespace endpoints
#[derive(Debug, Deserialize)]
struct MetadataResult<T> {
    metadata: T,
}

// ============================================================================
// Request arguments
// ============================================================================

#[derive(Debug, Serialize)]
struct ListFolderArg<'a> {
    path: &'a str,
    recursive: bool,
    include_deleted: bool,
}

#[derive(Debug, Serialize)]
struct ListFolderContinueArg<'a> {
    cursor: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListFolderResult {
    entries: Vec<Metadata>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Serialize)]
struct PathArg<'a> {
    path: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateFolderArg<'a> {
    path: &'a str,
    autorename: bool,
}

#[derive(Debug, Serialize)]
struct RelocationArg<'a> {
    from_path: &'a str,
    to_path: &'a str,
    allow_shared_folder: bool,
    autorename: bool,
    allow_ownership_transfer: bool,
}

// ============================================================================
// Operations
// ============================================================================

/// Lists a folder, following continuation cursors until the listing is complete
///
/// `path` is `""` for the root. Deleted entries are never requested.
pub async fn list_folder(
    client: &DropboxClient,
    path: &str,
    recursive: bool,
) -> Result<Vec<Metadata>, DropboxError> {
    let mut page: ListFolderResult = client
        .rpc(
            "files/list_folder",
            &ListFolderArg {
                path,
                recursive,
                include_deleted: false,
            },
        )
        .await?;

    let mut entries = std::mem::take(&mut page.entries);
    let mut pages = 1u32;
    while page.has_more {
        page = client
            .rpc(
                "files/list_folder/continue",
                &ListFolderContinueArg { cursor: &page.cursor },
            )
            .await?;
        entries.append(&mut page.entries);
        pages += 1;
    }

    debug!(path, recursive, pages, entries = entries.len(), "Listed folder");
    Ok(entries)
}

/// Downloads a file
pub async fn download(client: &DropboxClient, path: &str) -> Result<(FileMetadata, Vec<u8>), DropboxError> {
    let (metadata, data): (FileMetadata, Vec<u8>) =
        client.download_content("files/download", &PathArg { path }).await?;
    debug!(path, size = data.len(), "Downloaded file");
    Ok((metadata, data))
}

/// Creates a folder
pub async fn create_folder(client: &DropboxClient, path: &str) -> Result<FolderMetadata, DropboxError> {
    let result: MetadataResult<FolderMetadata> = client
        .rpc(
            "files/create_folder_v2",
            &CreateFolderArg {
                path,
                autorename: false,
            },
        )
        .await?;
    Ok(result.metadata)
}

/// Deletes a file or a folder with its content
pub async fn delete(client: &DropboxClient, path: &str) -> Result<Metadata, DropboxError> {
    let result: MetadataResult<Metadata> = client.rpc("files/delete_v2", &PathArg { path }).await?;
    Ok(result.metadata)
}

/// Moves a file or folder
pub async fn move_entry(client: &DropboxClient, from: &str, to: &str) -> Result<Metadata, DropboxError> {
    let result: MetadataResult<Metadata> = client
        .rpc(
            "files/move_v2",
            &RelocationArg {
                from_path: from,
                to_path: to,
                allow_shared_folder: false,
                autorename: false,
                allow_ownership_transfer: false,
            },
        )
        .await?;
    Ok(result.metadata)
}
