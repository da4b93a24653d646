//! Listing, download and namespace operations

use dbsync_core::domain::{RemoteEntry, RemotePath};
use dbsync_core::ports::{IRemoteStore, RemoteError};
use serde_json::json;
use wiremock::matchers::{bearer_token, body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, api_arg, file_json, folder_json, TOKEN};

// ============================================================================
// list_folder
// ============================================================================

#[tokio::test]
async fn test_list_folder_single_page() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .and(bearer_token(TOKEN))
        .and(body_json(json!({
            "path": "/backup",
            "recursive": false,
            "include_deleted": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [
                file_json("/backup/notes.txt", 5, "2024-03-01T14:05:09Z"),
                folder_json("/backup/docs")
            ],
            "cursor": "c1",
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let entries = store
        .list_folder(&RemotePath::new("/backup").unwrap(), false)
        .await
        .expect("list failed");

    assert_eq!(entries.len(), 2);
    match &entries[0] {
        RemoteEntry::File(f) => {
            assert_eq!(f.name, "notes.txt");
            assert_eq!(f.size, 5);
            assert_eq!(f.path.as_str(), "/backup/notes.txt");
        }
        other => panic!("expected file, got {other:?}"),
    }
    assert!(entries[1].is_folder());
}

#[tokio::test]
async fn test_list_folder_follows_cursor() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [file_json("/a.txt", 1, "2024-03-01T00:00:00Z")],
            "cursor": "page-1",
            "has_more": true
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder/continue"))
        .and(body_json(json!({ "cursor": "page-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [file_json("/b.txt", 2, "2024-03-01T00:00:00Z")],
            "cursor": "page-2",
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let entries = store.list_folder(&RemotePath::root(), false).await.unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name().to_string()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
}

#[tokio::test]
async fn test_list_folder_root_sends_empty_path() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .and(body_json(json!({ "path": "", "recursive": true, "include_deleted": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [],
            "cursor": "c",
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let entries = store.list_folder(&RemotePath::root(), true).await.unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_recursive_listing_drops_the_listed_folder() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [
                folder_json("/Backup"),
                folder_json("/Backup/docs"),
                file_json("/Backup/docs/a.txt", 3, "2024-03-01T00:00:00Z")
            ],
            "cursor": "c",
            "has_more": false
        })))
        .mount(&server)
        .await;

    let entries = store
        .list_folder(&RemotePath::new("/backup").unwrap(), true)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn test_list_missing_folder_is_not_found() {
    let (server, store) = common::setup_store().await;
    common::mount_error(&server, "/2/files/list_folder", 409, "path/not_found/..").await;

    let err = store
        .list_folder(&RemotePath::new("/nope").unwrap(), false)
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_unauthorized_is_mapped() {
    let (server, store) = common::setup_store().await;
    common::mount_error(&server, "/2/files/list_folder", 401, "invalid_access_token/..").await;

    let err = store.list_folder(&RemotePath::root(), false).await.unwrap_err();
    assert!(matches!(err, RemoteError::Unauthorized(_)));
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "7")
                .set_body_json(json!({ "error_summary": "too_many_requests/.." })),
        )
        .mount(&server)
        .await;

    let err = store.list_folder(&RemotePath::root(), false).await.unwrap_err();
    assert_eq!(
        err,
        RemoteError::RateLimited {
            retry_after: std::time::Duration::from_secs(7)
        }
    );
}

#[tokio::test]
async fn test_server_error_is_mapped() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable"))
        .mount(&server)
        .await;

    let err = store.list_folder(&RemotePath::root(), false).await.unwrap_err();
    assert!(matches!(err, RemoteError::Server(msg) if msg.contains("unavailable")));
}

// ============================================================================
// download
// ============================================================================

#[tokio::test]
async fn test_download_returns_content_and_metadata() {
    let (server, store) = common::setup_store().await;
    let content = b"Hello, Dropbox!".to_vec();

    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .and(api_arg(json!({ "path": "/backup/hello.txt" })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Dropbox-API-Result",
                    file_json("/backup/hello.txt", content.len() as u64, "2024-03-01T14:05:09Z")
                        .to_string()
                        .as_str(),
                )
                .set_body_bytes(content.clone()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (file, data) = store
        .download(&RemotePath::new("/backup/hello.txt").unwrap())
        .await
        .expect("download failed");

    assert_eq!(data, content);
    assert_eq!(file.size, content.len() as u64);
    assert_eq!(file.modified_at.to_rfc3339(), "2024-03-01T14:05:09+00:00");
}

#[tokio::test]
async fn test_download_missing_file() {
    let (server, store) = common::setup_store().await;
    common::mount_error(&server, "/2/files/download", 409, "path/not_found/.").await;

    let err = store
        .download(&RemotePath::new("/gone.txt").unwrap())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_download_without_result_header_is_invalid() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
        .mount(&server)
        .await;

    let err = store
        .download(&RemotePath::new("/a.txt").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::InvalidResponse(_)));
}

// ============================================================================
// Namespace operations
// ============================================================================

#[tokio::test]
async fn test_create_folder() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("POST"))
        .and(path("/2/files/create_folder_v2"))
        .and(body_json(json!({ "path": "/backup/new", "autorename": false })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "metadata": folder_json("/backup/new") })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let folder = store
        .create_folder(&RemotePath::new("/backup/new").unwrap())
        .await
        .unwrap();
    assert_eq!(folder.name, "new");
}

#[tokio::test]
async fn test_create_existing_folder_is_conflict() {
    let (server, store) = common::setup_store().await;
    common::mount_error(&server, "/2/files/create_folder_v2", 409, "path/conflict/folder/..").await;

    let err = store
        .create_folder(&RemotePath::new("/backup").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Conflict(_)));
}

#[tokio::test]
async fn test_delete() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("POST"))
        .and(path("/2/files/delete_v2"))
        .and(body_json(json!({ "path": "/backup/old.txt" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": file_json("/backup/old.txt", 1, "2024-03-01T00:00:00Z")
        })))
        .expect(1)
        .mount(&server)
        .await;

    store
        .delete(&RemotePath::new("/backup/old.txt").unwrap())
        .await
        .expect("delete failed");
}

#[tokio::test]
async fn test_move_entry() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("POST"))
        .and(path("/2/files/move_v2"))
        .and(body_json(json!({
            "from_path": "/backup/a.txt",
            "to_path": "/backup/docs/a.txt",
            "allow_shared_folder": false,
            "autorename": false,
            "allow_ownership_transfer": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": file_json("/backup/docs/a.txt", 1, "2024-03-01T00:00:00Z")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let moved = store
        .move_entry(
            &RemotePath::new("/backup/a.txt").unwrap(),
            &RemotePath::new("/backup/docs/a.txt").unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(moved.path().as_str(), "/backup/docs/a.txt");
}
