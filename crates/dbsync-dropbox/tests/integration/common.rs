//! Shared helpers for Dropbox API integration tests

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use dbsync_dropbox::{Credentials, DropboxClient, DropboxStore};

pub const TOKEN: &str = "test-access-token";

/// Starts a mock server and returns a store whose API and content hosts
/// both point at it.
pub async fn setup_store() -> (MockServer, DropboxStore) {
    let server = MockServer::start().await;
    let client = DropboxClient::with_base_url(Credentials::AccessToken(TOKEN.into()), server.uri());
    (server, DropboxStore::new(client))
}

/// File metadata as the API returns it
pub fn file_json(path_display: &str, size: u64, client_modified: &str) -> Value {
    let name = path_display.rsplit('/').next().unwrap_or_default();
    json!({
        ".tag": "file",
        "name": name,
        "id": format!("id:{name}"),
        "path_lower": path_display.to_lowercase(),
        "path_display": path_display,
        "client_modified": client_modified,
        "server_modified": client_modified,
        "rev": "0123456789abcdef",
        "size": size,
        "content_hash": "e3b0c442"
    })
}

/// Folder metadata as the API returns it
pub fn folder_json(path_display: &str) -> Value {
    let name = path_display.rsplit('/').next().unwrap_or_default();
    json!({
        ".tag": "folder",
        "name": name,
        "id": format!("id:{name}"),
        "path_lower": path_display.to_lowercase(),
        "path_display": path_display
    })
}

/// Matches requests whose `Dropbox-API-Arg` header decodes to `expected`
pub fn api_arg(expected: Value) -> impl Fn(&Request) -> bool + Send + Sync + 'static {
    move |request: &Request| {
        request
            .headers
            .get("Dropbox-API-Arg")
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .is_some_and(|arg| arg == expected)
    }
}

/// Mounts a 409 error response with the given summary on `endpoint`
pub async fn mount_error(server: &MockServer, endpoint: &str, status: u16, summary: &str) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "error_summary": summary,
            "error": { ".tag": "path" }
        })))
        .mount(server)
        .await;
}
