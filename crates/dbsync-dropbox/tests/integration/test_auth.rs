//! Refresh-token exchange and app authorization

use dbsync_core::domain::RemotePath;
use dbsync_core::ports::{IRemoteStore, RemoteError};
use serde_json::json;
use wiremock::matchers::{bearer_token, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dbsync_dropbox::{Credentials, DropboxClient, DropboxError, DropboxStore, NoRedirectFlow};

fn refresh_store(server: &MockServer) -> DropboxStore {
    let credentials = Credentials::RefreshToken {
        app_key: "app-key".into(),
        app_secret: "app-secret".into(),
        refresh_token: "refresh-123".into(),
    };
    DropboxStore::new(DropboxClient::with_base_url(credentials, server.uri()))
}

async fn mount_empty_listing(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .and(bearer_token(token))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [],
            "cursor": "c",
            "has_more": false
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_refresh_token_is_exchanged_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sl.fresh",
            "token_type": "bearer",
            "expires_in": 14400
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_empty_listing(&server, "sl.fresh").await;

    let store = refresh_store(&server);
    store.list_folder(&RemotePath::root(), false).await.unwrap();
    // Second call reuses the cached token
    store.list_folder(&RemotePath::root(), false).await.unwrap();
}

#[tokio::test]
async fn test_rejected_refresh_token_is_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "refresh token is invalid or revoked"
        })))
        .mount(&server)
        .await;

    let store = refresh_store(&server);
    let err = store.list_folder(&RemotePath::root(), false).await.unwrap_err();
    assert!(matches!(err, RemoteError::Unauthorized(_)), "got {err:?}");
}

#[tokio::test]
async fn test_token_is_exchanged_again_after_401() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sl.short",
            "token_type": "bearer",
            "expires_in": 14400
        })))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error_summary": "expired_access_token/.."
        })))
        .mount(&server)
        .await;

    let store = refresh_store(&server);
    assert!(store.list_folder(&RemotePath::root(), false).await.is_err());
    assert!(store.list_folder(&RemotePath::root(), false).await.is_err());
}

// ============================================================================
// Authorization code
// ============================================================================

fn code_flow(server: &MockServer) -> NoRedirectFlow {
    NoRedirectFlow::with_endpoints(
        "app-key",
        "app-secret",
        &format!("{}/oauth2/authorize", server.uri()),
        &format!("{}/oauth2/token", server.uri()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_authorization_code_yields_refresh_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=pasted-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sl.short-lived",
            "token_type": "bearer",
            "expires_in": 14400,
            "refresh_token": "refresh-offline",
            "account_id": "dbid:abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let flow = code_flow(&server);
    let refresh = flow.exchange_code("  pasted-code\n").await.unwrap();
    assert_eq!(refresh, "refresh-offline");
}

#[tokio::test]
async fn test_code_exchange_without_refresh_token_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sl.short-lived",
            "token_type": "bearer",
            "expires_in": 14400
        })))
        .mount(&server)
        .await;

    let err = code_flow(&server).exchange_code("pasted-code").await.unwrap_err();
    assert!(matches!(err, DropboxError::Authorization(_)), "got {err:?}");
}

#[tokio::test]
async fn test_rejected_authorization_code() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "code doesn't exist or has expired"
        })))
        .mount(&server)
        .await;

    let err = code_flow(&server).exchange_code("stale").await.unwrap_err();
    assert!(matches!(err, DropboxError::Authorization(_)), "got {err:?}");
}

#[tokio::test]
async fn test_empty_code_is_rejected_without_a_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let err = code_flow(&server).exchange_code("   ").await.unwrap_err();
    assert!(matches!(err, DropboxError::Authorization(_)));
}
