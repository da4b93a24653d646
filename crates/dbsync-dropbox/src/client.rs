//! Dropbox API v2 HTTP client
//!
//! Dropbox splits its API over two hosts:
//! - RPC endpoints (`api.dropboxapi.com`) take a JSON body and return JSON
//! - content endpoints (`content.dropboxapi.com`) take their JSON argument in
//!   the `Dropbox-API-Arg` header and carry file bytes in the body
//!
//! [`DropboxClient`] hides both conventions, attaches the bearer token, maps
//! error responses into [`DropboxError`] and logs the elapsed time of every
//! call at debug level.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dbsync_dropbox::{Credentials, DropboxClient};
//!
//! let client = DropboxClient::new(Credentials::AccessToken("sl.token".into()));
//! ```

use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::{Credentials, TokenSource};
use crate::DropboxError;

/// Base URL for RPC endpoints
pub const API_BASE_URL: &str = "https://api.dropboxapi.com";

/// Base URL for content upload/download endpoints
pub const CONTENT_BASE_URL: &str = "https://content.dropboxapi.com";

const API_ARG_HEADER: &str = "Dropbox-API-Arg";
const API_RESULT_HEADER: &str = "Dropbox-API-Result";

/// Default retry-after duration when the header is missing
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

// ============================================================================
// Error body
// ============================================================================

/// Body of a 4xx/5xx response on endpoints that report structured errors
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_summary: String,
}

// ============================================================================
// DropboxClient
// ============================================================================

/// HTTP client for Dropbox API v2 calls
pub struct DropboxClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL of the RPC host
    api_base: String,
    /// Base URL of the content host
    content_base: String,
    /// Bearer token provider
    auth: TokenSource,
}

impl DropboxClient {
    /// Creates a client for the public Dropbox endpoints
    pub fn new(credentials: Credentials) -> Self {
        Self::with_base_urls(credentials, API_BASE_URL, CONTENT_BASE_URL)
    }

    /// Creates a client with custom base URLs (useful for testing)
    ///
    /// The token endpoint lives below `api_base`.
    pub fn with_base_urls(
        credentials: Credentials,
        api_base: impl Into<String>,
        content_base: impl Into<String>,
    ) -> Self {
        let api_base = api_base.into();
        Self {
            client: Client::new(),
            auth: TokenSource::new(credentials, &api_base),
            api_base,
            content_base: content_base.into(),
        }
    }

    /// Creates a client sending both RPC and content calls to `base_url`
    pub fn with_base_url(credentials: Credentials, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self::with_base_urls(credentials, base_url.clone(), base_url)
    }

    /// Returns the base URL of the RPC host
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the base URL of the content host
    pub fn content_base(&self) -> &str {
        &self.content_base
    }

    /// Calls an RPC endpoint, e.g. `files/list_folder`
    pub(crate) async fn rpc<A, R>(&self, endpoint: &str, arg: &A) -> Result<R, DropboxError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/2/{}", self.api_base, endpoint);
        let token = self.auth.bearer(&self.client).await?;
        let request = self.client.post(&url).bearer_auth(token).json(arg);
        let response = self.send(endpoint, request).await?;
        parse_json(response).await
    }

    /// Calls a content-upload endpoint, e.g. `files/upload`
    pub(crate) async fn upload_content<A, R>(
        &self,
        endpoint: &str,
        arg: &A,
        body: Vec<u8>,
    ) -> Result<R, DropboxError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/2/{}", self.content_base, endpoint);
        let token = self.auth.bearer(&self.client).await?;
        let request = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(API_ARG_HEADER, header_safe_json(arg)?)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body);
        let response = self.send(endpoint, request).await?;
        parse_json(response).await
    }

    /// Calls a content-download endpoint, e.g. `files/download`
    ///
    /// Returns the JSON result from the `Dropbox-API-Result` header together
    /// with the body bytes.
    pub(crate) async fn download_content<A, R>(
        &self,
        endpoint: &str,
        arg: &A,
    ) -> Result<(R, Vec<u8>), DropboxError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/2/{}", self.content_base, endpoint);
        let token = self.auth.bearer(&self.client).await?;
        let request = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(API_ARG_HEADER, header_safe_json(arg)?);
        let response = self.send(endpoint, request).await?;

        let result_header = response
            .headers()
            .get(API_RESULT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                DropboxError::InvalidResponse(format!("{endpoint}: missing {API_RESULT_HEADER} header"))
            })?;
        let result: R = serde_json::from_str(&result_header)
            .map_err(|e| DropboxError::InvalidResponse(format!("{endpoint}: {e}")))?;

        let bytes = response.bytes().await?;
        Ok((result, bytes.to_vec()))
    }

    /// Sends a request, timing it and mapping error statuses
    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, DropboxError> {
        let started = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        debug!(
            endpoint,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Dropbox call finished"
        );

        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.auth.invalidate().await;
        }
        Err(error_from_response(endpoint, response).await)
    }
}

/// Deserializes a JSON body, treating decode failures as invalid responses
async fn parse_json<R: DeserializeOwned>(response: Response) -> Result<R, DropboxError> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| DropboxError::InvalidResponse(e.to_string()))
}

/// Maps a non-success response into a [`DropboxError`]
async fn error_from_response(endpoint: &str, response: Response) -> DropboxError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER);

    let body = response.text().await.unwrap_or_default();
    let summary = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.error_summary)
        .unwrap_or_else(|_| body.trim().to_string());

    warn!(endpoint, status = status.as_u16(), summary = %summary, "Dropbox call failed");

    match status {
        StatusCode::UNAUTHORIZED => DropboxError::Unauthorized(summary),
        StatusCode::TOO_MANY_REQUESTS => DropboxError::TooManyRequests { retry_after },
        StatusCode::CONFLICT if summary.contains("not_found") => DropboxError::NotFound(summary),
        StatusCode::CONFLICT if summary.contains("conflict") => DropboxError::Conflict(summary),
        s if s.is_server_error() => DropboxError::ServerError(summary),
        s => DropboxError::Api {
            status: s.as_u16(),
            summary,
        },
    }
}

/// Serializes `arg` for the `Dropbox-API-Arg` header
///
/// Header values must be ASCII, so every non-ASCII character (and DEL) is
/// written as a `\uXXXX` escape, using surrogate pairs above U+FFFF.
pub(crate) fn header_safe_json<A: Serialize + ?Sized>(arg: &A) -> Result<String, DropboxError> {
    let json = serde_json::to_string(arg).map_err(|e| DropboxError::InvalidResponse(e.to_string()))?;
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() && c != '\u{7f}' {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    Ok(out)
}
