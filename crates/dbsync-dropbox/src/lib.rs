//! dbsync Dropbox - Dropbox API v2 client
//!
//! Provides an async client for:
//! - Bearer authentication with a fixed access token or a refresh token
//! - The no-redirect authorization-code flow that issues a refresh token
//! - Folder listing with cursor pagination
//! - Downloads, single-shot uploads and upload sessions
//! - Folder creation, deletion and moves
//!
//! ## Modules
//!
//! - [`auth`] - credentials, refresh-token exchange and app authorization
//! - [`client`] - HTTP transport for the RPC and content endpoints
//! - [`files`] - listing, download and namespace operations
//! - [`upload`] - single-shot and session uploads
//! - [`provider`] - [`IRemoteStore`](dbsync_core::ports::IRemoteStore) implementation

pub mod auth;
pub mod client;
pub mod files;
pub mod provider;
pub mod upload;

use std::time::Duration;

use dbsync_core::ports::RemoteError;
use thiserror::Error;

pub use auth::{Credentials, NoRedirectFlow};
pub use client::DropboxClient;
pub use provider::DropboxStore;

/// Errors that can occur when talking to the Dropbox API
#[derive(Debug, Error)]
pub enum DropboxError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The requested path does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Something else already exists at the target path
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// Any other endpoint-specific error
    #[error("API error ({status}): {summary}")]
    Api {
        /// HTTP status code
        status: u16,
        /// `error_summary` from the response, or the raw body
        summary: String,
    },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The refresh token could not be exchanged for an access token
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// An authorization code could not be exchanged for a refresh token
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<DropboxError> for RemoteError {
    fn from(err: DropboxError) -> Self {
        match err {
            DropboxError::Unauthorized(msg)
            | DropboxError::TokenRefresh(msg)
            | DropboxError::Authorization(msg) => {
                RemoteError::Unauthorized(msg)
            }
            DropboxError::NotFound(msg) => RemoteError::NotFound(msg),
            DropboxError::Conflict(msg) => RemoteError::Conflict(msg),
            DropboxError::TooManyRequests { retry_after } => RemoteError::RateLimited { retry_after },
            DropboxError::ServerError(msg) => RemoteError::Server(msg),
            DropboxError::Api { status, summary } => RemoteError::Api(format!("{status}: {summary}")),
            DropboxError::NetworkError(e) => RemoteError::Network(e.to_string()),
            DropboxError::InvalidResponse(msg) => RemoteError::InvalidResponse(msg),
        }
    }
}
