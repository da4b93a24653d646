//! Credentials for the Dropbox API
//!
//! Two forms are supported:
//! - a long-lived access token, used as-is
//! - an app key / app secret / refresh token triple, exchanged at the OAuth2
//!   token endpoint for short-lived access tokens
//!
//! Exchanged tokens are cached until shortly before they expire. A rejected
//! token is dropped from the cache so the next call exchanges again.
//!
//! [`NoRedirectFlow`] obtains the refresh token in the first place: the user
//! opens the authorize URL, approves the app and pastes back the code shown
//! by Dropbox.

use chrono::{DateTime, Duration, Utc};
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, RefreshToken, TokenResponse, TokenUrl,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::API_BASE_URL;
use crate::DropboxError;

/// Page where the user approves the app
pub const AUTHORIZE_URL: &str = "https://www.dropbox.com/oauth2/authorize";

/// Path of the token endpoint below the API base URL
pub(crate) const TOKEN_PATH: &str = "/oauth2/token";

/// Exchange again when the cached token expires within this margin
const REFRESH_MARGIN_SECS: i64 = 300;

/// Lifetime assumed when the token response carries no `expires_in`
const DEFAULT_LIFETIME_SECS: i64 = 4 * 3600;

/// How the client authenticates
#[derive(Clone)]
pub enum Credentials {
    /// A ready-to-use bearer token
    AccessToken(String),
    /// Refresh-token grant for a registered app
    RefreshToken {
        app_key: String,
        app_secret: String,
        refresh_token: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessToken(_) => f.write_str("Credentials::AccessToken(..)"),
            Self::RefreshToken { app_key, .. } => f
                .debug_struct("Credentials::RefreshToken")
                .field("app_key", app_key)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Utc::now() + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

type RefreshClient = BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Hands out bearer tokens for API calls
pub(crate) struct TokenSource {
    credentials: Credentials,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub(crate) fn new(credentials: Credentials, api_base: &str) -> Self {
        Self {
            credentials,
            token_url: format!("{api_base}{TOKEN_PATH}"),
            cached: Mutex::new(None),
        }
    }

    /// Returns a bearer token, exchanging the refresh token when needed
    pub(crate) async fn bearer(&self, http: &reqwest::Client) -> Result<String, DropboxError> {
        let (app_key, app_secret, refresh_token) = match &self.credentials {
            Credentials::AccessToken(token) => return Ok(token.clone()),
            Credentials::RefreshToken {
                app_key,
                app_secret,
                refresh_token,
            } => (app_key, app_secret, refresh_token),
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.access_token.clone());
        }

        let token = self.exchange(http, app_key, app_secret, refresh_token).await?;
        let bearer = token.access_token.clone();
        *cached = Some(token);
        Ok(bearer)
    }

    /// Forget the cached token after the API rejected it
    pub(crate) async fn invalidate(&self) {
        if matches!(self.credentials, Credentials::RefreshToken { .. }) {
            debug!("Dropping cached access token");
            *self.cached.lock().await = None;
        }
    }

    async fn exchange(
        &self,
        http: &reqwest::Client,
        app_key: &str,
        app_secret: &str,
        refresh_token: &str,
    ) -> Result<CachedToken, DropboxError> {
        info!("Refreshing access token");

        let token_url = TokenUrl::new(self.token_url.clone())
            .map_err(|e| DropboxError::TokenRefresh(format!("invalid token URL: {e}")))?;
        let client: RefreshClient = BasicClient::new(ClientId::new(app_key.to_string()))
            .set_client_secret(ClientSecret::new(app_secret.to_string()))
            .set_token_uri(token_url);

        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(http)
            .await
            .map_err(|e| DropboxError::TokenRefresh(e.to_string()))?;

        let lifetime = response
            .expires_in()
            .map(|d| Duration::seconds(d.as_secs() as i64))
            .unwrap_or_else(|| Duration::seconds(DEFAULT_LIFETIME_SECS));

        info!(expires_in_secs = lifetime.num_seconds(), "Access token refreshed");
        Ok(CachedToken {
            access_token: response.access_token().secret().to_string(),
            expires_at: Utc::now() + lifetime,
        })
    }
}

// ============================================================================
// NoRedirectFlow
// ============================================================================

type CodeClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Authorization-code flow without a redirect URI
///
/// Dropbox shows the code on its own page instead of redirecting, so no
/// local callback server is needed. `token_access_type=offline` makes the
/// code exchange return a refresh token.
pub struct NoRedirectFlow {
    client: CodeClient,
    http: reqwest::Client,
}

impl NoRedirectFlow {
    pub fn new(app_key: &str, app_secret: &str) -> Result<Self, DropboxError> {
        Self::with_endpoints(
            app_key,
            app_secret,
            AUTHORIZE_URL,
            &format!("{API_BASE_URL}{TOKEN_PATH}"),
        )
    }

    /// Flow against custom endpoints (used by tests)
    pub fn with_endpoints(
        app_key: &str,
        app_secret: &str,
        authorize_url: &str,
        token_url: &str,
    ) -> Result<Self, DropboxError> {
        let auth_url = AuthUrl::new(authorize_url.to_string())
            .map_err(|e| DropboxError::Authorization(format!("invalid authorize URL: {e}")))?;
        let token_url = TokenUrl::new(token_url.to_string())
            .map_err(|e| DropboxError::Authorization(format!("invalid token URL: {e}")))?;
        let client = BasicClient::new(ClientId::new(app_key.to_string()))
            .set_client_secret(ClientSecret::new(app_secret.to_string()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url);

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client, http })
    }

    /// URL the user opens to approve the app
    pub fn authorize_url(&self) -> String {
        let (url, _state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_extra_param("token_access_type", "offline")
            .url();
        debug!("Generated authorization URL");
        url.to_string()
    }

    /// Exchange the pasted code for a refresh token
    pub async fn exchange_code(&self, code: &str) -> Result<String, DropboxError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(DropboxError::Authorization("empty authorization code".into()));
        }
        info!("Exchanging authorization code");

        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| DropboxError::Authorization(e.to_string()))?;

        let refresh_token = response.refresh_token().ok_or_else(|| {
            DropboxError::Authorization("token response carries no refresh token".into())
        })?;
        info!("Authorization code exchanged");
        Ok(refresh_token.secret().to_string())
    }
}
