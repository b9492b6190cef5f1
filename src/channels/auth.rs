//! Access tokens for HTTP mailbox APIs.
//!
//! [`OAuthTokenProvider`] keeps a refresh-token pair on disk (mode `0600`)
//! and refreshes the access token shortly before it expires. A missing or
//! revoked grant surfaces as [`AuthError::ReauthorizationRequired`]; the
//! interactive consent flow that creates the token file is out of scope.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::AuthError;

/// Google OAuth2 token endpoint.
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Supplies a bearer token for each API call.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// A currently valid access token.
    async fn access_token(&self) -> Result<SecretString, AuthError>;

    /// Drop any cached token; the next call must obtain a fresh one.
    async fn invalidate(&self) {}
}

// ── Static token ────────────────────────────────────────────────────

/// A fixed token, e.g. from `GMAIL_ACCESS_TOKEN`. Never refreshed.
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<SecretString, AuthError> {
        Ok(self.token.clone())
    }
}

// ── OAuth token file ────────────────────────────────────────────────

/// An OAuth2 token pair with expiry tracking.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: String,
    /// `None` means unknown; treated as expired.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthToken {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) => now >= exp - chrono::Duration::seconds(EXPIRY_MARGIN_SECS),
            None => true,
        }
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &mask_token(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// First four characters, then `***`.
pub fn mask_token(token: &str) -> String {
    match token.char_indices().nth(4) {
        Some((idx, _)) => format!("{}***", &token[..idx]),
        None => "***".to_string(),
    }
}

/// JSON token file with owner-only permissions.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` if the file does not exist.
    pub async fn load(&self) -> Result<Option<OAuthToken>, AuthError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.store_error(e)),
        };
        let token: OAuthToken =
            serde_json::from_str(&content).map_err(|e| self.store_error(e))?;
        debug!(path = %self.path.display(), expires_at = ?token.expires_at, "Loaded OAuth token");
        Ok(Some(token))
    }

    pub async fn save(&self, token: &OAuthToken) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.store_error(e))?;
        }
        let content = serde_json::to_string_pretty(token).map_err(|e| self.store_error(e))?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| self.store_error(e))?;
        restrict_permissions(&self.path)
            .await
            .map_err(|e| self.store_error(e))?;
        debug!(path = %self.path.display(), "Saved OAuth token");
        Ok(())
    }

    fn store_error(&self, e: impl fmt::Display) -> AuthError {
        AuthError::Store {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Lifetime assumed when the server omits `expires_in` or sends one out of range.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Absolute expiry for a token issued at `now` with `expires_in` seconds.
fn expiry_at(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    let default = chrono::Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS);
    let lifetime = expires_in
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(default);
    now.checked_add_signed(lifetime)
        .unwrap_or_else(|| now + default)
}

/// Refresh-token grant response.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth2 client credentials plus a persisted token pair.
pub struct OAuthTokenProvider {
    store: TokenStore,
    client_id: String,
    client_secret: SecretString,
    endpoint: String,
    http: reqwest::Client,
    cached: Mutex<Option<OAuthToken>>,
}

impl OAuthTokenProvider {
    pub fn new(store: TokenStore, client_id: String, client_secret: SecretString) -> Self {
        Self {
            store,
            client_id,
            client_secret,
            endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    /// Override the token endpoint (tests, non-Google providers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken, AuthError> {
        debug!(endpoint = %self.endpoint, "Refreshing access token");

        let resp = self
            .http
            .post(&self.endpoint)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("refresh_token", token.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let (error, description) = match serde_json::from_str::<RefreshErrorResponse>(&body) {
                Ok(e) => (e.error, e.error_description.unwrap_or_default()),
                Err(_) => (status.to_string(), body),
            };
            warn!(status = %status, error = %error, "Token refresh rejected");
            // invalid_grant: refresh token revoked or expired
            if error == "invalid_grant" {
                return Err(AuthError::ReauthorizationRequired {
                    reason: format!("refresh token rejected: {description}"),
                });
            }
            return Err(AuthError::RefreshFailed {
                reason: format!("{error}: {description}"),
            });
        }

        let parsed: RefreshResponse =
            serde_json::from_str(&body).map_err(|e| AuthError::RefreshFailed {
                reason: format!("unexpected refresh response: {e}"),
            })?;

        Ok(OAuthToken {
            access_token: parsed.access_token,
            refresh_token: parsed
                .refresh_token
                .unwrap_or_else(|| token.refresh_token.clone()),
            expires_at: Some(expiry_at(Utc::now(), parsed.expires_in)),
        })
    }
}

#[async_trait]
impl AuthProvider for OAuthTokenProvider {
    async fn access_token(&self) -> Result<SecretString, AuthError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref().filter(|t| !t.is_expired()) {
            return Ok(SecretString::from(token.access_token.clone()));
        }

        let token = match cached.take() {
            Some(token) => token,
            None => self.store.load().await?.ok_or_else(|| {
                AuthError::ReauthorizationRequired {
                    reason: format!("no token file at {}", self.store.path().display()),
                }
            })?,
        };

        let token = if token.is_expired() {
            let refreshed = self.refresh(&token).await?;
            self.store.save(&refreshed).await?;
            info!(expires_at = ?refreshed.expires_at, "Access token refreshed");
            refreshed
        } else {
            token
        };

        let access = SecretString::from(token.access_token.clone());
        *cached = Some(token);
        Ok(access)
    }

    async fn invalidate(&self) {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_mut() {
            token.expires_at = None;
        }
    }
}
