//! Token providers for notify-link.
//!
//! A [`TokenProvider`] supplies the current access token and knows how to
//! obtain a new one. The core never refreshes on its own; it goes through the
//! [`RefreshCoordinator`](crate::refresh::RefreshCoordinator), which makes
//! sure concurrent callers share a single refresh.
//!
//! ```rust,no_run
//! use notify_link::TokenProvider;
//!
//! struct MyTokenStore { /* ... */ }
//!
//! #[async_trait::async_trait]
//! impl TokenProvider for MyTokenStore {
//!     fn access_token(&self) -> Option<String> {
//!         Some("current-token".into())
//!     }
//!
//!     async fn refresh(&self) -> notify_link::Result<String> {
//!         // call your identity provider here
//!         Ok("fresh-token".into())
//!     }
//! }
//! ```

use crate::{
    credentials::{CredentialStore, SessionCredentials},
    error::{NotifyLinkError, Result},
    models::{TokenRefreshRequest, TokenRefreshResponse},
};
use base64::{engine::general_purpose, Engine as _};
use std::{sync::Arc, time::Duration};

/// Default path of the token refresh endpoint, relative to the API base URL.
pub const REFRESH_PATH: &str = "/api/token/refresh/";

/// Source of the session's access token.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    /// The access token as currently stored, or `None` when logged out.
    ///
    /// Read at every connection attempt, never cached by callers.
    fn access_token(&self) -> Option<String>;

    /// Obtain a new access token from the identity server.
    async fn refresh(&self) -> Result<String>;
}

/// A reference-counted [`TokenProvider`].
pub type ArcTokenProvider = Arc<dyn TokenProvider>;

/// Fixed token with no refresh capability.
///
/// Useful for tests and for hosts that manage token lifetime themselves.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Provider for a logged-out session.
    pub fn none() -> Self {
        Self { token: None }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = self.token.as_ref().map(|_| "<redacted>");
        f.debug_struct("StaticTokenProvider").field("token", &token).finish()
    }
}

#[async_trait::async_trait]
impl TokenProvider for StaticTokenProvider {
    fn access_token(&self) -> Option<String> {
        self.token.clone()
    }

    async fn refresh(&self) -> Result<String> {
        Err(NotifyLinkError::SessionExpired(
            "static token cannot be refreshed".to_string(),
        ))
    }
}

/// Token provider backed by a [`CredentialStore`] and the server's refresh
/// endpoint.
///
/// `refresh()` posts `{"refresh": <refresh token>}` and stores the returned
/// access token, plus the rotated refresh token when the server sends one.
/// A refresh token the server refuses (400/401) ends the session: the store
/// is cleared.
pub struct SessionTokenProvider {
    store: Arc<dyn CredentialStore>,
    http_client: reqwest::Client,
    refresh_url: String,
}

impl SessionTokenProvider {
    /// Create a provider that refreshes against `refresh_url`.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        http_client: reqwest::Client,
        refresh_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            http_client,
            refresh_url: refresh_url.into(),
        }
    }

    /// Provider for a server at `base_url`, using the default refresh path.
    pub fn for_base_url(
        store: Arc<dyn CredentialStore>,
        http_client: reqwest::Client,
        base_url: &str,
    ) -> Self {
        let refresh_url = format!("{}{}", base_url.trim_end_matches('/'), REFRESH_PATH);
        Self::new(store, http_client, refresh_url)
    }

    /// The credential store this provider reads from.
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }
}

#[async_trait::async_trait]
impl TokenProvider for SessionTokenProvider {
    fn access_token(&self) -> Option<String> {
        match self.store.access_token() {
            Ok(token) => token,
            Err(e) => {
                log::warn!("[notify-link] Failed to read credential store: {}", e);
                None
            },
        }
    }

    async fn refresh(&self) -> Result<String> {
        let current = self.store.load()?.ok_or_else(|| {
            NotifyLinkError::SessionExpired("no refresh token stored".to_string())
        })?;

        log::debug!("[notify-link] Refreshing access token at {}", self.refresh_url);
        let start = std::time::Instant::now();
        let response = self
            .http_client
            .post(&self.refresh_url)
            .json(&TokenRefreshRequest {
                refresh: current.refresh_token.clone(),
            })
            .send()
            .await?;

        let status = response.status();
        log::debug!(
            "[notify-link] Refresh response received in {:?}, status={}",
            start.elapsed(),
            status
        );

        if status.as_u16() == 400 || status.as_u16() == 401 {
            let body = response.text().await.unwrap_or_default();
            log::warn!("[notify-link] Refresh token rejected ({}); clearing session", status);
            self.store.clear()?;
            return Err(NotifyLinkError::SessionExpired(format!(
                "refresh rejected ({}): {}",
                status, body
            )));
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NotifyLinkError::ServerError {
                status_code: status.as_u16(),
                message,
            });
        }

        let refreshed = response.json::<TokenRefreshResponse>().await?;
        let rotated = SessionCredentials::new(
            refreshed.access.clone(),
            refreshed.refresh.unwrap_or(current.refresh_token),
        );
        self.store.save(&rotated)?;

        Ok(refreshed.access)
    }
}

/// Expiry of a JWT, read from the `exp` claim without verifying the
/// signature. `None` for anything that is not a JWT with a numeric `exp`.
pub fn token_expiry(token: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?;
    let seconds = exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))?;
    chrono::DateTime::from_timestamp(seconds, 0)
}

/// `true` when `token` is a JWT that expires within `leeway` from now.
/// Tokens without a readable expiry are treated as valid until rejected.
pub fn token_expires_within(token: &str, leeway: Duration) -> bool {
    let Some(expiry) = token_expiry(token) else {
        return false;
    };
    let leeway = chrono::Duration::from_std(leeway).unwrap_or_else(|_| chrono::Duration::zero());
    expiry <= chrono::Utc::now() + leeway
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;

    fn jwt_with_exp(exp: i64) -> String {
        let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = general_purpose::URL_SAFE_NO_PAD
            .encode(format!(r#"{{"token_type":"access","exp":{},"user_id":9}}"#, exp));
        format!("{}.{}.signature", header, payload)
    }

    #[test]
    fn test_token_expiry_decodes_exp_claim() {
        let token = jwt_with_exp(1_700_000_000);
        let expiry = token_expiry(&token).unwrap();
        assert_eq!(expiry.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_non_jwt_tokens_have_no_expiry() {
        assert!(token_expiry("opaque-token").is_none());
        assert!(token_expiry("a.b").is_none());
        assert!(token_expiry("a.!!!.c").is_none());
        assert!(!token_expires_within("opaque-token", Duration::from_secs(30)));
    }

    #[test]
    fn test_expiry_leeway() {
        let now = chrono::Utc::now().timestamp();
        let soon = jwt_with_exp(now + 10);
        let later = jwt_with_exp(now + 3600);
        let past = jwt_with_exp(now - 60);

        assert!(token_expires_within(&soon, Duration::from_secs(30)));
        assert!(!token_expires_within(&later, Duration::from_secs(30)));
        assert!(token_expires_within(&past, Duration::ZERO));
    }

    #[tokio::test]
    async fn test_static_provider_cannot_refresh() {
        let provider = StaticTokenProvider::new("abc");
        assert_eq!(provider.access_token().as_deref(), Some("abc"));
        let err = provider.refresh().await.unwrap_err();
        assert!(matches!(err, NotifyLinkError::SessionExpired(_)));
        assert!(StaticTokenProvider::none().access_token().is_none());
    }

    #[tokio::test]
    async fn test_session_provider_without_credentials_expires() {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let provider =
            SessionTokenProvider::for_base_url(store, reqwest::Client::new(), "http://localhost:1/");
        assert!(provider.access_token().is_none());
        assert_eq!(provider.refresh_url, "http://localhost:1/api/token/refresh/");
        let err = provider.refresh().await.unwrap_err();
        assert!(matches!(err, NotifyLinkError::SessionExpired(_)));
    }
}
