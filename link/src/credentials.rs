//! Credential storage abstraction for notify-link.
//!
//! The session holds a short-lived access token and a longer-lived refresh
//! token. Where they live (memory, a keychain, a config file) is up to the
//! host application; the client only talks to a [`CredentialStore`].

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

/// Tokens for one authenticated session.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionCredentials {
    /// Bearer token attached to REST calls and the channel handshake
    pub access_token: String,

    /// Token exchanged for a new access token; may rotate on every refresh
    pub refresh_token: String,
}

impl SessionCredentials {
    /// Create new credentials
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Tokens never reach logs.
impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Trait for credential storage backends.
///
/// Implementations are shared between the refresh coordinator and the host
/// application, so every method takes `&self`; use interior mutability.
///
/// # Security Note
///
/// Implementations MUST ensure tokens are stored securely:
/// - Files should use restrictive permissions (0600 on Unix)
/// - Tokens should never be logged
///
/// # Example Implementation
///
/// ```rust,ignore
/// use notify_link::credentials::{CredentialStore, SessionCredentials};
///
/// struct KeychainStore;
///
/// impl CredentialStore for KeychainStore {
///     fn load(&self) -> Result<Option<SessionCredentials>> {
///         // Read from your storage backend
///         Ok(None)
///     }
///
///     fn save(&self, credentials: &SessionCredentials) -> Result<()> {
///         // Write to your storage backend
///         Ok(())
///     }
///
///     fn clear(&self) -> Result<()> {
///         // Remove from your storage backend
///         Ok(())
///     }
/// }
/// ```
pub trait CredentialStore: Send + Sync {
    /// Current session tokens, or `Ok(None)` when logged out.
    fn load(&self) -> Result<Option<SessionCredentials>>;

    /// Persist session tokens, replacing whatever was stored.
    fn save(&self, credentials: &SessionCredentials) -> Result<()>;

    /// Forget the session. Returns `Ok(())` even if nothing was stored.
    fn clear(&self) -> Result<()>;

    /// Access token only.
    ///
    /// Default implementation calls `load()`.
    fn access_token(&self) -> Result<Option<String>> {
        Ok(self.load()?.map(|creds| creds.access_token))
    }
}

/// In-memory credential store for tests and short-lived sessions.
///
/// Does NOT persist tokens across restarts.
///
/// # Example
///
/// ```rust
/// use notify_link::credentials::{CredentialStore, MemoryCredentialStore, SessionCredentials};
///
/// let store = MemoryCredentialStore::new();
/// let creds = SessionCredentials::new("access", "refresh");
///
/// store.save(&creds).unwrap();
/// assert_eq!(store.load().unwrap(), Some(creds));
/// ```
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<Option<SessionCredentials>>,
}

impl MemoryCredentialStore {
    /// Create a new empty in-memory credential store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a session
    pub fn with_credentials(credentials: SessionCredentials) -> Self {
        Self {
            credentials: RwLock::new(Some(credentials)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<SessionCredentials>> {
        Ok(self
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, credentials: &SessionCredentials) -> Result<()> {
        *self.credentials.write().unwrap_or_else(PoisonError::into_inner) =
            Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.credentials.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
