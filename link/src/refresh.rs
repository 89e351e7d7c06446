//! Single-flight token refresh shared by the push channel and REST calls.
//!
//! Every caller that finds the access token stale or rejected goes through
//! [`RefreshCoordinator`]. While a refresh is in flight, further callers join
//! it instead of starting their own, and all of them observe the same
//! outcome. A failed refresh ends the session: waiters receive
//! [`NotifyLinkError::SessionExpired`] and the session status flips to
//! [`SessionStatus::Expired`], which the connection manager watches.

use crate::{
    auth::{token_expires_within, ArcTokenProvider},
    error::{NotifyLinkError, Result},
};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};
use tokio::sync::watch;

/// Tokens expiring within this window are refreshed before use.
pub const DEFAULT_EXPIRY_LEEWAY: Duration = Duration::from_secs(30);

type RefreshFuture = Shared<BoxFuture<'static, Result<String>>>;

/// Whether the session can still obtain valid tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    /// A refresh failed; a fresh login is required.
    Expired,
}

struct InFlight {
    generation: u64,
    future: RefreshFuture,
}

/// Coordinates token refreshes so that at most one is in flight.
pub struct RefreshCoordinator {
    provider: ArcTokenProvider,
    in_flight: Mutex<Option<InFlight>>,
    generation: AtomicU64,
    refresh_count: Arc<AtomicU64>,
    session_tx: Arc<watch::Sender<SessionStatus>>,
    leeway: Duration,
}

impl RefreshCoordinator {
    pub fn new(provider: ArcTokenProvider) -> Self {
        let (session_tx, _) = watch::channel(SessionStatus::Active);
        Self {
            provider,
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
            refresh_count: Arc::new(AtomicU64::new(0)),
            session_tx: Arc::new(session_tx),
            leeway: DEFAULT_EXPIRY_LEEWAY,
        }
    }

    /// Override the proactive-refresh window.
    pub fn with_expiry_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// The token as currently held by the provider, without any refresh.
    pub fn current_token(&self) -> Option<String> {
        self.provider.access_token()
    }

    /// Returns a usable access token, refreshing first when the current one
    /// expires within the leeway.
    pub async fn ensure_fresh_token(&self) -> Result<String> {
        let token = self.current_token().ok_or_else(|| {
            NotifyLinkError::SessionExpired("no access token available".to_string())
        })?;

        if !token_expires_within(&token, self.leeway) {
            return Ok(token);
        }

        log::debug!("[notify-link] Access token expires within {:?}; refreshing", self.leeway);
        self.refresh_from(Some(token)).await
    }

    /// Called after the server rejected `rejected` (HTTP 401, refused
    /// handshake). Returns a token to retry with. If another caller already
    /// replaced the rejected token, that token is returned without a new
    /// refresh.
    pub async fn refresh_after_rejection(&self, rejected: &str) -> Result<String> {
        self.refresh_from(Some(rejected.to_string())).await
    }

    async fn refresh_from(&self, stale: Option<String>) -> Result<String> {
        let (generation, future) = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(in_flight) => (in_flight.generation, in_flight.future.clone()),
                None => {
                    if let Some(current) = self.current_token() {
                        let replaced = stale.as_deref() != Some(current.as_str());
                        if replaced && !token_expires_within(&current, self.leeway) {
                            return Ok(current);
                        }
                    }

                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let future = self.start_refresh();
                    *slot = Some(InFlight {
                        generation,
                        future: future.clone(),
                    });
                    (generation, future)
                },
            }
        };

        let outcome = future.await;

        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().map(|f| f.generation) == Some(generation) {
            *slot = None;
        }

        outcome
    }

    fn start_refresh(&self) -> RefreshFuture {
        let provider = Arc::clone(&self.provider);
        let refresh_count = Arc::clone(&self.refresh_count);
        let session_tx = Arc::clone(&self.session_tx);

        async move {
            refresh_count.fetch_add(1, Ordering::SeqCst);
            match provider.refresh().await {
                Ok(token) => {
                    log::info!("[notify-link] Access token refreshed");
                    session_tx.send_replace(SessionStatus::Active);
                    Ok(token)
                },
                Err(e) => {
                    log::warn!("[notify-link] Token refresh failed: {}", e);
                    session_tx.send_replace(SessionStatus::Expired);
                    Err(match e {
                        NotifyLinkError::SessionExpired(msg) => NotifyLinkError::SessionExpired(msg),
                        other => NotifyLinkError::SessionExpired(other.to_string()),
                    })
                },
            }
        }
        .boxed()
        .shared()
    }

    /// Current session status.
    pub fn session_status(&self) -> SessionStatus {
        *self.session_tx.borrow()
    }

    /// Receiver that observes session expiry.
    pub fn watch_session(&self) -> watch::Receiver<SessionStatus> {
        self.session_tx.subscribe()
    }

    /// Mark the session usable again after a fresh login.
    pub fn mark_session_active(&self) {
        self.session_tx.send_replace(SessionStatus::Active);
    }

    /// Mark the session over (logout).
    pub fn mark_session_expired(&self) {
        self.session_tx.send_replace(SessionStatus::Expired);
    }

    /// Number of refresh calls issued to the provider so far.
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("session", &self.session_status())
            .field("refresh_count", &self.refresh_count())
            .field("leeway", &self.leeway)
            .finish()
    }
}
