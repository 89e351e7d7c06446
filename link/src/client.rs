//! Session facade with builder pattern.
//!
//! Wires the refresh coordinator, connection manager, message router and
//! notification store together for one user session.

use crate::{
    api::{ArcNotificationApi, HttpNotificationApi, DEFAULT_MAX_RETRIES},
    auth::{ArcTokenProvider, SessionTokenProvider},
    connection::{resolve_channel_endpoint, ArcConnector, Channel, ConnectionManager, WsConnector},
    credentials::{CredentialStore, MemoryCredentialStore, SessionCredentials},
    error::{NotifyLinkError, Result},
    event_handlers::EventHandlers,
    models::{ConnectionEvent, ConnectionOptions, ConnectionState, Notification, NotificationId},
    refresh::{RefreshCoordinator, SessionStatus},
    router::MessageRouter,
    store::{NotificationStore, StoreSnapshot},
    timeouts::NotifyLinkTimeouts,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};

/// Notification client for one user session.
///
/// Use [`NotificationClientBuilder`] to construct instances. Must be built
/// inside a tokio runtime.
///
/// # Examples
///
/// ```rust,no_run
/// use notify_link::NotificationClient;
///
/// # async fn example() -> notify_link::Result<()> {
/// let client = NotificationClient::builder()
///     .base_url("http://localhost:8000")
///     .credentials("<access>", "<refresh>")
///     .build()?;
///
/// client.start().await?;
/// println!("{} unread", client.unread_count());
///
/// client.mark_all_as_read().await?;
/// client.logout().await;
/// # Ok(())
/// # }
/// ```
pub struct NotificationClient {
    coordinator: Arc<RefreshCoordinator>,
    connection: ConnectionManager,
    store: Arc<NotificationStore>,
    credential_store: Option<Arc<dyn CredentialStore>>,
    router: Mutex<Option<JoinHandle<()>>>,
    options: ConnectionOptions,
    timeouts: NotifyLinkTimeouts,
}

impl NotificationClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> NotificationClientBuilder {
        NotificationClientBuilder::new()
    }

    /// Start the session: open the push channel and load the baseline.
    ///
    /// Returns the connection state right after the connect command (the
    /// handshake continues in the background). A failed baseline fetch is
    /// returned as an error; the channel keeps running either way.
    pub async fn start(&self) -> Result<ConnectionState> {
        let state = self.connection.connect().await?;
        log::info!("[notify-link] Session started (connection {})", state);
        self.store.load_baseline().await?;
        Ok(state)
    }

    /// End the session.
    ///
    /// Closes the channel and cancels any reconnect timer, empties the store
    /// (in-flight REST responses are ignored from here on) and forgets the
    /// stored credentials.
    pub async fn logout(&self) {
        self.connection.disconnect().await;
        self.store.close();
        self.stop_router();

        if let Some(store) = &self.credential_store {
            if let Err(e) = store.clear() {
                log::warn!("[notify-link] Failed to clear credentials on logout: {}", e);
            }
        }
        self.coordinator.mark_session_expired();
        log::info!("[notify-link] Logged out");
    }

    /// Begin a new session with fresh credentials after a logout or an
    /// expired session.
    pub async fn login(&self, credentials: SessionCredentials) -> Result<ConnectionState> {
        let store = self.credential_store.as_ref().ok_or_else(|| {
            NotifyLinkError::ConfigurationError(
                "login requires a credential store; use resume() with a custom token provider"
                    .to_string(),
            )
        })?;
        store.save(&credentials)?;
        self.resume().await
    }

    /// Start again with whatever token the provider now holds.
    pub async fn resume(&self) -> Result<ConnectionState> {
        self.coordinator.mark_session_active();
        self.store.reset();
        self.restart_router();
        self.start().await
    }

    /// Stop everything without touching the credentials.
    pub async fn shutdown(&self) {
        self.connection.disconnect().await;
        self.store.close();
        self.stop_router();
    }

    fn stop_router(&self) {
        if let Some(handle) = self.router.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }

    fn restart_router(&self) {
        let handle = MessageRouter::spawn(
            self.connection.subscribe(),
            Arc::clone(&self.store),
            self.options.resync_on_reconnect,
        );
        let previous = self
            .router
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    // ── Notifications ───────────────────────────────────────────────────────

    pub fn notifications(&self) -> Vec<Notification> {
        self.store.notifications()
    }

    pub fn unread_count(&self) -> u64 {
        self.store.unread_count()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    pub fn watch_notifications(&self) -> watch::Receiver<StoreSnapshot> {
        self.store.watch()
    }

    pub async fn mark_as_read(&self, id: impl Into<NotificationId>) -> Result<()> {
        self.store.mark_as_read(&id.into()).await
    }

    pub async fn mark_all_as_read(&self) -> Result<u64> {
        self.store.mark_all_as_read().await
    }

    /// Reload the full list from the server.
    pub async fn refresh(&self) -> Result<()> {
        self.store.load_baseline().await
    }

    pub async fn sync_unread_count(&self) -> Result<u64> {
        self.store.sync_unread_count().await
    }

    // ── Connection ──────────────────────────────────────────────────────────

    /// Reconnect explicitly, e.g. after the state reached `Failed`.
    pub async fn connect(&self) -> Result<ConnectionState> {
        self.connection.connect().await
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection.subscribe()
    }

    pub fn current_channel(&self) -> Option<Channel> {
        self.connection.current_channel()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    // ── Session ─────────────────────────────────────────────────────────────

    pub fn session_status(&self) -> SessionStatus {
        self.coordinator.session_status()
    }

    pub fn watch_session(&self) -> watch::Receiver<SessionStatus> {
        self.coordinator.watch_session()
    }

    /// Get the configured timeouts
    pub fn timeouts(&self) -> &NotifyLinkTimeouts {
        &self.timeouts
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }
}

impl Drop for NotificationClient {
    fn drop(&mut self) {
        self.stop_router();
    }
}

impl std::fmt::Debug for NotificationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationClient")
            .field("connection", &self.connection)
            .field("store", &self.store)
            .field("session", &self.coordinator.session_status())
            .finish()
    }
}

/// Builder for configuring [`NotificationClient`] instances.
pub struct NotificationClientBuilder {
    base_url: Option<String>,
    ws_url: Option<String>,
    credentials: Option<SessionCredentials>,
    credential_store: Option<Arc<dyn CredentialStore>>,
    token_provider: Option<ArcTokenProvider>,
    api: Option<ArcNotificationApi>,
    connector: Option<ArcConnector>,
    connection_options: ConnectionOptions,
    timeouts: NotifyLinkTimeouts,
    event_handlers: EventHandlers,
    max_retries: u32,
}

impl NotificationClientBuilder {
    fn new() -> Self {
        Self {
            base_url: None,
            ws_url: None,
            credentials: None,
            credential_store: None,
            token_provider: None,
            api: None,
            connector: None,
            connection_options: ConnectionOptions::default(),
            timeouts: NotifyLinkTimeouts::default(),
            event_handlers: EventHandlers::default(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Set the server base URL (`http://` or `https://`)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Override the push channel endpoint (`ws://` or `wss://`, no query).
    /// By default it is derived from the base URL.
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// Initial session tokens.
    pub fn credentials(
        mut self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        self.credentials = Some(SessionCredentials::new(access_token, refresh_token));
        self
    }

    /// Where session tokens live. Defaults to an in-memory store.
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    /// Replace the built-in token refresh against `/api/token/refresh/`.
    pub fn token_provider(mut self, provider: ArcTokenProvider) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Replace the REST collaborator.
    pub fn api(mut self, api: ArcNotificationApi) -> Self {
        self.api = Some(api);
        self
    }

    /// Replace the WebSocket transport.
    pub fn connector(mut self, connector: ArcConnector) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set reconnection and resync behavior
    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    /// Set timeout configuration for the channel and REST calls
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use notify_link::{NotificationClient, NotifyLinkTimeouts};
    ///
    /// # async fn example() -> notify_link::Result<()> {
    /// let client = NotificationClient::builder()
    ///     .base_url("http://localhost:8000")
    ///     .timeouts(NotifyLinkTimeouts::fast())
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn timeouts(mut self, timeouts: NotifyLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Set maximum number of transport retries for REST calls
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Build the client
    pub fn build(self) -> Result<NotificationClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| NotifyLinkError::ConfigurationError("base_url is required".into()))?;

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(NotifyLinkError::ConfigurationError(
                "NotificationClient must be built inside a tokio runtime".into(),
            ));
        }

        let endpoint = resolve_channel_endpoint(&base_url, self.ws_url.as_deref())?;

        let mut client_builder = reqwest::Client::builder().pool_idle_timeout(Duration::from_secs(90));
        if !NotifyLinkTimeouts::is_no_timeout(self.timeouts.request_timeout) {
            client_builder = client_builder.timeout(self.timeouts.request_timeout);
        }
        if !NotifyLinkTimeouts::is_no_timeout(self.timeouts.connection_timeout) {
            client_builder = client_builder.connect_timeout(self.timeouts.connection_timeout);
        }
        let http_client = client_builder
            .build()
            .map_err(|e| NotifyLinkError::ConfigurationError(e.to_string()))?;

        let credential_store: Option<Arc<dyn CredentialStore>> =
            match (self.credential_store, self.credentials) {
                (Some(store), Some(credentials)) => {
                    store.save(&credentials)?;
                    Some(store)
                },
                (Some(store), None) => Some(store),
                (None, Some(credentials)) => {
                    Some(Arc::new(MemoryCredentialStore::with_credentials(credentials)))
                },
                (None, None) if self.token_provider.is_none() => {
                    Some(Arc::new(MemoryCredentialStore::new()))
                },
                (None, None) => None,
            };

        let provider: ArcTokenProvider = match (self.token_provider, &credential_store) {
            (Some(provider), _) => provider,
            (None, Some(store)) => Arc::new(SessionTokenProvider::for_base_url(
                Arc::clone(store),
                http_client.clone(),
                &base_url,
            )),
            (None, None) => {
                return Err(NotifyLinkError::InternalError(
                    "no token source configured".into(),
                ))
            },
        };

        let coordinator = Arc::new(RefreshCoordinator::new(provider));

        let api: ArcNotificationApi = match self.api {
            Some(api) => api,
            None => Arc::new(
                HttpNotificationApi::new(&base_url, http_client, Arc::clone(&coordinator))
                    .with_max_retries(self.max_retries),
            ),
        };
        let store = Arc::new(NotificationStore::new(api));

        let connector: ArcConnector = self.connector.unwrap_or_else(|| Arc::new(WsConnector::new()));
        let connection = ConnectionManager::new(
            endpoint,
            Arc::clone(&coordinator),
            connector,
            self.connection_options.clone(),
            self.timeouts.clone(),
            self.event_handlers,
        );

        let router = MessageRouter::spawn(
            connection.subscribe(),
            Arc::clone(&store),
            self.connection_options.resync_on_reconnect,
        );

        log::debug!("[notify-link] Client built for {}", base_url);

        Ok(NotificationClient {
            coordinator,
            connection,
            store,
            credential_store,
            router: Mutex::new(Some(router)),
            options: self.connection_options,
            timeouts: self.timeouts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_missing_url() {
        let result = NotificationClient::builder().build();
        assert!(matches!(result, Err(NotifyLinkError::ConfigurationError(_))));
    }

    #[test]
    fn test_builder_outside_runtime() {
        let result = NotificationClient::builder()
            .base_url("http://localhost:8000")
            .build();
        assert!(matches!(result, Err(NotifyLinkError::ConfigurationError(_))));
    }

    #[tokio::test]
    async fn test_builder_pattern() {
        let client = NotificationClient::builder()
            .base_url("http://localhost:8000")
            .credentials("access", "refresh")
            .timeouts(NotifyLinkTimeouts::fast())
            .max_retries(1)
            .build()
            .unwrap();

        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert_eq!(client.unread_count(), 0);
        assert_eq!(client.coordinator().current_token().as_deref(), Some("access"));
    }

    #[tokio::test]
    async fn test_builder_rejects_insecure_override() {
        let result = NotificationClient::builder()
            .base_url("https://portal.example.com")
            .ws_url("ws://portal.example.com/ws/notifications/")
            .build();
        assert!(matches!(result, Err(NotifyLinkError::ConfigurationError(_))));
    }
}
