//! REST collaborator for the notification store.
//!
//! [`NotificationApi`] is the contract the store reconciles against;
//! [`HttpNotificationApi`] implements it over `reqwest`, attaching the bearer
//! token from the [`RefreshCoordinator`] and retrying once with a refreshed
//! token when the server answers 401.

use crate::{
    error::{NotifyLinkError, Result},
    models::{
        ErrorDetail, MarkAllResponse, Notification, NotificationId, NotificationListing,
        UnreadCountResponse,
    },
    refresh::RefreshCoordinator,
};
use log::{debug, warn};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use std::{sync::Arc, time::Instant};

/// Notification collection path, relative to the API base URL.
pub const NOTIFICATIONS_PATH: &str = "/api/notifications/notifications/";

/// Default number of transport-level retries per call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound on pages followed for one listing.
pub const MAX_LIST_PAGES: usize = 1000;

/// REST operations the notification store depends on.
#[async_trait::async_trait]
pub trait NotificationApi: Send + Sync + 'static {
    /// Full notification list for the current user, most recent first,
    /// with every page followed.
    async fn list_notifications(&self) -> Result<Vec<Notification>>;

    async fn unread_count(&self) -> Result<u64>;

    /// Confirm a read. Idempotent on the server.
    async fn mark_as_read(&self, id: &NotificationId) -> Result<Notification>;

    async fn mark_all_as_read(&self) -> Result<MarkAllResponse>;
}

pub type ArcNotificationApi = Arc<dyn NotificationApi>;

/// [`NotificationApi`] over HTTP.
///
/// All four calls are idempotent, so connect and timeout failures are
/// retried up to `max_retries` times with a linear delay.
#[derive(Clone)]
pub struct HttpNotificationApi {
    collection_url: String,
    http_client: reqwest::Client,
    coordinator: Arc<RefreshCoordinator>,
    max_retries: u32,
}

impl HttpNotificationApi {
    pub fn new(
        base_url: &str,
        http_client: reqwest::Client,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            collection_url: format!("{}{}", base_url.trim_end_matches('/'), NOTIFICATIONS_PATH),
            http_client,
            coordinator,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Collection URL extended with `segments`, each percent-encoded, and a
    /// trailing slash.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.collection_url).map_err(|e| {
            NotifyLinkError::ConfigurationError(format!(
                "Invalid collection URL '{}': {}",
                self.collection_url, e
            ))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                NotifyLinkError::ConfigurationError(format!(
                    "Collection URL '{}' cannot carry a path",
                    self.collection_url
                ))
            })?
            .pop_if_empty()
            .extend(segments)
            .push("");
        Ok(url)
    }

    async fn call<T: DeserializeOwned>(&self, method: Method, url: Url) -> Result<T> {
        let mut token = self.coordinator.ensure_fresh_token().await?;
        let mut refreshed = false;
        let mut retries = 0;
        let overall_start = Instant::now();

        loop {
            let attempt_start = Instant::now();
            debug!(
                "[notify-link] {} {} (attempt {}/{})",
                method,
                url,
                retries + 1,
                self.max_retries + 1
            );

            match self
                .http_client
                .request(method.clone(), url.clone())
                .bearer_auth(&token)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    debug!(
                        "[notify-link] Response received: status={} duration_ms={}",
                        status,
                        attempt_start.elapsed().as_millis()
                    );

                    if status.as_u16() == 401 && !refreshed {
                        token = self.coordinator.refresh_after_rejection(&token).await?;
                        refreshed = true;
                        continue;
                    }

                    if status.is_success() {
                        return Ok(response.json::<T>().await?);
                    }

                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    let message = serde_json::from_str::<ErrorDetail>(&error_text)
                        .map(|e| e.detail)
                        .unwrap_or(error_text);

                    warn!(
                        "[notify-link] Server error: status={} message=\"{}\" total_ms={}",
                        status,
                        message,
                        overall_start.elapsed().as_millis()
                    );

                    return Err(match status.as_u16() {
                        404 => NotifyLinkError::NotFound(message),
                        code => NotifyLinkError::ServerError {
                            status_code: code,
                            message,
                        },
                    });
                },
                Err(e) if retries < self.max_retries && Self::is_retriable(&e) => {
                    warn!(
                        "[notify-link] Retriable error (attempt {}/{}): {}",
                        retries + 1,
                        self.max_retries + 1,
                        e
                    );
                    retries += 1;
                    tokio::time::sleep(std::time::Duration::from_millis(100 * retries as u64))
                        .await;
                },
                Err(e) => {
                    warn!(
                        "[notify-link] Request failed: {} total_ms={}",
                        e,
                        overall_start.elapsed().as_millis()
                    );
                    return Err(e.into());
                },
            }
        }
    }

    fn is_retriable(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect()
    }
}

#[async_trait::async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn list_notifications(&self) -> Result<Vec<Notification>> {
        let mut url = self.endpoint(&[])?;
        let mut notifications = Vec::new();

        for page in 1..=MAX_LIST_PAGES {
            let listing: NotificationListing = self.call(Method::GET, url.clone()).await?;
            let (items, next) = listing.into_parts();
            notifications.extend(items);

            let Some(next) = next else {
                if page > 1 {
                    debug!(
                        "[notify-link] Listing assembled from {} page(s): {} notification(s)",
                        page,
                        notifications.len()
                    );
                }
                return Ok(notifications);
            };
            let next = url.join(&next).map_err(|e| {
                NotifyLinkError::SerializationError(format!("Invalid next page '{}': {}", next, e))
            })?;
            if next == url {
                return Err(NotifyLinkError::SerializationError(format!(
                    "Listing page {} points back to itself",
                    next
                )));
            }
            url = next;
        }

        Err(NotifyLinkError::SerializationError(format!(
            "Listing exceeded {} pages",
            MAX_LIST_PAGES
        )))
    }

    async fn unread_count(&self) -> Result<u64> {
        let url = self.endpoint(&["unread_count"])?;
        let response: UnreadCountResponse = self.call(Method::GET, url).await?;
        Ok(response.unread_count)
    }

    async fn mark_as_read(&self, id: &NotificationId) -> Result<Notification> {
        let id = id.to_string();
        let url = self.endpoint(&[id.as_str(), "mark_as_read"])?;
        self.call(Method::POST, url).await
    }

    async fn mark_all_as_read(&self) -> Result<MarkAllResponse> {
        let url = self.endpoint(&["mark_all_as_read"])?;
        self.call(Method::POST, url).await
    }
}

impl std::fmt::Debug for HttpNotificationApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpNotificationApi")
            .field("collection_url", &self.collection_url)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
