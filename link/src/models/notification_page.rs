use serde::{Deserialize, Serialize};

use super::notification::Notification;

/// One page of `GET …/notifications/`, as emitted by page-number pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    /// Total number of items across all pages
    #[serde(default)]
    pub count: u64,
    /// Absolute URL of the next page, `None` on the last one
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Listing body: a paginated envelope, or a bare array when pagination is
/// disabled server-side.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NotificationListing {
    Page(PaginatedResponse<Notification>),
    Items(Vec<Notification>),
}

impl NotificationListing {
    /// Split into this page's items and the next page URL.
    pub fn into_parts(self) -> (Vec<Notification>, Option<String>) {
        match self {
            Self::Page(page) => (page.results, page.next),
            Self::Items(items) => (items, None),
        }
    }
}
