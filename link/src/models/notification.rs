use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::notification_id::NotificationId;
use super::notification_type::NotificationType;

/// A single notification as delivered by the push channel and the REST
/// listing.
///
/// The only client-side mutation is the unread → read transition.
/// `application_id` and `formation_id` are lookup-only back-references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,

    pub notification_type: NotificationType,

    pub title: String,

    pub message: String,

    #[serde(default)]
    pub is_read: bool,

    pub created_at: DateTime<Utc>,

    /// Set by the server when the notification was marked read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,

    /// The REST serializer names this `application`; push frames use
    /// `application_id`.
    #[serde(default, alias = "application", skip_serializing_if = "Option::is_none")]
    pub application_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formation_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formation_title: Option<String>,
}

impl Notification {
    /// Minimal constructor; back-references start empty.
    pub fn new(
        id: impl Into<NotificationId>,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            notification_type,
            title: title.into(),
            message: message.into(),
            is_read: false,
            created_at,
            read_at: None,
            application_id: None,
            formation_id: None,
            formation_title: None,
        }
    }

    /// Builder-style setter for the read flag.
    pub fn with_read(mut self, is_read: bool) -> Self {
        self.is_read = is_read;
        self
    }

    pub fn with_application(mut self, application_id: i64) -> Self {
        self.application_id = Some(application_id);
        self
    }

    pub fn with_formation(mut self, formation_id: i64, title: impl Into<String>) -> Self {
        self.formation_id = Some(formation_id);
        self.formation_title = Some(title.into());
        self
    }
}
