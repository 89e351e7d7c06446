use serde::{Deserialize, Serialize};

/// Category of a notification, as assigned by the server.
///
/// Unknown categories deserialize to [`NotificationType::Other`] instead of
/// failing, since the server owns the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ApplicationSubmitted,
    ApplicationApproved,
    ApplicationRejected,
    ApplicationWithdrawn,
    InterviewScheduled,
    InterviewCancelled,
    InterviewRescheduled,
    #[serde(other)]
    Other,
}

impl NotificationType {
    /// `true` for the application lifecycle categories.
    pub fn is_application_event(self) -> bool {
        matches!(
            self,
            Self::ApplicationSubmitted
                | Self::ApplicationApproved
                | Self::ApplicationRejected
                | Self::ApplicationWithdrawn
        )
    }
}
