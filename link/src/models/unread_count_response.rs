use serde::{Deserialize, Serialize};

/// Response of `GET …/notifications/unread_count/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub unread_count: u64,
}
