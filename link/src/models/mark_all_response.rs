use serde::{Deserialize, Serialize};

/// Response of `POST …/notifications/mark_all_as_read/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkAllResponse {
    /// Number of notifications the server flipped to read
    #[serde(default)]
    pub count: u64,
    /// Human-readable summary
    #[serde(default)]
    pub message: Option<String>,
}
