use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned notification identifier.
///
/// The server issues integer primary keys; string ids are accepted so the
/// client does not break if the backend switches to opaque identifiers.
/// Stable across reconnects and unique within a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationId {
    Int(i64),
    Text(String),
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{}", id),
            Self::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for NotificationId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for NotificationId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<String> for NotificationId {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}
