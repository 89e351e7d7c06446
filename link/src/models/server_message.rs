use serde::{Deserialize, Serialize};

use super::notification::Notification;

/// Server-to-client frames on the push channel, tagged by `type`.
///
/// Anything that does not match one of these shapes is a protocol deviation:
/// the router drops it with a diagnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A newly created notification for the authenticated user.
    Notification {
        /// The notification payload
        notification: Notification,
    },

    /// Sent once by the server right after it accepts the channel.
    ConnectionEstablished {
        /// Informational text, e.g. "WebSocket connected successfully"
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Reply to a client `ping`.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Server-side complaint about something the client sent.
    Error {
        /// Error message
        message: String,
    },
}
