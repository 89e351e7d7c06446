use serde::{Deserialize, Serialize};

/// Client-to-server frames on the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Application-level keepalive. The server answers with a `pong` frame.
    Ping,
}
