use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the push channel.
///
/// Exactly one state holds at a time. Transitions are driven by the channel
/// lifecycle (open, close, error), the backoff timer and explicit
/// `connect` / `disconnect` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Initial state, and the state after logout or teardown.
    #[default]
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Channel is usable.
    Open,
    /// A backoff timer is pending before the next attempt.
    Reconnecting,
    /// Backoff budget exhausted; only an explicit `connect` resumes.
    Failed,
}

impl ConnectionState {
    /// `true` for `Open`.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// `true` for states in which no further automatic attempt will happen.
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
