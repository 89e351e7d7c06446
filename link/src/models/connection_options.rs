use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection-level options for the push channel.
///
/// These options control:
/// - Automatic reconnection on channel loss
/// - Backoff timing and the retry budget
/// - Baseline resync after a reconnect
///
/// Every field has a serde default, so a host application can load this from
/// a partial JSON or TOML document.
///
/// # Example
///
/// ```rust
/// use notify_link::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_auto_reconnect(true)
///     .with_reconnect_delay_ms(2000)
///     .with_max_reconnect_attempts(Some(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Enable automatic reconnection on channel loss
    /// Default: true
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Base delay in milliseconds before the first reconnection attempt.
    /// Attempt `n` (0-based) waits `reconnect_delay_ms * 2^n`.
    /// Default: 3000ms
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Upper bound for a single backoff delay
    /// Default: 60000ms
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Maximum number of consecutive failed attempts before the manager
    /// gives up and enters `Failed`.
    /// Default: Some(5). None retries forever, Some(0) never retries.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: Option<u32>,

    /// Re-fetch the REST baseline whenever the channel re-opens after a loss,
    /// to pick up anything pushed while it was down.
    /// Default: true
    #[serde(default = "default_resync_on_reconnect")]
    pub resync_on_reconnect: bool,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_max_reconnect_delay_ms() -> u64 {
    60000
}

fn default_max_reconnect_attempts() -> Option<u32> {
    Some(5)
}

fn default_resync_on_reconnect() -> bool {
    true
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            resync_on_reconnect: default_resync_on_reconnect(),
        }
    }
}

impl ConnectionOptions {
    /// Create new connection options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to automatically reconnect on channel loss
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the base backoff delay (in milliseconds)
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Set the maximum delay between reconnection attempts (in milliseconds)
    pub fn with_max_reconnect_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_reconnect_delay_ms = max_delay_ms;
        self
    }

    /// Set the maximum number of reconnection attempts
    /// Pass None for infinite retries, Some(0) to disable reconnection
    pub fn with_max_reconnect_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Set whether a reconnect triggers a baseline re-fetch
    pub fn with_resync_on_reconnect(mut self, enabled: bool) -> Self {
        self.resync_on_reconnect = enabled;
        self
    }

    /// Delay before reconnection attempt `attempt` (0-based), or `None` when
    /// the retry budget is exhausted.
    pub fn backoff_delay(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_reconnect_attempts {
            if attempt >= max {
                return None;
            }
        }

        let delay = std::cmp::min(
            self.reconnect_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt)),
            self.max_reconnect_delay_ms,
        );
        Some(Duration::from_millis(delay))
    }
}
