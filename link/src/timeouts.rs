//! Timeout configuration for notify-link.
//!
//! Covers the channel handshake, REST calls and the application-level
//! keepalive on the push channel.

use std::time::Duration;

/// Timeout configuration for notification client operations.
///
/// # Examples
///
/// ```rust
/// use notify_link::NotifyLinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = NotifyLinkTimeouts::default();
///
/// // Custom timeouts for high-latency environments
/// let timeouts = NotifyLinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(60))
///     .request_timeout_secs(90)
///     .build();
///
/// // Aggressive timeouts for local development
/// let timeouts = NotifyLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyLinkTimeouts {
    /// Upper bound for the channel handshake (TCP + TLS + WebSocket upgrade).
    /// An attempt that exceeds it counts as a failed attempt.
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// Timeout for a single REST call (baseline, mark-as-read, refresh).
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// Inbound silence after which a `ping` frame is sent on the channel.
    /// Set to 0 to disable keep-alive pings.
    /// Default: 30 seconds
    pub keepalive_interval: Duration,

    /// Maximum time to wait for any frame after sending a keepalive ping.
    /// If nothing arrives within this window the channel is treated as
    /// closed abnormally (1006) and the reconnect path runs.
    /// Set to 0 to disable pong timeout checking.
    /// Default: 10 seconds
    pub pong_timeout: Duration,
}

impl Default for NotifyLinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

impl NotifyLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> NotifyLinkTimeoutsBuilder {
        NotifyLinkTimeoutsBuilder::new()
    }

    /// Shorter timeouts suitable for localhost connections.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(5),
        }
    }

    /// Longer timeouts suitable for cloud/remote connections.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            keepalive_interval: Duration::from_secs(60),
            pong_timeout: Duration::from_secs(20),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365) // > 1 year
    }
}

/// Builder for creating custom [`NotifyLinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct NotifyLinkTimeoutsBuilder {
    timeouts: NotifyLinkTimeouts,
}

impl NotifyLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: NotifyLinkTimeouts::default(),
        }
    }

    /// Set the channel handshake timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the channel handshake timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the REST request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout = timeout;
        self
    }

    /// Set the REST request timeout in seconds.
    pub fn request_timeout_secs(self, secs: u64) -> Self {
        self.request_timeout(Duration::from_secs(secs))
    }

    /// Set the keepalive ping interval.
    /// Set to 0 to disable keepalive pings.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.timeouts.keepalive_interval = interval;
        self
    }

    /// Set the keepalive ping interval in seconds.
    pub fn keepalive_interval_secs(self, secs: u64) -> Self {
        self.keepalive_interval(Duration::from_secs(secs))
    }

    /// Set the pong timeout (max wait for any frame after a ping).
    /// Set to 0 to disable pong timeout checking.
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.pong_timeout = timeout;
        self
    }

    /// Set the pong timeout in seconds.
    pub fn pong_timeout_secs(self, secs: u64) -> Self {
        self.pong_timeout(Duration::from_secs(secs))
    }

    /// Build the timeout configuration.
    pub fn build(self) -> NotifyLinkTimeouts {
        self.timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = NotifyLinkTimeouts::default();
        assert_eq!(timeouts.connection_timeout, Duration::from_secs(10));
        assert_eq!(timeouts.request_timeout, Duration::from_secs(30));
        assert_eq!(timeouts.keepalive_interval, Duration::from_secs(30));
        assert_eq!(timeouts.pong_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_builder() {
        let timeouts = NotifyLinkTimeouts::builder()
            .connection_timeout_secs(60)
            .request_timeout_secs(120)
            .keepalive_interval(Duration::ZERO)
            .build();

        assert_eq!(timeouts.connection_timeout, Duration::from_secs(60));
        assert_eq!(timeouts.request_timeout, Duration::from_secs(120));
        assert!(NotifyLinkTimeouts::is_no_timeout(timeouts.keepalive_interval));
    }

    #[test]
    fn test_presets() {
        let fast = NotifyLinkTimeouts::fast();
        assert!(fast.connection_timeout <= Duration::from_secs(5));

        let relaxed = NotifyLinkTimeouts::relaxed();
        assert!(relaxed.connection_timeout >= Duration::from_secs(30));
        assert!(relaxed.request_timeout >= Duration::from_secs(60));
    }

    #[test]
    fn test_is_no_timeout() {
        assert!(NotifyLinkTimeouts::is_no_timeout(Duration::ZERO));
        assert!(!NotifyLinkTimeouts::is_no_timeout(Duration::from_secs(1)));
        assert!(NotifyLinkTimeouts::is_no_timeout(Duration::from_secs(86400 * 400)));
    }
}
