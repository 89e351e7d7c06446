//! Push channel connection management.
//!
//! This module contains:
//! - [`transport`]: the `Connector` / `Transport` seam the manager drives
//! - [`websocket`]: WebSocket implementation plus channel URL helpers
//! - [`manager`]: the connection lifecycle state machine with backoff

pub mod manager;
pub mod transport;
pub mod websocket;

pub use manager::{Channel, ConnectionManager};
pub use transport::{ArcConnector, Connector, Transport, TransportEvent};
pub use websocket::{build_channel_url, redact_url, resolve_channel_endpoint, WsConnector};

/// Path of the notification channel, relative to the server root.
pub const CHANNEL_PATH: &str = "/ws/notifications/";

/// WebSocket close code for an abnormal closure (no close frame).
pub const CLOSE_ABNORMAL: u16 = 1006;

/// WebSocket close code for a normal client-initiated closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Capacity of the lifecycle event broadcast.
pub(crate) const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Capacity of the per-channel outbound queue.
pub(crate) const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Maximum accepted text frame size (1 MiB).
pub(crate) const MAX_TEXT_FRAME_BYTES: usize = 1 << 20;

/// A duration far enough in the future (~100 years) to act as "never" for
/// deadline calculations without overflowing `Instant::now() + dur`.
pub(crate) const FAR_FUTURE: std::time::Duration =
    std::time::Duration::from_secs(100 * 365 * 24 * 3600);
