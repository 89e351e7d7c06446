//! Transport seam between the connection manager and the wire.
//!
//! The manager only needs to open a channel for a URL, read events from it
//! in order, write text frames and close it. [`WsConnector`](super::WsConnector)
//! provides this over WebSocket; tests script it in memory.

use crate::error::Result;
use reqwest::Url;
use std::sync::Arc;

/// One inbound event from an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame, in arrival order.
    Text(String),
    /// Protocol-level activity with no payload for the application
    /// (WebSocket ping/pong). Counts as liveness for the keepalive.
    Heartbeat,
    /// The peer closed the channel or the stream ended.
    Closed { code: Option<u16>, reason: String },
    /// Read error; the transport is unusable afterwards.
    Error(String),
}

/// An open, bidirectional text channel.
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Next inbound event. Must be cancel-safe: the manager polls it inside
    /// `select!` together with timers and commands.
    async fn next_event(&mut self) -> TransportEvent;

    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Best-effort close handshake.
    async fn close(&mut self);
}

/// Opens transports. A handshake refused for auth reasons must fail with an
/// error for which [`NotifyLinkError::is_auth_rejection`](crate::NotifyLinkError::is_auth_rejection)
/// is `true`.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, url: &Url) -> Result<Box<dyn Transport>>;
}

pub type ArcConnector = Arc<dyn Connector>;
