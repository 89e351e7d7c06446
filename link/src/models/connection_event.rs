/// Lifecycle events published by the connection manager.
///
/// The message router is the one consumer that acts on `Message` frames;
/// other subscribers may observe the stream for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The channel finished its handshake. `channel_id` increases with every
    /// successful open, so consumers can tell a reconnect from the first open.
    Opened { channel_id: u64 },

    /// The channel closed. `code` is the WebSocket close code when the peer
    /// or transport supplied one (1006 = abnormal closure).
    Closed { code: Option<u16>, reason: String },

    /// Transport-level error (handshake failure, I/O error).
    Error { message: String },

    /// Raw inbound text frame, in arrival order.
    Message(String),
}
