//! Message router: turns push channel frames into store operations.
//!
//! Subscribes to the connection manager's event stream, decodes each text
//! frame and dispatches it. Frames that do not match a known shape are
//! dropped with a diagnostic and never reach the store.

use crate::{
    error::NotifyLinkError,
    models::{ConnectionEvent, Notification, ServerMessage},
    store::NotificationStore,
};
use std::sync::Arc;
use tokio::{sync::broadcast, task::JoinHandle};

/// Outcome of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedEvent {
    NotificationArrived(Notification),
    /// Server greeting after the channel was accepted.
    ChannelReady,
    Pong,
}

/// Stateless frame decoder plus the dispatch loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageRouter;

impl MessageRouter {
    /// Decode one text frame. `None` means the frame was dropped.
    pub fn route(text: &str) -> Option<RoutedEvent> {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::Notification { notification }) => {
                log::debug!(
                    "[notify-link] Notification {} ({:?}) received",
                    notification.id,
                    notification.notification_type
                );
                Some(RoutedEvent::NotificationArrived(notification))
            },
            Ok(ServerMessage::ConnectionEstablished { message }) => {
                log::debug!(
                    "[notify-link] Server greeting: {}",
                    message.as_deref().unwrap_or("connection established")
                );
                Some(RoutedEvent::ChannelReady)
            },
            Ok(ServerMessage::Pong { .. }) => Some(RoutedEvent::Pong),
            Ok(ServerMessage::Error { message }) => {
                log::warn!("[notify-link] Server reported error: {}", message);
                None
            },
            Err(e) => {
                let preview: String = text.chars().take(120).collect();
                log::warn!("[notify-link] Dropping unrecognized frame ({}): {}", e, preview);
                None
            },
        }
    }

    /// Run the dispatch loop on the current runtime.
    ///
    /// Arrivals go to [`NotificationStore::apply_arrival`]. When `resync` is
    /// set, every open after the first one (and any lag on the event stream)
    /// triggers a background [`NotificationStore::load_baseline`], so
    /// notifications created while the channel was down are recovered. The
    /// loop ends when the event stream closes or the store is closed.
    pub fn spawn(
        mut events: broadcast::Receiver<ConnectionEvent>,
        store: Arc<NotificationStore>,
        resync: bool,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut seen_open = false;

            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!(
                            "[notify-link] Router lagged behind by {} event(s); resyncing",
                            skipped
                        );
                        if resync {
                            Self::resync(&store);
                        }
                        continue;
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                match event {
                    ConnectionEvent::Opened { channel_id } => {
                        if seen_open && resync {
                            log::info!(
                                "[notify-link] Channel {} reopened; reloading notifications",
                                channel_id
                            );
                            Self::resync(&store);
                        }
                        seen_open = true;
                    },
                    ConnectionEvent::Message(text) => {
                        if let Some(RoutedEvent::NotificationArrived(notification)) =
                            Self::route(&text)
                        {
                            match store.apply_arrival(notification) {
                                Ok(_) => {},
                                Err(NotifyLinkError::SessionClosed) => break,
                                Err(e) => log::warn!("[notify-link] Failed to apply arrival: {}", e),
                            }
                        }
                    },
                    ConnectionEvent::Closed { .. } | ConnectionEvent::Error { .. } => {},
                }
            }

            log::debug!("[notify-link] Message router stopped");
        })
    }

    fn resync(store: &Arc<NotificationStore>) {
        let store = Arc::clone(store);
        tokio::spawn(async move {
            match store.load_baseline().await {
                Ok(()) | Err(NotifyLinkError::SessionClosed) => {},
                Err(e) => log::warn!("[notify-link] Resync failed: {}", e),
            }
        });
    }
}
