//! # notify-link
//!
//! Real-time notification client for a session-authenticated user.
//!
//! One session owns:
//!
//! - a push channel ([`ConnectionManager`]) that reconnects with exponential
//!   backoff and always uses the token current at fire time
//! - a [`MessageRouter`] that decodes channel frames and feeds arrivals to
//!   the store
//! - a [`NotificationStore`] that reconciles REST baselines, pushed arrivals
//!   and optimistic read actions into one list with a consistent unread count
//! - a [`RefreshCoordinator`] that runs at most one token refresh at a time
//!   and shares its outcome with every waiter
//!
//! [`NotificationClient`] assembles them.
//!
//! ## Example
//!
//! ```rust,no_run
//! use notify_link::{ConnectionOptions, NotificationClient};
//!
//! # async fn example() -> notify_link::Result<()> {
//! let client = NotificationClient::builder()
//!     .base_url("https://portal.example.com")
//!     .credentials("<access>", "<refresh>")
//!     .connection_options(ConnectionOptions::new().with_max_reconnect_attempts(Some(10)))
//!     .build()?;
//!
//! client.start().await?;
//!
//! let mut updates = client.watch_notifications();
//! while updates.changed().await.is_ok() {
//!     println!("{} unread", updates.borrow().unread_count);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod client;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod refresh;
pub mod router;
pub mod store;
pub mod timeouts;

pub use api::{ArcNotificationApi, HttpNotificationApi, NotificationApi};
pub use auth::{ArcTokenProvider, SessionTokenProvider, StaticTokenProvider, TokenProvider};
pub use client::{NotificationClient, NotificationClientBuilder};
pub use connection::{
    ArcConnector, Channel, ConnectionManager, Connector, Transport, TransportEvent, WsConnector,
};
pub use credentials::{CredentialStore, MemoryCredentialStore, SessionCredentials};
pub use error::{NotifyLinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use models::{
    ClientMessage, ConnectionEvent, ConnectionOptions, ConnectionState, Notification,
    NotificationId, NotificationType, ServerMessage,
};
pub use refresh::{RefreshCoordinator, SessionStatus};
pub use router::{MessageRouter, RoutedEvent};
pub use store::{NotificationStore, StoreSnapshot};
pub use timeouts::{NotifyLinkTimeouts, NotifyLinkTimeoutsBuilder};
