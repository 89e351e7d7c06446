//! Data models for notify-link.
//!
//! Wire structures for the push channel frames and the REST collaborator,
//! plus the connection-level configuration types.

pub mod client_message;
pub mod connection_event;
pub mod connection_options;
pub mod connection_state;
pub mod error_detail;
pub mod mark_all_response;
pub mod notification;
pub mod notification_id;
pub mod notification_page;
pub mod notification_type;
pub mod server_message;
pub mod token_refresh;
pub mod unread_count_response;


pub use client_message::ClientMessage;
pub use connection_event::ConnectionEvent;
pub use connection_options::ConnectionOptions;
pub use connection_state::ConnectionState;
pub use error_detail::ErrorDetail;
pub use mark_all_response::MarkAllResponse;
pub use notification::Notification;
pub use notification_id::NotificationId;
pub use notification_page::{NotificationListing, PaginatedResponse};
pub use notification_type::NotificationType;
pub use server_message::ServerMessage;
pub use token_refresh::{TokenRefreshRequest, TokenRefreshResponse};
pub use unread_count_response::UnreadCountResponse;
