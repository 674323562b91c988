//! Notification dispatcher for the emergency response coordinator.
//!
//! A [`NotificationDispatcher`] keeps one session per connected user and fans
//! published events out to the sessions whose subscriptions match. Sessions
//! are opened through a [`SessionTransport`]; [`ChannelTransport`] is the
//! in-process transport the WebSocket endpoint attaches sockets to.
//!
//! Delivery is best effort. Nothing is persisted or replayed, so a user that
//! is offline when an event is published never sees it.

pub mod backoff;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod transport;
pub mod types;

pub use backoff::ReconnectPolicy;
pub use dispatcher::{DispatcherConfig, NotificationDispatcher, SessionState};
pub use error::NotificationError;
pub use handler::{EventHandler, SubscriptionId};
pub use transport::{ChannelTransport, SessionLink, SessionTransport};
pub use types::{Audience, Envelope, EventType, Notification};
