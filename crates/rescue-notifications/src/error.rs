use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification channel down for {user_id} after {attempts} attempts")]
    ChannelDown { user_id: String, attempts: u32 },

    #[error("Dispatcher is not running")]
    NotRunning,

    #[error("Dispatch queue is full")]
    QueueFull,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session link closed: {0}")]
    LinkClosed(String),

    #[error("Session buffer full: {0}")]
    BufferFull(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Handler failed: {0}")]
    Handler(String),
}

impl NotificationError {
    pub fn is_channel_down(&self) -> bool {
        matches!(self, Self::ChannelDown { .. })
    }

    /// The link is gone and the session should be reopened.
    pub fn is_link_closed(&self) -> bool {
        matches!(self, Self::LinkClosed(_))
    }
}
