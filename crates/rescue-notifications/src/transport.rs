//! Session transports.
//!
//! A [`SessionTransport`] opens a [`SessionLink`] for a user. The link only
//! has to accept envelopes without blocking; whatever writes them to the
//! network runs elsewhere.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::NotificationError;
use crate::types::Envelope;

/// Default per-session buffer for [`ChannelTransport`].
pub const DEFAULT_SESSION_BUFFER: usize = 64;

#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Opens a session for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Transport` if the user cannot be reached
    /// right now. The dispatcher retries according to its reconnect policy.
    async fn open(&self, user_id: &str) -> Result<Box<dyn SessionLink>, NotificationError>;
}

/// One open session.
pub trait SessionLink: Send + Sync {
    /// Hands an envelope to the session without waiting.
    ///
    /// # Errors
    ///
    /// `LinkClosed` means the session is gone for good. `BufferFull` means
    /// this envelope was dropped but the session is still usable.
    fn send(&self, envelope: &Envelope) -> Result<(), NotificationError>;

    fn is_open(&self) -> bool;
}

/// In-process transport backed by per-user mpsc channels.
///
/// A socket task calls [`ChannelTransport::attach`] and forwards whatever
/// arrives on the returned receiver to its client.
pub struct ChannelTransport {
    buffer: usize,
    sockets: RwLock<HashMap<String, mpsc::Sender<Envelope>>>,
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_BUFFER)
    }
}

impl ChannelTransport {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            sockets: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a socket for `user_id`, replacing any previous one.
    pub fn attach(&self, user_id: &str) -> mpsc::Receiver<Envelope> {
        let (sender, receiver) = mpsc::channel(self.buffer);
        self.sockets.write().insert(user_id.to_string(), sender);
        debug!(user_id = user_id, "Socket attached");
        receiver
    }

    pub fn detach(&self, user_id: &str) {
        if self.sockets.write().remove(user_id).is_some() {
            debug!(user_id = user_id, "Socket detached");
        }
    }

    pub fn is_attached(&self, user_id: &str) -> bool {
        self.sockets
            .read()
            .get(user_id)
            .is_some_and(|sender| !sender.is_closed())
    }
}

#[async_trait]
impl SessionTransport for ChannelTransport {
    async fn open(&self, user_id: &str) -> Result<Box<dyn SessionLink>, NotificationError> {
        let sockets = self.sockets.read();
        match sockets.get(user_id) {
            Some(sender) if !sender.is_closed() => Ok(Box::new(ChannelLink {
                user_id: user_id.to_string(),
                sender: sender.clone(),
            })),
            _ => Err(NotificationError::Transport(format!(
                "no socket attached for {user_id}"
            ))),
        }
    }
}

struct ChannelLink {
    user_id: String,
    sender: mpsc::Sender<Envelope>,
}

impl SessionLink for ChannelLink {
    fn send(&self, envelope: &Envelope) -> Result<(), NotificationError> {
        self.sender
            .try_send(envelope.clone())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    NotificationError::BufferFull(self.user_id.clone())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    NotificationError::LinkClosed(self.user_id.clone())
                }
            })
    }

    fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventType, Notification};

    fn envelope() -> Envelope {
        Notification::new(EventType::StatusUpdate, serde_json::json!({}), "hi").envelope()
    }

    #[tokio::test]
    async fn test_open_requires_attached_socket() {
        let transport = ChannelTransport::new(4);
        assert!(transport.open("u1").await.is_err());

        let mut rx = transport.attach("u1");
        let link = transport.open("u1").await.unwrap();
        link.send(&envelope()).unwrap();
        assert_eq!(rx.recv().await.unwrap().message, "hi");
    }

    #[tokio::test]
    async fn test_link_reports_closed_and_full() {
        let transport = ChannelTransport::new(1);
        let rx = transport.attach("u1");
        let link = transport.open("u1").await.unwrap();

        link.send(&envelope()).unwrap();
        let err = link.send(&envelope()).unwrap_err();
        assert!(matches!(err, NotificationError::BufferFull(_)));

        drop(rx);
        assert!(!link.is_open());
        assert!(link.send(&envelope()).unwrap_err().is_link_closed());
        assert!(!transport.is_attached("u1"));
    }

    #[tokio::test]
    async fn test_detach() {
        let transport = ChannelTransport::default();
        let _rx = transport.attach("u1");
        assert!(transport.is_attached("u1"));
        transport.detach("u1");
        assert!(!transport.is_attached("u1"));
        assert!(transport.open("u1").await.is_err());
    }
}
