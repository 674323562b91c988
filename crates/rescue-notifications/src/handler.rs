use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NotificationError;
use crate::types::Envelope;

/// Identifier returned by `subscribe`, unique per dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Server-side reaction to an event received by a session.
///
/// Handlers run in their own task with a timeout. A slow or panicking
/// handler is logged and never delays delivery to other sessions.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str {
        "handler"
    }

    async fn handle(&self, user_id: &str, envelope: &Envelope) -> Result<(), NotificationError>;
}
