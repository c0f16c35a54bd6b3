//! Inbound port: the application's send call.

use async_trait::async_trait;
use shared_types::{MessageHash, WakuMessage};

use crate::error::SendError;

#[async_trait]
pub trait MessageSenderApi: Send + Sync {
    /// Dispatch `message` locally and queue it for broadcast.
    ///
    /// `None` or an empty topic selects the configured default. Returns the
    /// envelope hash once queued; the broadcast outcome is reported on the
    /// event bus.
    async fn send(
        &self,
        pubsub_topic: Option<String>,
        message: WakuMessage,
    ) -> Result<MessageHash, SendError>;
}
