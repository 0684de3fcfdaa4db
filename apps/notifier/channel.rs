use crate::{models::notifications::MessageRef, render::MessageContent};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// The referenced message no longer exists (deleted by a moderator, etc).
    #[error("message {0} not found")]
    NotFound(MessageRef),
    #[error("transient channel error: {0}")]
    Transient(String),
    #[error("fatal channel error: {0}")]
    Fatal(String),
}

/// Where notifications are published.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn post(&self, content: &MessageContent) -> Result<MessageRef, ChannelError>;

    async fn edit(&self, message: &MessageRef, content: &MessageContent)
    -> Result<(), ChannelError>;

    async fn delete(&self, message: &MessageRef) -> Result<(), ChannelError>;
}
