//! Channel traits for the chat platform side of the relay.

use crate::message::{GatewayEvent, OutgoingMessage};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChannelError {
    /// Errors a reconnect will not fix.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Chat platform adapter.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name.
    fn name(&self) -> &'static str;

    /// Send one message. Returns the platform message ID.
    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String>;

    /// Show a typing indicator in a channel. Best-effort.
    async fn trigger_typing(&self, _channel_id: &str) -> ChannelResult<()> {
        Ok(())
    }

    /// Run one gateway session, pushing events into `tx` in arrival order.
    ///
    /// Returns when the session ends; the caller decides whether to reconnect.
    async fn listen(&self, tx: mpsc::Sender<GatewayEvent>) -> ChannelResult<()>;

    /// Check if the channel is healthy.
    async fn health_check(&self) -> ChannelResult<()> {
        Ok(())
    }
}
