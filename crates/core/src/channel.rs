//! RelayTransport trait — the abstraction over the chat platform session.
//!
//! A transport delivers inbound messages to the bot and offers the primitives
//! the relay needs: transient identity proxies (webhooks), sending under an
//! impersonated display name, and message retraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Unique identifier for a chat channel (guild text channel, DM, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who wrote an inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    /// Platform-specific user ID
    pub id: String,

    /// Name shown in the channel (nickname or username)
    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// Bots and webhooks (including our own relays) are never rewritten
    #[serde(default)]
    pub is_bot: bool,
}

/// Points at one message on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: String,
}

/// Handle of a transient identity proxy (a webhook on Discord).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyHandle {
    pub id: String,
    pub channel_id: ChannelId,
}

/// A message received from the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Where the message lives
    pub location: MessageRef,

    pub author: Author,

    /// The text content
    pub content: String,

    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(location: MessageRef, author: Author, content: impl Into<String>) -> Self {
        Self {
            location,
            author,
            content: content.into(),
            received_at: Utc::now(),
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.location.channel_id
    }
}

/// The chat transport the bot runs on.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Human-readable transport name (e.g., "discord").
    fn name(&self) -> &str;

    /// Start listening for incoming messages.
    async fn start(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<InboundMessage, ChannelError>>,
        ChannelError,
    >;

    /// Send a plain reply as the bot itself.
    async fn reply(
        &self,
        channel_id: &ChannelId,
        content: &str,
    ) -> std::result::Result<MessageRef, ChannelError>;

    /// Create a transient identity proxy in a channel.
    async fn create_identity_proxy(
        &self,
        channel_id: &ChannelId,
        name: &str,
    ) -> std::result::Result<ProxyHandle, ChannelError>;

    /// Send text through a proxy under an impersonated display name.
    async fn send_as_identity(
        &self,
        proxy: &ProxyHandle,
        display_name: &str,
        avatar_url: Option<&str>,
        content: &str,
    ) -> std::result::Result<MessageRef, ChannelError>;

    async fn delete_message(&self, message: &MessageRef) -> std::result::Result<(), ChannelError>;

    async fn delete_identity_proxy(
        &self,
        proxy: &ProxyHandle,
    ) -> std::result::Result<(), ChannelError>;

    /// Stop the transport gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }

    /// Health check — is the transport connected and operational?
    async fn health_check(&self) -> std::result::Result<bool, ChannelError> {
        Ok(true)
    }
}
