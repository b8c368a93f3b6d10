//! Discord guild adapter (stub).
//!
//! Implements [`RelayTransport`] and [`SlotPlatform`] for one Discord guild.
//! In production, this would use `serenity` for the gateway and REST calls.
//! Currently an in-process guild: messages are injected, and emojis,
//! webhooks and posted messages are recorded so they can be inspected.

use async_trait::async_trait;
use emoterelay_config::DiscordSettings;
use emoterelay_core::channel::{
    Author, ChannelId, InboundMessage, MessageRef, ProxyHandle, RelayTransport,
};
use emoterelay_core::error::{ChannelError, PlatformError};
use emoterelay_core::platform::{EnumeratedSlot, SlotPlatform};
use emoterelay_core::slot::SlotHandle;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Custom emoji slots on a guild without boosts.
pub const DEFAULT_EMOJI_LIMIT: usize = 50;

/// Largest emoji image Discord accepts.
pub const MAX_EMOJI_BYTES: usize = 256 * 1024;

/// Discord guild configuration.
#[derive(Clone)]
pub struct DiscordConfig {
    /// Bot token from Discord Developer Portal.
    pub bot_token: String,
    /// The guild whose emoji slots the bot manages.
    pub guild_id: String,
    /// Custom emoji limit of the guild.
    pub emoji_limit: usize,
}

impl DiscordConfig {
    pub fn from_settings(settings: &DiscordSettings) -> Self {
        Self {
            bot_token: settings.bot_token.clone().unwrap_or_default(),
            guild_id: settings
                .allowed_guilds
                .first()
                .cloned()
                .unwrap_or_else(|| "local".into()),
            emoji_limit: DEFAULT_EMOJI_LIMIT,
        }
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &"[REDACTED]")
            .field("guild_id", &self.guild_id)
            .field("emoji_limit", &self.emoji_limit)
            .finish()
    }
}

/// A custom emoji on the guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emoji {
    pub id: String,
    pub name: String,
    pub animated: bool,
}

/// A message as it appears in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub reference: MessageRef,
    pub author_name: String,
    pub avatar_url: Option<String>,
    pub content: String,
    /// Webhook it was sent through, if any
    pub webhook: Option<String>,
}

/// Failures to inject into subsequent calls.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub webhook_create: bool,
    pub webhook_send: bool,
    pub message_delete: bool,
    pub webhook_delete: bool,
    pub emoji_delete: bool,
    /// Returned by every emoji create
    pub emoji_create: Option<PlatformError>,
    /// Returned by emoji enumeration
    pub emoji_list: Option<PlatformError>,
}

#[derive(Default)]
struct GuildState {
    next_id: u64,
    emojis: Vec<Emoji>,
    emoji_creates: usize,
    messages: Vec<PostedMessage>,
    webhooks: HashMap<String, ChannelId>,
    faults: Faults,
}

impl GuildState {
    fn snowflake(&mut self) -> String {
        self.next_id += 1;
        (1_000 + self.next_id).to_string()
    }
}

/// Discord guild adapter.
pub struct DiscordGuild {
    config: DiscordConfig,
    state: Mutex<GuildState>,
    inject_tx: tokio::sync::Mutex<Option<mpsc::Sender<Result<InboundMessage, ChannelError>>>>,
}

impl DiscordGuild {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            state: Mutex::new(GuildState::default()),
            inject_tx: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DiscordConfig {
        &self.config
    }

    /// Inject a message as if it came from Discord (for testing).
    ///
    /// The message becomes visible in its channel before it is delivered.
    pub async fn inject_message(&self, msg: InboundMessage) -> Result<(), ChannelError> {
        let guard = self.inject_tx.lock().await;
        let Some(tx) = guard.as_ref() else {
            return Err(ChannelError::ConnectionLost("Channel not started".into()));
        };

        self.state().messages.push(PostedMessage {
            reference: msg.location.clone(),
            author_name: msg.author.display_name.clone(),
            avatar_url: msg.author.avatar_url.clone(),
            content: msg.content.clone(),
            webhook: None,
        });
        tx.send(Ok(msg))
            .await
            .map_err(|_| ChannelError::ConnectionLost("Message channel closed".into()))
    }

    /// Post `content` as `author` in `channel`, assigning a fresh message id.
    pub async fn post(
        &self,
        channel: &str,
        author: Author,
        content: &str,
    ) -> Result<MessageRef, ChannelError> {
        let location = MessageRef {
            channel_id: ChannelId(channel.to_string()),
            message_id: self.state().snowflake(),
        };
        self.inject_message(InboundMessage::new(location.clone(), author, content))
            .await?;
        Ok(location)
    }

    /// Add an emoji directly, as if created by an earlier run or a moderator.
    pub fn preload_emoji(&self, name: &str, animated: bool) -> Emoji {
        let mut state = self.state();
        let emoji = Emoji {
            id: state.snowflake(),
            name: name.to_string(),
            animated,
        };
        state.emojis.push(emoji.clone());
        emoji
    }

    pub fn set_faults(&self, faults: Faults) {
        self.state().faults = faults;
    }

    pub fn emojis(&self) -> Vec<Emoji> {
        self.state().emojis.clone()
    }

    /// Emoji create calls that succeeded.
    pub fn emoji_creates(&self) -> usize {
        self.state().emoji_creates
    }

    /// Messages currently visible in a channel, oldest first.
    pub fn messages(&self, channel: &str) -> Vec<PostedMessage> {
        self.state()
            .messages
            .iter()
            .filter(|m| m.reference.channel_id.0 == channel)
            .cloned()
            .collect()
    }

    /// Webhooks that have not been deleted.
    pub fn open_webhooks(&self) -> usize {
        self.state().webhooks.len()
    }

    fn state(&self) -> MutexGuard<'_, GuildState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn post_message(
        &self,
        channel_id: &ChannelId,
        author_name: &str,
        avatar_url: Option<&str>,
        content: &str,
        webhook: Option<&str>,
    ) -> MessageRef {
        let mut state = self.state();
        let reference = MessageRef {
            channel_id: channel_id.clone(),
            message_id: state.snowflake(),
        };
        state.messages.push(PostedMessage {
            reference: reference.clone(),
            author_name: author_name.to_string(),
            avatar_url: avatar_url.map(str::to_string),
            content: content.to_string(),
            webhook: webhook.map(str::to_string),
        });
        reference
    }
}

/// Discord emoji names: 2 to 32 alphanumerics or underscores.
fn valid_emoji_name(name: &str) -> bool {
    (2..=32).contains(&name.len()) && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl RelayTransport for DiscordGuild {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<InboundMessage, ChannelError>>, ChannelError> {
        info!(guild = %self.config.guild_id, "Discord transport starting (stub mode)");
        let (tx, rx) = mpsc::channel(64);
        *self.inject_tx.lock().await = Some(tx);
        Ok(rx)
    }

    async fn reply(&self, channel_id: &ChannelId, content: &str) -> Result<MessageRef, ChannelError> {
        debug!(channel = %channel_id, content_len = content.len(), "Discord reply (stub)");
        Ok(self.post_message(channel_id, "bot", None, content, None))
    }

    async fn create_identity_proxy(
        &self,
        channel_id: &ChannelId,
        name: &str,
    ) -> Result<ProxyHandle, ChannelError> {
        let mut state = self.state();
        if state.faults.webhook_create {
            return Err(ChannelError::MissingPermission("MANAGE_WEBHOOKS".into()));
        }
        let id = state.snowflake();
        state.webhooks.insert(id.clone(), channel_id.clone());
        debug!(channel = %channel_id, webhook = %id, name = %name, "Created webhook");
        Ok(ProxyHandle {
            id,
            channel_id: channel_id.clone(),
        })
    }

    async fn send_as_identity(
        &self,
        proxy: &ProxyHandle,
        display_name: &str,
        avatar_url: Option<&str>,
        content: &str,
    ) -> Result<MessageRef, ChannelError> {
        {
            let state = self.state();
            if state.faults.webhook_send {
                return Err(ChannelError::DeliveryFailed {
                    channel: proxy.channel_id.to_string(),
                    reason: "webhook execution failed".into(),
                });
            }
            if !state.webhooks.contains_key(&proxy.id) {
                return Err(ChannelError::NotConfigured(format!("unknown webhook {}", proxy.id)));
            }
        }
        Ok(self.post_message(&proxy.channel_id, display_name, avatar_url, content, Some(&proxy.id)))
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), ChannelError> {
        let mut state = self.state();
        if state.faults.message_delete {
            return Err(ChannelError::MissingPermission("MANAGE_MESSAGES".into()));
        }
        let before = state.messages.len();
        state.messages.retain(|m| m.reference != *message);
        if state.messages.len() == before {
            return Err(ChannelError::MessageNotFound(message.message_id.clone()));
        }
        Ok(())
    }

    async fn delete_identity_proxy(&self, proxy: &ProxyHandle) -> Result<(), ChannelError> {
        let mut state = self.state();
        if state.faults.webhook_delete {
            return Err(ChannelError::MissingPermission("MANAGE_WEBHOOKS".into()));
        }
        state
            .webhooks
            .remove(&proxy.id)
            .map(|_| ())
            .ok_or_else(|| ChannelError::NotConfigured(format!("unknown webhook {}", proxy.id)))
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        info!("Discord transport stopping");
        *self.inject_tx.lock().await = None;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, ChannelError> {
        Ok(!self.config.bot_token.is_empty())
    }
}

#[async_trait]
impl SlotPlatform for DiscordGuild {
    fn name(&self) -> &str {
        "discord"
    }

    fn capacity(&self) -> usize {
        self.config.emoji_limit
    }

    async fn create_slot(
        &self,
        platform_name: &str,
        image: &[u8],
        is_animated: bool,
    ) -> Result<SlotHandle, PlatformError> {
        let mut state = self.state();
        if let Some(fault) = state.faults.emoji_create.clone() {
            return Err(fault);
        }
        if !valid_emoji_name(platform_name) {
            return Err(PlatformError::Rejected(format!("invalid emoji name {platform_name}")));
        }
        if image.is_empty() || image.len() > MAX_EMOJI_BYTES {
            return Err(PlatformError::Rejected(format!(
                "emoji image must be 1 to {MAX_EMOJI_BYTES} bytes, got {}",
                image.len()
            )));
        }
        if state.emojis.iter().any(|e| e.name == platform_name) {
            return Err(PlatformError::NameConflict(platform_name.to_string()));
        }
        if state.emojis.len() >= self.config.emoji_limit {
            return Err(PlatformError::CapacityReached);
        }

        let id = state.snowflake();
        state.emojis.push(Emoji {
            id: id.clone(),
            name: platform_name.to_string(),
            animated: is_animated,
        });
        state.emoji_creates += 1;
        debug!(name = %platform_name, id = %id, animated = is_animated, "Created emoji");
        Ok(SlotHandle {
            id,
            platform_name: platform_name.to_string(),
        })
    }

    async fn delete_slot(&self, handle: &SlotHandle) -> Result<(), PlatformError> {
        let mut state = self.state();
        if state.faults.emoji_delete {
            return Err(PlatformError::Network("connection reset".into()));
        }
        let before = state.emojis.len();
        state.emojis.retain(|e| e.id != handle.id);
        if state.emojis.len() == before {
            return Err(PlatformError::NotFound(handle.platform_name.clone()));
        }
        debug!(name = %handle.platform_name, id = %handle.id, "Deleted emoji");
        Ok(())
    }

    async fn enumerate_slots(&self) -> Result<Vec<EnumeratedSlot>, PlatformError> {
        let state = self.state();
        if let Some(fault) = state.faults.emoji_list.clone() {
            return Err(fault);
        }
        Ok(state
            .emojis
            .iter()
            .map(|e| EnumeratedSlot {
                platform_name: e.name.clone(),
                handle: SlotHandle {
                    id: e.id.clone(),
                    platform_name: e.name.clone(),
                },
                is_animated: e.animated,
            })
            .collect())
    }
}
