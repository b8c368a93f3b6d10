//! Shared mock collaborators for pipeline tests.

use async_trait::async_trait;
use emoterelay_core::channel::{Author, ChannelId, InboundMessage, MessageRef, ProxyHandle, RelayTransport};
use emoterelay_core::error::{ChannelError, FetchError, PlatformError};
use emoterelay_core::platform::{EnumeratedSlot, SlotPlatform};
use emoterelay_core::slot::SlotHandle;
use emoterelay_core::source::{FetchedSource, SourceFetcher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

pub fn message(content: &str) -> InboundMessage {
    InboundMessage::new(
        MessageRef {
            channel_id: ChannelId("general".into()),
            message_id: "m1".into(),
        },
        Author {
            id: "u1".into(),
            display_name: "Alice".into(),
            avatar_url: Some("https://cdn/alice.png".into()),
            is_bot: false,
        },
        content,
    )
}

/// `.gif` → animated, `down` → unreachable, everything else a png.
pub struct MockFetcher;

#[async_trait]
impl SourceFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedSource, FetchError> {
        if url.contains("down") {
            return Err(FetchError::Request {
                url: url.into(),
                reason: "connection refused".into(),
            });
        }
        let content_type = if url.ends_with(".gif") { "image/gif" } else { "image/png" };
        Ok(FetchedSource::new(vec![1, 2, 3], content_type))
    }
}

#[derive(Default)]
pub struct MockPlatform {
    pub creates: AtomicUsize,
    pub deletes: Mutex<Vec<String>>,
    pub reject_all: bool,
}

impl MockPlatform {
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SlotPlatform for MockPlatform {
    fn name(&self) -> &str {
        "mock"
    }

    fn capacity(&self) -> usize {
        50
    }

    async fn create_slot(
        &self,
        platform_name: &str,
        _image: &[u8],
        _is_animated: bool,
    ) -> Result<SlotHandle, PlatformError> {
        let id = self.creates.fetch_add(1, Ordering::SeqCst);
        if self.reject_all {
            return Err(PlatformError::Rejected("invalid image".into()));
        }
        Ok(SlotHandle {
            id: id.to_string(),
            platform_name: platform_name.to_string(),
        })
    }

    async fn delete_slot(&self, handle: &SlotHandle) -> Result<(), PlatformError> {
        self.deletes.lock().unwrap().push(handle.platform_name.clone());
        Ok(())
    }

    async fn enumerate_slots(&self) -> Result<Vec<EnumeratedSlot>, PlatformError> {
        Ok(vec![])
    }
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub content: String,
}

#[derive(Default)]
pub struct MockTransport {
    pub fail_proxy: bool,
    pub fail_send: bool,
    pub fail_deletes: bool,
    pub next_id: AtomicUsize,
    pub sent: Mutex<Vec<SentMessage>>,
    pub replies: Mutex<Vec<String>>,
    pub deleted_messages: Mutex<Vec<String>>,
    pub deleted_proxies: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<String> {
        self.replies.lock().unwrap().clone()
    }

    pub fn deleted_messages(&self) -> Vec<String> {
        self.deleted_messages.lock().unwrap().clone()
    }

    pub fn deleted_proxies(&self) -> Vec<String> {
        self.deleted_proxies.lock().unwrap().clone()
    }

    fn next_id(&self) -> String {
        format!("id{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl RelayTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<InboundMessage, ChannelError>>, ChannelError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn reply(&self, channel_id: &ChannelId, content: &str) -> Result<MessageRef, ChannelError> {
        self.replies.lock().unwrap().push(content.to_string());
        Ok(MessageRef {
            channel_id: channel_id.clone(),
            message_id: self.next_id(),
        })
    }

    async fn create_identity_proxy(
        &self,
        channel_id: &ChannelId,
        _name: &str,
    ) -> Result<ProxyHandle, ChannelError> {
        if self.fail_proxy {
            return Err(ChannelError::MissingPermission("MANAGE_WEBHOOKS".into()));
        }
        Ok(ProxyHandle {
            id: self.next_id(),
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
        if self.fail_send {
            return Err(ChannelError::DeliveryFailed {
                channel: proxy.channel_id.to_string(),
                reason: "rate limited".into(),
            });
        }
        self.sent.lock().unwrap().push(SentMessage {
            display_name: display_name.to_string(),
            avatar_url: avatar_url.map(str::to_string),
            content: content.to_string(),
        });
        Ok(MessageRef {
            channel_id: proxy.channel_id.clone(),
            message_id: self.next_id(),
        })
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), ChannelError> {
        if self.fail_deletes {
            return Err(ChannelError::MessageNotFound(message.message_id.clone()));
        }
        self.deleted_messages
            .lock()
            .unwrap()
            .push(message.message_id.clone());
        Ok(())
    }

    async fn delete_identity_proxy(&self, proxy: &ProxyHandle) -> Result<(), ChannelError> {
        if self.fail_deletes {
            return Err(ChannelError::MissingPermission("MANAGE_WEBHOOKS".into()));
        }
        self.deleted_proxies.lock().unwrap().push(proxy.id.clone());
        Ok(())
    }
}
