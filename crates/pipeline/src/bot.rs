//! The emote bot: startup, message dispatch and the transport loop.

use chrono::Utc;
use emoterelay_cache::{Catalog, PopulateReport, SlotCache};
use emoterelay_config::AppConfig;
use emoterelay_core::channel::{InboundMessage, RelayTransport};
use emoterelay_core::error::{ChannelError, RelayError};
use emoterelay_core::event::{DomainEvent, EventBus};
use emoterelay_core::naming::SlotNaming;
use emoterelay_core::platform::SlotPlatform;
use emoterelay_core::source::{CatalogFeed, SourceFetcher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

use crate::commands::{Command, CommandHandler};
use crate::rewrite::{ProcessOutcome, RelayIdentity, RewritePipeline};

/// What [`EmoteBot::handle`] did with a message.
#[derive(Debug)]
pub enum Handled {
    /// Startup has not finished
    NotReady,
    /// Sent by a bot (including this one)
    FromBot,
    /// Operator command; the replies that were sent
    Command(Vec<String>),
    /// Ordinary chat message
    Message(ProcessOutcome),
}

#[derive(Debug, Default)]
pub struct StartupReport {
    /// Catalog entries after the refresh, or `None` if the seed was kept
    pub catalog_entries: Option<usize>,
    pub populate: PopulateReport,
}

pub struct EmoteBot {
    cache: Arc<SlotCache>,
    pipeline: RewritePipeline,
    commands: CommandHandler,
    transport: Arc<dyn RelayTransport>,
    feed: Option<Arc<dyn CatalogFeed>>,
    prefix: String,
    events: Arc<EventBus>,
    ready: AtomicBool,
}

impl EmoteBot {
    /// Wire the cache, pipeline and command surface from configuration.
    ///
    /// Capacity is the smaller of the configured value and the platform's
    /// own limit.
    pub fn from_config(
        config: &AppConfig,
        platform: Arc<dyn SlotPlatform>,
        fetcher: Arc<dyn SourceFetcher>,
        transport: Arc<dyn RelayTransport>,
    ) -> Self {
        let events = Arc::new(EventBus::default());
        let capacity = config.cache.capacity.min(platform.capacity());
        let naming = SlotNaming::new(&config.bot.name, &config.bot.separator);
        let catalog = Arc::new(Catalog::new(config.catalog.seed.clone()));

        let cache = Arc::new(
            SlotCache::new(catalog, platform, fetcher, naming, capacity)
                .with_events(events.clone()),
        );
        let identity = RelayIdentity {
            tag: config.bot.relay_tag(),
            proxy_name: config.bot.proxy_name(),
        };
        let pipeline = RewritePipeline::new(cache.clone(), transport.clone(), identity)
            .with_events(events.clone());
        let commands = CommandHandler::new(
            cache.clone(),
            &config.bot.command_prefix,
            &config.bot.description,
        );

        Self {
            cache,
            pipeline,
            commands,
            transport,
            feed: None,
            prefix: config.bot.command_prefix.clone(),
            events,
            ready: AtomicBool::new(false),
        }
    }

    /// Remote catalog feed merged over the seed during [`start`](Self::start).
    pub fn with_feed(mut self, feed: Arc<dyn CatalogFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn cache(&self) -> &Arc<SlotCache> {
        &self.cache
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Refresh the catalog, adopt existing slots, then accept messages.
    ///
    /// A feed failure keeps the seed catalog. A failure to enumerate the
    /// platform is fatal and leaves the bot not ready.
    pub async fn start(&self) -> Result<StartupReport, emoterelay_core::Error> {
        let mut report = StartupReport::default();

        if let Some(feed) = &self.feed {
            match self.cache.catalog().refresh(feed.as_ref()).await {
                Ok(entries) => {
                    info!(source = feed.source(), entries, "Catalog refreshed");
                    report.catalog_entries = Some(entries);
                }
                Err(e) => {
                    warn!(source = feed.source(), error = %e, "Catalog refresh failed, using seed");
                    self.publish_error("catalog refresh", &e);
                }
            }
        }

        report.populate = self.cache.populate().await?;
        info!(
            adopted = report.populate.adopted.len(),
            discarded = report.populate.discarded.len(),
            capacity = self.cache.capacity(),
            "Slot cache populated"
        );

        self.ready.store(true, Ordering::Release);
        info!(transport = self.transport.name(), "Bot ready");
        Ok(report)
    }

    /// Dispatch one inbound message.
    pub async fn handle(&self, message: InboundMessage) -> Result<Handled, RelayError> {
        if !self.is_ready() {
            debug!(message = %message.location.message_id, "Not ready, dropping message");
            return Ok(Handled::NotReady);
        }
        if message.author.is_bot {
            return Ok(Handled::FromBot);
        }

        if let Some(command) = Command::parse(&message.content, &self.prefix) {
            debug!(command = ?command, author = %message.author.id, "Running command");
            let replies = self.commands.execute(command).await;
            for reply in &replies {
                if let Err(e) = self.transport.reply(message.channel_id(), reply).await {
                    warn!(channel = %message.channel_id(), error = %e, "Failed to send reply");
                }
            }
            return Ok(Handled::Command(replies));
        }

        match self.pipeline.process(&message).await {
            Ok(outcome) => {
                if let ProcessOutcome::Relayed(report) = &outcome {
                    if let Some(partial) = report.partial_failure() {
                        warn!(channel = %message.channel_id(), error = %partial, "Relay cleanup incomplete");
                    }
                }
                Ok(Handled::Message(outcome))
            }
            Err(e) => {
                error!(channel = %message.channel_id(), error = %e, "Relay failed, original left in place");
                self.publish_error("relay", &e);
                Err(e)
            }
        }
    }

    /// Start up, then handle messages from the transport until it closes.
    ///
    /// Each message is handled on its own task.
    pub async fn run(self: Arc<Self>) -> Result<(), emoterelay_core::Error> {
        self.start().await?;
        let mut inbound = self.transport.start().await?;
        info!(transport = self.transport.name(), "Listening for messages");

        while let Some(item) = inbound.recv().await {
            match item {
                Ok(message) => {
                    let bot = self.clone();
                    tokio::spawn(async move {
                        // Failures are logged inside `handle`.
                        let _ = bot.handle(message).await;
                    });
                }
                Err(ChannelError::ConnectionLost(reason)) => {
                    warn!(reason = %reason, "Transport connection lost");
                }
                Err(e) => warn!(error = %e, "Transport error"),
            }
        }

        info!(transport = self.transport.name(), "Transport closed");
        self.transport.stop().await?;
        Ok(())
    }

    fn publish_error(&self, context: &str, error: &dyn std::fmt::Display) {
        self.events.publish(DomainEvent::ErrorOccurred {
            context: context.to_string(),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });
    }
}
