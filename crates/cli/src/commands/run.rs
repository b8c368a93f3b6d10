//! `emoterelay run` — Start the bot.
//!
//! The Discord adapter runs as an in-process guild; each line typed on
//! stdin is posted to a `console` channel as the local user, and new
//! channel messages are printed after the bot has handled it.

use emoterelay_channels::{DiscordConfig, DiscordGuild};
use emoterelay_config::AppConfig;
use emoterelay_core::channel::{Author, RelayTransport};
use emoterelay_pipeline::{EmoteBot, Handled};
use emoterelay_sources::{HttpCatalogFeed, HttpSourceFetcher};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

const CONSOLE_CHANNEL: &str = "console";

/// Wire a bot to a guild using the real HTTP fetcher and feed.
pub fn build(
    config: &AppConfig,
    guild: Arc<DiscordGuild>,
) -> Result<EmoteBot, Box<dyn std::error::Error>> {
    let fetcher = Arc::new(HttpSourceFetcher::new(&config.fetch)?);
    let mut bot = EmoteBot::from_config(config, guild.clone(), fetcher, guild);
    if let Some(url) = &config.catalog.feed_url {
        bot = bot.with_feed(Arc::new(HttpCatalogFeed::new(
            url,
            config.catalog.feed_timeout_secs,
        )?));
    }
    Ok(bot)
}

pub async fn run(capacity: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(capacity) = capacity {
        if capacity == 0 {
            return Err("--capacity must be at least 1".into());
        }
        config.cache.capacity = capacity;
    }
    if !config.has_discord_token() {
        warn!("No Discord token configured; running against the local guild only");
    }

    let guild = Arc::new(DiscordGuild::new(DiscordConfig::from_settings(&config.discord)));
    let bot = build(&config, guild.clone())?;
    let startup = bot.start().await?;

    println!("emoterelay — {}", config.bot.name);
    println!("   Guild:     {}", guild.config().guild_id);
    println!("   Capacity:  {}", bot.cache().capacity());
    println!("   Catalog:   {} emotes", bot.cache().catalog().len().await);
    println!("   Adopted:   {} existing slots", startup.populate.adopted.len());
    println!(
        "\nType messages (e.g. `gg :Kappa:` or `{}help`). Ctrl-D to exit.\n",
        config.bot.command_prefix
    );

    let mut inbound = guild.start().await?;
    let mut seen = HashSet::new();
    let me = Author {
        id: "console".into(),
        display_name: whoami(),
        avatar_url: None,
        is_bot: false,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let posted = guild.post(CONSOLE_CHANNEL, me.clone(), &line).await?;
        seen.insert(posted.message_id);
        let Some(Ok(message)) = inbound.recv().await else {
            break;
        };

        match bot.handle(message).await {
            Ok(Handled::Message(_)) | Ok(Handled::Command(_)) => {}
            Ok(other) => warn!(outcome = ?other, "Message not handled"),
            Err(e) => println!("   ❌ {e}"),
        }

        for message in guild.messages(CONSOLE_CHANNEL) {
            if seen.insert(message.reference.message_id.clone()) {
                println!("[{}] {}", message.author_name, message.content);
            }
        }
    }

    guild.stop().await?;
    Ok(())
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "you".into())
}
