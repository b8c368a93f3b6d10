//! Operator command surface.
//!
//! Messages starting with the command prefix are parsed into a [`Command`]
//! and answered with chat replies rather than being rewritten.

use emoterelay_cache::SlotCache;
use emoterelay_core::error::SlotError;
use std::sync::Arc;
use tracing::info;

/// Catalog name shown by `demo`.
pub const DEMO_EMOTE: &str = "PogChamp";

/// Animated image sent by `catjam`.
pub const CATJAM_URL: &str = "https://cdn.betterttv.net/emote/61fe27dd06fd6a9f5be371a2/1x.gif";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add or overwrite a slot from a URL (`add`, `overwrite`)
    Add { name: String, url: String },
    Remove { name: String },
    /// Remove every bot-owned slot (`clear`, `removeall`)
    Clear,
    Demo,
    Catjam,
    /// Send the catalog image for a name
    Emote { name: String },
    Help,
    /// Known command with missing arguments
    Usage(&'static str),
    Unknown(String),
}

/// Name, usage, description.
const COMMANDS: &[(&str, &str, &str)] = &[
    ("add", "add <name> <url>", "Add or overwrite existing emote, using a name and url."),
    ("catjam", "catjam", "Send catJAM as an embedded gif."),
    ("clear", "clear", "Remove all generated emojis."),
    ("demo", "demo", "Demo of sending emotes."),
    ("emote", "emote <name>", "Have the bot send an existing emote as an image."),
    ("help", "help", "Show this message."),
    ("remove", "remove <name>", "Remove an existing emote, using a name."),
];

impl Command {
    /// Parse a message. `None` when it does not start with `prefix`.
    pub fn parse(content: &str, prefix: &str) -> Option<Self> {
        let rest = content.trim_start().strip_prefix(prefix)?;
        let mut parts = rest.split_whitespace();
        let verb = parts.next().unwrap_or_default();

        let command = match verb {
            "add" | "overwrite" => match (parts.next(), parts.next()) {
                (Some(name), Some(url)) => Command::Add {
                    name: name.to_string(),
                    url: url.to_string(),
                },
                _ => Command::Usage("add <name> <url>"),
            },
            "remove" => match parts.next() {
                Some(name) => Command::Remove {
                    name: name.to_string(),
                },
                None => Command::Usage("remove <name>"),
            },
            "clear" | "removeall" => Command::Clear,
            "demo" => Command::Demo,
            "catjam" => Command::Catjam,
            "emote" => match parts.next() {
                Some(name) => Command::Emote {
                    name: name.to_string(),
                },
                None => Command::Usage("emote <name>"),
            },
            "help" => Command::Help,
            other => Command::Unknown(other.to_string()),
        };
        Some(command)
    }
}

/// Executes commands against the slot cache and renders the replies.
pub struct CommandHandler {
    cache: Arc<SlotCache>,
    prefix: String,
    description: String,
}

impl CommandHandler {
    pub fn new(cache: Arc<SlotCache>, prefix: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
            description: description.into(),
        }
    }

    /// Run a command, returning the replies to send in order.
    pub async fn execute(&self, command: Command) -> Vec<String> {
        match command {
            Command::Add { name, url } => self.add(&name, &url).await,
            Command::Remove { name } => match self.cache.remove(&name).await {
                Ok(_) => vec![format!("Emote {name} has been removed.")],
                Err(_) => vec![format!("Emote {name} has not been added yet.")],
            },
            Command::Clear => {
                let report = self.cache.clear().await;
                let mut replies = vec![format!(
                    "Cleared all emotes from {}.",
                    self.cache.naming().bot_name()
                )];
                if !report.failures.is_empty() {
                    replies.push(format!(
                        "{} emote(s) could not be deleted from the server and may need manual cleanup.",
                        report.failures.len()
                    ));
                }
                replies
            }
            Command::Demo => match self.cache.catalog().lookup(DEMO_EMOTE).await {
                Some(url) => vec![
                    format!("You should see the {DEMO_EMOTE} lizard."),
                    url,
                ],
                None => vec!["Emote unavailable.".to_string()],
            },
            Command::Catjam => vec![CATJAM_URL.to_string()],
            Command::Emote { name } => match self.cache.catalog().lookup(&name).await {
                Some(url) => vec![url],
                None => vec!["Emote unavailable.".to_string()],
            },
            Command::Help => vec![self.help()],
            Command::Usage(usage) => vec![format!("Usage: `{}{usage}`", self.prefix)],
            Command::Unknown(_) => vec![format!(
                "Command not found. Try using `{}help`",
                self.prefix
            )],
        }
    }

    async fn add(&self, name: &str, url: &str) -> Vec<String> {
        let existed = self.cache.is_resident(name);
        match self.cache.add(name, url).await {
            Ok(slot) => {
                info!(name = %name, "Emote added by command");
                let mut replies = Vec::new();
                if existed {
                    replies.push(format!("Deleted existing emoji {name}."));
                }
                replies.push(format!("Created emote {}", slot.reference()));
                replies
            }
            Err(SlotError::InvalidName(_)) => vec![format!("Invalid emote name: {name}")],
            Err(SlotError::SourceUnreachable { .. }) => vec![format!("Invalid url: {url}")],
            Err(e) => vec![format!("Could not create emote {name}: {e}")],
        }
    }

    fn help(&self) -> String {
        let mut text = format!("{}\n\nCommands:", self.description);
        for (_, usage, description) in COMMANDS {
            text.push_str(&format!("\n  {}{usage:<22} {description}", self.prefix));
        }
        text
    }
}
