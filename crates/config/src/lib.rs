//! Configuration loading, validation, and management for emoterelay.
//!
//! Loads configuration from `~/.emoterelay/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.emoterelay/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Bot identity and command surface
    #[serde(default)]
    pub bot: BotConfig,

    /// Slot cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Emote catalog configuration
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Source image retrieval
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Discord connection settings
    #[serde(default)]
    pub discord: DiscordSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot name, also the prefix of every slot the bot owns
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Separator between the bot name and a logical emote name
    #[serde(default = "default_separator")]
    pub separator: String,

    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    #[serde(default = "default_description")]
    pub description: String,

    /// Suffix appended to relayed display names (defaults to ` // <name>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_tag: Option<String>,

    /// Name of the transient identity proxy (defaults to `<name><separator>hook`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_name: Option<String>,
}

fn default_bot_name() -> String {
    "iwashiding".into()
}
fn default_separator() -> String {
    "__".into()
}
fn default_command_prefix() -> String {
    "!".into()
}
fn default_description() -> String {
    "Replaces :emote: tokens with custom emojis and reposts the message as you.".into()
}

impl BotConfig {
    pub fn relay_tag(&self) -> String {
        self.relay_tag
            .clone()
            .unwrap_or_else(|| format!(" // {}", self.name))
    }

    pub fn proxy_name(&self) -> String {
        self.proxy_name
            .clone()
            .unwrap_or_else(|| format!("{}{}hook", self.name, self.separator))
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            separator: default_separator(),
            command_prefix: default_command_prefix(),
            description: default_description(),
            relay_tag: None,
            proxy_name: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum resident slots (the guild's custom emoji limit)
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    50
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Bundled name → URL entries, always available
    #[serde(default = "default_seed")]
    pub seed: HashMap<String, String>,

    /// Remote JSON feed (`{"emotes": {...}}`) merged over the seed at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,

    #[serde(default = "default_feed_timeout")]
    pub feed_timeout_secs: u64,
}

fn default_seed() -> HashMap<String, String> {
    [
        (
            "PogChamp",
            "https://static-cdn.jtvnw.net/emoticons/v2/305954156/default/dark/1.0",
        ),
        (
            "Kappa",
            "https://static-cdn.jtvnw.net/emoticons/v2/25/default/dark/1.0",
        ),
        (
            "catJAM",
            "https://cdn.betterttv.net/emote/5f1b0186cf6d2144653d2970/1x.gif",
        ),
    ]
    .into_iter()
    .map(|(name, url)| (name.to_string(), url.to_string()))
    .collect()
}
fn default_feed_timeout() -> u64 {
    15
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            feed_url: None,
            feed_timeout_secs: default_feed_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_fetch_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("emoterelay/", env!("CARGO_PKG_VERSION")).into()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct DiscordSettings {
    /// Bot token from the Discord Developer Portal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Guild IDs the bot manages slots in. Empty = all guilds.
    #[serde(default)]
    pub allowed_guilds: Vec<String>,
}

impl std::fmt::Debug for DiscordSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordSettings")
            .field("bot_token", &redact(&self.bot_token))
            .field("allowed_guilds", &self.allowed_guilds)
            .finish()
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.emoterelay/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `EMOTERELAY_DISCORD_TOKEN`, then `DISCORD_TOKEN`
    /// - `EMOTERELAY_FEED_URL`
    /// - `EMOTERELAY_CAPACITY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(token) = var("EMOTERELAY_DISCORD_TOKEN").or_else(|| var("DISCORD_TOKEN")) {
            self.discord.bot_token = Some(token);
        }

        if let Some(url) = var("EMOTERELAY_FEED_URL") {
            self.catalog.feed_url = Some(url);
        }

        if let Some(capacity) = var("EMOTERELAY_CAPACITY") {
            self.cache.capacity = capacity.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "EMOTERELAY_CAPACITY must be a positive integer, got '{capacity}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".emoterelay")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "cache.capacity must be at least 1".into(),
            ));
        }

        if self.bot.name.trim().is_empty() {
            return Err(ConfigError::ValidationError("bot.name must not be empty".into()));
        }

        if self.bot.separator.is_empty() {
            return Err(ConfigError::ValidationError(
                "bot.separator must not be empty".into(),
            ));
        }

        if self.bot.command_prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "bot.command_prefix must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Check if a Discord token is available (from config or environment).
    pub fn has_discord_token(&self) -> bool {
        self.discord
            .bot_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
