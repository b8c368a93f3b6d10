//! Chat platform adapters for emoterelay.
//!
//! Each adapter connects to a chat platform and serves both seams the bot
//! needs: the message transport and the slot-hosting platform.
//!
//! Available adapters:
//! - **Discord** — one Discord guild (stub, needs serenity in production)

pub mod discord;

pub use discord::{DiscordConfig, DiscordGuild, Emoji, Faults, PostedMessage};
