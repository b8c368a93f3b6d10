//! Message rewrite pipeline for emoterelay.
//!
//! Turns `:Name:` tokens in chat messages into custom-emoji references,
//! provisioning slots on demand, and relays the rewritten message under the
//! author's identity. Also hosts the operator command surface and the bot
//! that ties both to a chat transport.

pub mod bot;
pub mod commands;
pub mod rewrite;
pub mod token;

#[cfg(test)]
mod testing;

pub use bot::{EmoteBot, Handled, StartupReport};
pub use commands::{Command, CommandHandler};
pub use rewrite::{ProcessOutcome, RelayIdentity, RelayReport, RewritePipeline};
