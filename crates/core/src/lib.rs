//! # emoterelay Core
//!
//! Domain types, collaborator traits, and error definitions for the emoterelay
//! slot cache and message rewrite pipeline.
//! This crate has **zero framework dependencies** — it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (chat transport, slot platform, source fetcher,
//! catalog feed) is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping the chat platform without touching the cache
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod channel;
pub mod error;
pub mod event;
pub mod naming;
pub mod platform;
pub mod slot;
pub mod source;

// Re-export key types at crate root for ergonomics
pub use channel::{Author, ChannelId, InboundMessage, MessageRef, ProxyHandle, RelayTransport};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use naming::SlotNaming;
pub use platform::{EnumeratedSlot, SlotPlatform};
pub use slot::{Slot, SlotHandle};
pub use source::{CatalogFeed, FetchedSource, SourceFetcher};
