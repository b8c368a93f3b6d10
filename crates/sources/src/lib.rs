//! HTTP collaborators for emoterelay.
//!
//! - **Fetcher** — downloads emote images for slot provisioning
//! - **Feed** — loads the remote catalog augmentation

pub mod feed;
pub mod fetcher;

pub use feed::HttpCatalogFeed;
pub use fetcher::HttpSourceFetcher;
