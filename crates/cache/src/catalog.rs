//! Emote catalog — the name → source URL directory slots are provisioned from.
//!
//! The mapping is an immutable snapshot behind an `Arc`. Every change
//! (feed refresh, operator add) builds a complete new snapshot and swaps it
//! in one step, so readers never observe a half-applied update.

use emoterelay_core::error::CatalogError;
use emoterelay_core::source::CatalogFeed;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub struct Catalog {
    seed: HashMap<String, String>,
    entries: RwLock<Arc<HashMap<String, String>>>,
}

impl Catalog {
    /// Create a catalog holding only the bundled seed entries.
    pub fn new(seed: HashMap<String, String>) -> Self {
        let entries = Arc::new(seed.clone());
        Self {
            seed,
            entries: RwLock::new(entries),
        }
    }

    /// Source URL for a name, if the catalog knows it.
    pub async fn lookup(&self, name: &str) -> Option<String> {
        self.entries.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// The current snapshot.
    pub async fn snapshot(&self) -> Arc<HashMap<String, String>> {
        self.entries.read().await.clone()
    }

    /// Sorted list of known names.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Replace the mapping with `seed ∪ feed` (feed wins on collisions).
    ///
    /// All-or-nothing: on any feed error the prior mapping stays in place.
    /// Returns the number of entries in the new mapping.
    pub async fn refresh(&self, feed: &dyn CatalogFeed) -> Result<usize, CatalogError> {
        let remote = feed.load().await.inspect_err(|e| {
            warn!(source = %feed.source(), error = %e, "Catalog refresh failed, keeping prior catalog");
        })?;

        validate_feed(&remote).inspect_err(|e| {
            warn!(source = %feed.source(), error = %e, "Catalog refresh failed, keeping prior catalog");
        })?;

        let mut merged = self.seed.clone();
        let remote_len = remote.len();
        merged.extend(remote);
        let total = merged.len();

        *self.entries.write().await = Arc::new(merged);
        info!(source = %feed.source(), remote = remote_len, total, "Catalog refreshed");
        Ok(total)
    }

    /// Publish a single operator-supplied entry as a new snapshot.
    pub async fn publish(&self, name: &str, url: &str) {
        let mut entries = self.entries.write().await;
        let mut next = HashMap::clone(&entries);
        next.insert(name.to_string(), url.to_string());
        *entries = Arc::new(next);
    }
}

fn validate_feed(feed: &HashMap<String, String>) -> Result<(), CatalogError> {
    if feed.is_empty() {
        return Err(CatalogError::FeedMalformed("feed contains no emotes".into()));
    }

    for (name, url) in feed {
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(CatalogError::FeedMalformed(format!(
                "invalid emote name '{name}'"
            )));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(CatalogError::FeedMalformed(format!(
                "emote '{name}' has non-http url '{url}'"
            )));
        }
    }

    Ok(())
}
