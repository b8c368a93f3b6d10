//! Remote catalog feed.
//!
//! The feed is a JSON document of the form
//! `{"emotes": {"PogChamp": "https://...", ...}}`. Extra top-level keys are
//! ignored.

use async_trait::async_trait;
use emoterelay_core::error::CatalogError;
use emoterelay_core::source::CatalogFeed;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct FeedDocument {
    emotes: HashMap<String, String>,
}

/// Parse a feed body. Any structural problem fails the whole feed.
pub fn parse_feed(body: &str) -> Result<HashMap<String, String>, CatalogError> {
    let document: FeedDocument =
        serde_json::from_str(body).map_err(|e| CatalogError::FeedMalformed(e.to_string()))?;
    Ok(document.emotes)
}

/// Loads the catalog augmentation from an HTTP endpoint.
pub struct HttpCatalogFeed {
    url: String,
    client: reqwest::Client,
}

impl HttpCatalogFeed {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl CatalogFeed for HttpCatalogFeed {
    fn source(&self) -> &str {
        &self.url
    }

    async fn load(&self) -> Result<HashMap<String, String>, CatalogError> {
        debug!(url = %self.url, "Loading catalog feed");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CatalogError::FeedUnavailable(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(CatalogError::FeedUnavailable(format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CatalogError::FeedUnavailable(e.to_string()))?;
        let emotes = parse_feed(&body)?;
        debug!(url = %self.url, entries = emotes.len(), "Catalog feed loaded");
        Ok(emotes)
    }
}
