//! Source retrieval collaborators.
//!
//! `SourceFetcher` downloads the image behind a catalog URL; `CatalogFeed`
//! supplies the remote name→URL augmentation used by catalog refresh.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{CatalogError, FetchError};
use crate::slot::is_animated_content_type;

/// Raw image content plus the content type the server reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSource {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl FetchedSource {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    /// Whether the content type is `image/*`.
    pub fn is_image(&self) -> bool {
        self.content_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("image")
    }

    pub fn is_animated(&self) -> bool {
        is_animated_content_type(&self.content_type)
    }
}

/// Downloads source content for a URL.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedSource, FetchError>;
}

/// Supplies the remote catalog augmentation.
#[async_trait]
pub trait CatalogFeed: Send + Sync {
    /// Where the feed comes from (for logs).
    fn source(&self) -> &str;

    /// Load the complete feed. Must fail rather than return a partial mapping.
    async fn load(&self) -> std::result::Result<HashMap<String, String>, CatalogError>;
}
