//! Image download over HTTP.

use async_trait::async_trait;
use emoterelay_config::FetchConfig;
use emoterelay_core::error::FetchError;
use emoterelay_core::source::{FetchedSource, SourceFetcher};
use std::time::Duration;
use tracing::debug;

/// Downloads source images with `reqwest`.
pub struct HttpSourceFetcher {
    client: reqwest::Client,
}

impl HttpSourceFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedSource, FetchError> {
        check_scheme(url)?;
        debug!(url = %url, "Fetching source image");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let bytes = response.bytes().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let source = FetchedSource::new(bytes.to_vec(), content_type);
        check_image(url, &source)?;
        debug!(url = %url, bytes = source.bytes.len(), content_type = %source.content_type, "Fetched source image");
        Ok(source)
    }
}

/// Only plain web URLs are fetched.
pub(crate) fn check_scheme(url: &str) -> Result<(), FetchError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(FetchError::Request {
            url: url.to_string(),
            reason: "unsupported URL scheme".into(),
        })
    }
}

fn check_image(url: &str, source: &FetchedSource) -> Result<(), FetchError> {
    if source.is_image() {
        Ok(())
    } else {
        Err(FetchError::NotAnImage {
            url: url.to_string(),
            content_type: source.content_type.clone(),
        })
    }
}
