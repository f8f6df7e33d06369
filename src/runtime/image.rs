//! Lazily resolved default node image
//!
//! The default k3s image follows the latest release of a channel on the k3s
//! update server. It is looked up on first use and cached for the life of the
//! process; a failed lookup is returned to the caller and retried next time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::spec::K3S_IMAGE_REPO;

/// Release channel server of k3s
pub const DEFAULT_CHANNEL_URL: &str = "https://update.k3s.io/v1-release/channels";

/// Channel the default image follows
pub const DEFAULT_CHANNEL: &str = "stable";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("Failed to query {url}: {reason}")]
    Request { url: String, reason: String },

    #[error("Release channel '{0}' not found")]
    UnknownChannel(String),

    #[error("Invalid channel listing: {0}")]
    Parse(String),

    #[error("No version source configured")]
    NoSource,
}

/// Where the latest k3s version of a channel comes from
#[async_trait]
pub trait VersionSource: Send + Sync {
    async fn latest(&self, channel: &str) -> Result<String, ImageError>;
}

#[derive(Debug, Deserialize)]
struct ChannelList {
    data: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    latest: String,
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Image reference of a k3s version. Docker tags cannot contain '+'.
pub fn image_for_version(version: &str) -> String {
    format!("{}:{}", K3S_IMAGE_REPO, version.replace('+', "-"))
}

/// Latest version of `channel` in a channel server response
pub fn parse_channels(body: &str, channel: &str) -> Result<String, ImageError> {
    let list: ChannelList =
        serde_json::from_str(body).map_err(|e| ImageError::Parse(e.to_string()))?;
    list.data
        .into_iter()
        .find(|c| c.id == channel)
        .map(|c| c.latest)
        .ok_or_else(|| ImageError::UnknownChannel(channel.to_string()))
}

// ============================================================================
// I/O boundary
// ============================================================================

/// The k3s release channel server
#[derive(Debug, Clone)]
pub struct ChannelServer {
    client: reqwest::Client,
    url: String,
}

impl ChannelServer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl Default for ChannelServer {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_URL)
    }
}

#[async_trait]
impl VersionSource for ChannelServer {
    async fn latest(&self, channel: &str) -> Result<String, ImageError> {
        let request_error = |reason: String| ImageError::Request {
            url: self.url.clone(),
            reason,
        };

        debug!(url = %self.url, channel, "Looking up k3s version");
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .timeout(LOOKUP_TIMEOUT)
            .send()
            .await
            .map_err(|e| request_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(request_error(format!("HTTP {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| request_error(e.to_string()))?;
        parse_channels(&body, channel)
    }
}

/// Default node image, resolved once per process
pub struct DefaultImage {
    source: Option<Arc<dyn VersionSource>>,
    channel: String,
    image: OnceCell<String>,
}

impl DefaultImage {
    pub fn new(source: Arc<dyn VersionSource>, channel: impl Into<String>) -> Self {
        Self {
            source: Some(source),
            channel: channel.into(),
            image: OnceCell::new(),
        }
    }

    /// A default that never needs a lookup
    pub fn fixed(image: impl Into<String>) -> Self {
        Self {
            source: None,
            channel: DEFAULT_CHANNEL.to_string(),
            image: OnceCell::new_with(Some(image.into())),
        }
    }

    pub async fn get(&self) -> Result<String, ImageError> {
        self.image
            .get_or_try_init(|| async {
                let source = self.source.as_ref().ok_or(ImageError::NoSource)?;
                let version = source.latest(&self.channel).await?;
                let image = image_for_version(&version);
                info!(%image, channel = %self.channel, "Resolved default k3s image");
                Ok(image)
            })
            .await
            .cloned()
    }
}
