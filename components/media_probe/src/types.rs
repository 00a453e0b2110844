// components/media_probe/src/types.rs
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("required tool not found: {0}")]
    ToolMissing(&'static str),

    #[error("metadata lookup failed for {url}: {stderr}")]
    Subprocess { url: String, stderr: String },

    #[error("metadata lookup timed out for {url}")]
    Timeout { url: String },

    #[error("unparseable metadata for {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Normalized metadata for one item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    /// Empty string when the source has no album concept for this item.
    pub album: String,
    pub thumbnail: Option<String>,
    pub canonical_url: String,
    /// Duration in seconds when the source reports one.
    pub duration: Option<f64>,
}

/// One entry of an enumerated playlist. Full metadata is resolved lazily
/// per job, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub url: String,
    pub title: String,
    pub thumbnail: Option<String>,
}

/// Source of item metadata and playlist listings.
#[async_trait::async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch normalized metadata for a single item. `scratch` is a directory
    /// the probe may create working files under; the implementation removes
    /// anything it materialized before returning.
    async fn probe_track(&self, url: &Url, scratch: &Path) -> Result<TrackInfo, ProbeError>;

    /// Enumerate a playlist's items in order.
    async fn probe_playlist(&self, url: &Url) -> Result<Vec<PlaylistEntry>, ProbeError>;
}
