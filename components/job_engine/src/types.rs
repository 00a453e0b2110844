// components/job_engine/src/types.rs
use audio_tags::{TagError, TrackTags};
use delivery_stream::DeliveryError;
use media_probe::ProbeError;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("metadata resolution failed: {0}")]
    Resolution(#[from] ProbeError),

    /// The extraction subprocess exited non-zero or produced no output
    /// file. Carries the captured stdio for diagnostics.
    #[error("extraction subprocess failed with status {status:?}")]
    Subprocess {
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("tagging failed: {0}")]
    Tagging(#[from] TagError),

    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("invalid item URL: {0}")]
    InvalidUrl(String),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker task aborted: {0}")]
    Aborted(String),
}

/// Where a job's cover image comes from.
#[derive(Debug, Clone, Default)]
pub enum CoverSource {
    /// Resolve a thumbnail from item metadata, best-effort.
    #[default]
    None,
    /// Fetch this URL.
    Remote(String),
    /// An already-materialized image file, e.g. a client upload. Owned by
    /// the job: removed with its other files at the terminal state.
    Upload(PathBuf),
    /// A cover borrowed from an enclosing batch; the batch owns its
    /// lifetime, the job only reads it.
    Shared(PathBuf),
}

/// What the caller asks for. Explicit fields always win over resolved
/// metadata; `None` means "resolve it".
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub url: Url,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub cover: CoverSource,
}

impl JobRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            title: None,
            artist: None,
            album: None,
            cover: CoverSource::None,
        }
    }
}

/// A completed job. Ownership of `path` passes to whoever delivers it.
#[derive(Debug)]
pub struct FinishedJob {
    pub id: Uuid,
    pub path: PathBuf,
    pub tags: TrackTags,
}
