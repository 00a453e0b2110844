// components/job_engine/src/batch.rs
use crate::engine::JobEngine;
use crate::types::{CoverSource, FinishedJob, JobError, JobRequest};
use delivery_stream::DeliveryChannel;
use media_probe::MetadataSource;
use progress_feed::{Phase, ProgressEvent};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use temp_store::TempStore;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Shared per-batch overrides. Per-item resolved metadata is used only
/// where an override is absent.
#[derive(Debug, Clone, Default)]
pub struct BatchOverrides {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub cover: CoverSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub archived: usize,
    pub failed: usize,
}

/// Runs one playlist item. The seam exists so the coordinator can be
/// exercised without spawning real subprocesses.
#[async_trait::async_trait]
pub trait ItemRunner: Send + Sync {
    async fn run_item(
        &self,
        request: JobRequest,
        channel: &DeliveryChannel,
    ) -> Result<FinishedJob, JobError>;
}

#[async_trait::async_trait]
impl ItemRunner for JobEngine {
    async fn run_item(
        &self,
        request: JobRequest,
        channel: &DeliveryChannel,
    ) -> Result<FinishedJob, JobError> {
        self.run_job(Uuid::new_v4(), request, channel).await
    }
}

/// Sequences jobs for a playlist and folds each success into a growing zip
/// archive. Items run strictly in order; one failing item is reported and
/// skipped, never aborting its siblings.
pub struct BatchCoordinator<R> {
    store: TempStore,
    source: Arc<dyn MetadataSource>,
    runner: R,
}

impl BatchCoordinator<JobEngine> {
    pub fn from_engine(engine: JobEngine) -> Self {
        Self {
            store: engine.store().clone(),
            source: Arc::clone(engine.source()),
            runner: engine,
        }
    }
}

impl<R: ItemRunner> BatchCoordinator<R> {
    pub fn new(store: TempStore, source: Arc<dyn MetadataSource>, runner: R) -> Self {
        Self {
            store,
            source,
            runner,
        }
    }

    pub async fn run_batch(
        &self,
        batch_id: Uuid,
        url: &Url,
        overrides: BatchOverrides,
        channel: &DeliveryChannel,
    ) -> Result<BatchSummary, JobError> {
        let mut touched: Vec<PathBuf> = Vec::new();

        let result = self
            .run_inner(batch_id, url, overrides, channel, &mut touched)
            .await;

        // Idempotent on the success path, the actual cleanup on failure.
        for path in &touched {
            self.store.delete(path).await;
        }
        result
    }

    async fn run_inner(
        &self,
        batch_id: Uuid,
        url: &Url,
        overrides: BatchOverrides,
        channel: &DeliveryChannel,
        touched: &mut Vec<PathBuf>,
    ) -> Result<BatchSummary, JobError> {
        let entries = self.source.probe_playlist(url).await?;
        info!(%batch_id, url = %url, items = entries.len(), "batch started");
        channel
            .emit(
                ProgressEvent::new(batch_id, Phase::Downloading, 0.0)
                    .with_message(format!("playlist: {} items", entries.len())),
            )
            .await?;

        let shared_cover = match &overrides.cover {
            CoverSource::Remote(cover_url) => {
                let fetched = cover_art::fetch_cover(cover_url, &self.store, batch_id).await;
                touched.extend(fetched.clone());
                fetched
            }
            CoverSource::Upload(path) | CoverSource::Shared(path) => {
                touched.push(path.clone());
                Some(path.clone())
            }
            CoverSource::None => None,
        };

        let archive_path = self.store.reserve_for(batch_id, "zip");
        touched.push(archive_path.clone());
        let mut writer = ZipWriter::new(std::fs::File::create(&archive_path)?);

        let mut used_names = HashSet::new();
        let mut archived = 0usize;
        let mut failed = 0usize;

        for (index, entry) in entries.iter().enumerate() {
            let item_url = match Url::parse(&entry.url) {
                Ok(parsed) => parsed,
                Err(e) => {
                    failed += 1;
                    warn!(%batch_id, url = %entry.url, error = %e, "unparseable item url");
                    self.emit_item_error(batch_id, index, &entry.title, channel)
                        .await?;
                    continue;
                }
            };

            let request = JobRequest {
                url: item_url,
                title: Some(entry.title.clone()),
                artist: overrides.artist.clone(),
                album: overrides.album.clone(),
                cover: match (&shared_cover, &entry.thumbnail) {
                    (Some(path), _) => CoverSource::Shared(path.clone()),
                    (None, Some(thumb)) => CoverSource::Remote(thumb.clone()),
                    (None, None) => CoverSource::None,
                },
            };

            match self.runner.run_item(request, channel).await {
                Ok(finished) => {
                    touched.push(finished.path.clone());
                    let name = unique_entry_name(&mut used_names, &finished.tags.title);
                    writer = append_to_archive(writer, finished.path.clone(), name).await?;
                    archived += 1;
                }
                Err(e) => {
                    failed += 1;
                    warn!(%batch_id, item = index + 1, error = %e, "item failed, continuing batch");
                    self.emit_item_error(batch_id, index, &entry.title, channel)
                        .await?;
                }
            }
        }

        tokio::task::spawn_blocking(move || writer.finish())
            .await
            .map_err(|e| JobError::Aborted(e.to_string()))??;

        channel
            .stream_file(batch_id, &archive_path, &self.store)
            .await?;

        info!(%batch_id, archived, failed, "batch finished");
        Ok(BatchSummary {
            total: entries.len(),
            archived,
            failed,
        })
    }

    async fn emit_item_error(
        &self,
        batch_id: Uuid,
        index: usize,
        title: &str,
        channel: &DeliveryChannel,
    ) -> Result<(), JobError> {
        channel
            .emit(
                ProgressEvent::new(batch_id, Phase::Error, 0.0)
                    .with_message(format!("item {} failed: {title}", index + 1)),
            )
            .await?;
        Ok(())
    }
}

/// Archive entry name: sanitized title plus extension, deduplicated within
/// the batch.
fn unique_entry_name(used: &mut HashSet<String>, title: &str) -> String {
    let base = {
        let sanitized = sanitize_filename::sanitize(title);
        if sanitized.is_empty() {
            "track".to_string()
        } else {
            sanitized
        }
    };

    let mut candidate = format!("{base}.mp3");
    let mut counter = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{base} ({counter}).mp3");
        counter += 1;
    }
    candidate
}

/// zip is synchronous; each append moves the writer through a blocking
/// task and back.
async fn append_to_archive(
    mut writer: ZipWriter<std::fs::File>,
    artifact: PathBuf,
    name: String,
) -> Result<ZipWriter<std::fs::File>, JobError> {
    tokio::task::spawn_blocking(move || -> Result<ZipWriter<std::fs::File>, JobError> {
        writer.start_file(name, SimpleFileOptions::default())?;
        let mut source = std::fs::File::open(&artifact)?;
        std::io::copy(&mut source, &mut writer)?;
        Ok(writer)
    })
    .await
    .map_err(|e| JobError::Aborted(e.to_string()))?
}
