// components/job_engine/src/engine.rs
use crate::types::{CoverSource, FinishedJob, JobError, JobRequest};
use audio_tags::TrackTags;
use delivery_stream::DeliveryChannel;
use media_probe::{MetadataSource, ToolPaths, TrackInfo};
use progress_feed::{Phase, ProgressEvent, ProgressTracker};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use temp_store::TempStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Runs one item's full pipeline:
/// resolve → cover → extraction subprocess → tag → hand off.
///
/// Every path the job touches is recorded, and on any failure all of them
/// are removed before the error surfaces. On success only the finished
/// artifact survives; its ownership passes to the caller.
#[derive(Clone)]
pub struct JobEngine {
    store: TempStore,
    tools: ToolPaths,
    source: Arc<dyn MetadataSource>,
}

impl JobEngine {
    pub fn new(
        store: TempStore,
        tools: ToolPaths,
        source: Arc<dyn MetadataSource>,
    ) -> Self {
        Self {
            store,
            tools,
            source,
        }
    }

    pub fn store(&self) -> &TempStore {
        &self.store
    }

    pub fn source(&self) -> &Arc<dyn MetadataSource> {
        &self.source
    }

    /// Execute one job under the caller-supplied id. The id namespaces
    /// every temp file and stamps every progress event, so the caller can
    /// correlate the terminal outcome with the event stream.
    pub async fn run_job(
        &self,
        id: Uuid,
        request: JobRequest,
        channel: &DeliveryChannel,
    ) -> Result<FinishedJob, JobError> {
        let started = chrono::Utc::now();
        info!(%id, url = %request.url, "job started");

        let mut touched: Vec<PathBuf> = Vec::new();
        let result = self.run_pipeline(id, request, channel, &mut touched).await;

        match &result {
            Ok(finished) => {
                let elapsed = chrono::Utc::now() - started;
                info!(%id, path = %finished.path.display(), ?elapsed, "job completed");
            }
            Err(e) => {
                warn!(%id, error = %e, "job failed, removing its files");
                for path in &touched {
                    self.store.delete(path).await;
                }
            }
        }
        result
    }

    async fn run_pipeline(
        &self,
        id: Uuid,
        request: JobRequest,
        channel: &DeliveryChannel,
        touched: &mut Vec<PathBuf>,
    ) -> Result<FinishedJob, JobError> {
        // Resolving. A probe is fatal only when text metadata depends on it;
        // a probe purely for artwork fails soft.
        let probed: Option<TrackInfo> =
            if request.title.is_none() || request.artist.is_none() {
                Some(self.source.probe_track(&request.url, self.store.root()).await?)
            } else if matches!(request.cover, CoverSource::None) {
                self.source
                    .probe_track(&request.url, self.store.root())
                    .await
                    .map_err(|e| debug!(%id, error = %e, "artwork probe failed"))
                    .ok()
            } else {
                None
            };

        let tags = TrackTags {
            title: request
                .title
                .clone()
                .or_else(|| probed.as_ref().map(|p| p.title.clone()))
                .unwrap_or_else(|| "untitled".to_string()),
            artist: request
                .artist
                .clone()
                .or_else(|| probed.as_ref().map(|p| p.artist.clone()))
                .unwrap_or_else(|| "unknown artist".to_string()),
            album: request
                .album
                .clone()
                .or_else(|| probed.as_ref().map(|p| p.album.clone()))
                .unwrap_or_default(),
        };

        channel
            .emit(ProgressEvent::new(id, Phase::Downloading, 0.0).with_message(tags.title.clone()))
            .await?;

        let cover_path = match &request.cover {
            CoverSource::Upload(path) => {
                touched.push(path.clone());
                Some(path.clone())
            }
            CoverSource::Shared(path) => Some(path.clone()),
            CoverSource::Remote(url) => {
                let fetched = cover_art::fetch_cover(url, &self.store, id).await;
                touched.extend(fetched.clone());
                fetched
            }
            CoverSource::None => match probed.as_ref().and_then(|p| p.thumbnail.clone()) {
                Some(thumb) => {
                    let fetched = cover_art::fetch_cover(&thumb, &self.store, id).await;
                    touched.extend(fetched.clone());
                    fetched
                }
                None => None,
            },
        };

        // Downloading.
        let working = self.store.reserve_for(id, "mp3");
        touched.push(working.clone());
        self.run_extractor(id, &request.url, &working, channel).await?;

        // Tagging. An untagged file is never delivered.
        let cover_bytes = match &cover_path {
            Some(path) => tokio::fs::read(path).await.ok(),
            None => None,
        };
        {
            let working = working.clone();
            let tags = tags.clone();
            tokio::task::spawn_blocking(move || {
                audio_tags::write_tags(&working, &tags, cover_bytes.as_deref())
            })
            .await
            .map_err(|e| JobError::Aborted(e.to_string()))??;
        }

        // Success: the artifact stays, everything around it goes — the
        // cover, and whatever extra files the subprocess left under this id.
        self.store.delete_siblings(&working).await;
        if let CoverSource::Upload(path) = &request.cover {
            self.store.delete(path).await;
        }

        Ok(FinishedJob {
            id,
            path: working,
            tags,
        })
    }

    /// Spawn the extraction subprocess and pump its output through the
    /// progress parser while it runs. The argument list is structured;
    /// nothing here ever round-trips through a shell string.
    async fn run_extractor(
        &self,
        id: Uuid,
        url: &Url,
        working: &Path,
        channel: &DeliveryChannel,
    ) -> Result<(), JobError> {
        let mut command = Command::new(&self.tools.extractor);
        command
            .args(["-x", "--audio-format", "mp3", "--audio-quality", "0"])
            .args(["-f", "bestaudio"])
            .args([
                "--no-check-certificate",
                "--no-part",
                "--no-cache-dir",
                "--no-playlist",
                "--newline",
            ])
            .arg("--ffmpeg-location")
            .arg(&self.tools.transcoder)
            .arg("-o")
            .arg(working)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(%id, tool = %self.tools.extractor.display(), "spawning extraction subprocess");
        let mut child = command.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("subprocess stdout not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("subprocess stderr not piped"))?;

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut tracker = ProgressTracker::new(id);
        let mut transcript_out = String::new();
        let mut transcript_err = String::new();
        let (mut out_done, mut err_done) = (false, false);

        // Both streams are consumed as data arrives; the subprocess never
        // stalls on a full pipe waiting for us.
        while !(out_done && err_done) {
            tokio::select! {
                line = out_lines.next_line(), if !out_done => match line {
                    Ok(Some(line)) => {
                        if let Some(event) = tracker.observe(&line) {
                            channel.emit(event).await?;
                        }
                        transcript_out.push_str(&line);
                        transcript_out.push('\n');
                    }
                    Ok(None) => out_done = true,
                    Err(e) => {
                        warn!(%id, error = %e, "stdout read failed");
                        out_done = true;
                    }
                },
                line = err_lines.next_line(), if !err_done => match line {
                    Ok(Some(line)) => {
                        if let Some(event) = tracker.observe(&line) {
                            channel.emit(event).await?;
                        }
                        transcript_err.push_str(&line);
                        transcript_err.push('\n');
                    }
                    Ok(None) => err_done = true,
                    Err(e) => {
                        warn!(%id, error = %e, "stderr read failed");
                        err_done = true;
                    }
                },
            }
        }

        let status = child.wait().await?;
        let produced = tokio::fs::try_exists(working).await.unwrap_or(false);
        if !status.success() || !produced {
            return Err(JobError::Subprocess {
                status: status.code(),
                stdout: transcript_out,
                stderr: transcript_err,
            });
        }
        Ok(())
    }
}
