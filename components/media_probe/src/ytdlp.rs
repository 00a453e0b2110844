// components/media_probe/src/ytdlp.rs
use crate::types::{MetadataSource, PlaylistEntry, ProbeError, TrackInfo};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Metadata-only driver for the extraction tool.
///
/// Downloads never run here; this only invokes the tool's JSON dump modes
/// and normalizes what comes back.
pub struct YtDlp {
    binary: PathBuf,
    probe_timeout: Duration,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    async fn run_json(&self, args: &[&str], url: &Url, cwd: &Path) -> Result<Vec<u8>, ProbeError> {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .arg("--no-warnings")
            .arg(url.as_str())
            .current_dir(cwd)
            .kill_on_drop(true);

        debug!(url = %url, ?args, "probing metadata");
        let output = tokio::time::timeout(self.probe_timeout, command.output())
            .await
            .map_err(|_| ProbeError::Timeout {
                url: url.to_string(),
            })??;

        if !output.status.success() {
            return Err(ProbeError::Subprocess {
                url: url.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait::async_trait]
impl MetadataSource for YtDlp {
    async fn probe_track(&self, url: &Url, scratch: &Path) -> Result<TrackInfo, ProbeError> {
        // The tool can materialize a partial media file even in
        // metadata-only mode, so it runs in a private subdirectory that is
        // dropped wholesale afterwards.
        let probe_dir = scratch.join(format!("probe-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&probe_dir).await?;

        let result = self
            .run_json(
                &["--dump-single-json", "--no-playlist", "--skip-download"],
                url,
                &probe_dir,
            )
            .await
            .and_then(|raw| parse_track(url, &raw));

        if let Err(e) = tokio::fs::remove_dir_all(&probe_dir).await {
            warn!(dir = %probe_dir.display(), error = %e, "failed to drop probe directory");
        }
        result
    }

    async fn probe_playlist(&self, url: &Url) -> Result<Vec<PlaylistEntry>, ProbeError> {
        let raw = self
            .run_json(
                &["--flat-playlist", "--dump-single-json", "--skip-download"],
                url,
                Path::new("."),
            )
            .await?;
        parse_playlist(url, &raw)
    }
}

fn parse_json(url: &Url, raw: &[u8]) -> Result<Value, ProbeError> {
    serde_json::from_slice(raw).map_err(|e| ProbeError::Parse {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn parse_track(url: &Url, raw: &[u8]) -> Result<TrackInfo, ProbeError> {
    let value = parse_json(url, raw)?;
    Ok(track_from_value(url, &value))
}

fn track_from_value(url: &Url, value: &Value) -> TrackInfo {
    TrackInfo {
        title: value["title"].as_str().unwrap_or("untitled").to_string(),
        artist: resolve_artist(value),
        album: value["album"].as_str().unwrap_or("").to_string(),
        thumbnail: best_thumbnail(value),
        canonical_url: value["webpage_url"]
            .as_str()
            .unwrap_or(url.as_str())
            .to_string(),
        duration: value["duration"].as_f64(),
    }
}

fn parse_playlist(url: &Url, raw: &[u8]) -> Result<Vec<PlaylistEntry>, ProbeError> {
    let value = parse_json(url, raw)?;
    let entries = value["entries"].as_array().ok_or_else(|| ProbeError::Parse {
        url: url.to_string(),
        reason: "playlist dump has no entries array".to_string(),
    })?;

    Ok(entries.iter().filter_map(entry_from_value).collect())
}

fn entry_from_value(value: &Value) -> Option<PlaylistEntry> {
    Some(PlaylistEntry {
        url: value["url"].as_str()?.to_string(),
        title: value["title"].as_str().unwrap_or("untitled").to_string(),
        thumbnail: best_thumbnail(value),
    })
}

/// Artist resolution order: structured `artists` array (deduplicated,
/// joined), the flat `artist` string, then the channel name with the usual
/// label decorations stripped.
fn resolve_artist(value: &Value) -> String {
    if let Some(artists) = value["artists"].as_array() {
        let mut seen = Vec::new();
        for artist in artists.iter().filter_map(Value::as_str) {
            if !artist.is_empty() && !seen.contains(&artist) {
                seen.push(artist);
            }
        }
        if !seen.is_empty() {
            return seen.join(", ");
        }
    }

    if let Some(artist) = value["artist"].as_str() {
        if !artist.is_empty() {
            return artist.to_string();
        }
    }

    let channel = value["channel"]
        .as_str()
        .or_else(|| value["uploader"].as_str())
        .unwrap_or("unknown artist");
    clean_channel_name(channel)
}

fn clean_channel_name(name: &str) -> String {
    let mut name = name.trim();
    loop {
        let stripped = name
            .strip_suffix("- Topic")
            .or_else(|| name.strip_suffix("VEVO"))
            .or_else(|| name.strip_suffix("Official"))
            .map(str::trim_end);
        match stripped {
            Some(rest) if !rest.is_empty() => name = rest,
            _ => break,
        }
    }
    name.to_string()
}

/// Pick the largest thumbnail by pixel area, falling back to the flat
/// `thumbnail` field when no candidate list is present.
fn best_thumbnail(value: &Value) -> Option<String> {
    let best = value["thumbnails"].as_array().and_then(|candidates| {
        candidates
            .iter()
            .filter(|t| t["url"].is_string())
            .max_by_key(|t| {
                let width = t["width"].as_u64().unwrap_or(0);
                let height = t["height"].as_u64().unwrap_or(0);
                width * height
            })
            .and_then(|t| t["url"].as_str())
            .map(str::to_string)
    });

    best.or_else(|| value["thumbnail"].as_str().map(str::to_string))
}
