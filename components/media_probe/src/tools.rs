// components/media_probe/src/tools.rs
use crate::ProbeError;
use std::path::{Path, PathBuf};
use tracing::info;

/// Locations of the two executables the pipeline shells out to.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub extractor: PathBuf,
    pub transcoder: PathBuf,
}

/// Probe for the extraction tool and the transcoder.
///
/// The extraction tool prefers a bundled binary under `bin_dir` before a
/// PATH lookup; the transcoder prefers PATH before the bundled fallback.
/// Both are startup preconditions.
pub fn locate_tools(bin_dir: &Path) -> Result<ToolPaths, ProbeError> {
    let extractor = bundled(bin_dir, "yt-dlp")
        .or_else(|| which::which("yt-dlp").ok())
        .ok_or(ProbeError::ToolMissing("yt-dlp"))?;

    let transcoder = which::which("ffmpeg")
        .ok()
        .or_else(|| bundled(bin_dir, "ffmpeg"))
        .ok_or(ProbeError::ToolMissing("ffmpeg"))?;

    info!(extractor = %extractor.display(), transcoder = %transcoder.display(), "located tools");
    Ok(ToolPaths {
        extractor,
        transcoder,
    })
}

fn bundled(bin_dir: &Path, name: &str) -> Option<PathBuf> {
    let candidate = bin_dir.join(name);
    candidate.is_file().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    #[test]
    fn test_bundled_extractor_wins_over_path() {
        let dir = TempDir::new().unwrap();
        let fake = dir.path().join("yt-dlp");
        std::fs::write(&fake, b"#!/bin/sh\n").unwrap();

        let found = bundled(dir.path(), "yt-dlp");
        assert_eq!(found, Some(fake));
    }

    #[test]
    fn test_missing_everything_errors() {
        let dir = TempDir::new().unwrap();
        // Empty bin dir and (almost certainly) no yt-dlp on the test PATH
        // still must produce the right error shape, not a panic.
        if which::which("yt-dlp").is_err() {
            assert_matches!(
                locate_tools(dir.path()),
                Err(ProbeError::ToolMissing("yt-dlp"))
            );
        }
    }
}
