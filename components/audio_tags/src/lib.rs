// components/audio_tags/src/lib.rs
use lofty::{
    Accessor, LoftyError, MimeType, Picture, PictureType, Probe, Tag, TagExt, TaggedFileExt,
};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TagError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lofty error: {0}")]
    Lofty(#[from] LoftyError),

    #[error("file format supports no tags: {0}")]
    Untaggable(PathBuf),

    #[error("no tags present in {0}")]
    NoTags(PathBuf),
}

/// The three text fields a finished artifact carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    /// Kept empty (and omitted from the file) when the item has no album.
    pub album: String,
}

/// What is actually embedded in a file, for verification and display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedTags {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub has_cover: bool,
}

/// Embed title/artist/album and an optional front-cover JPEG into the file
/// at `path`, in place.
pub fn write_tags(path: &Path, tags: &TrackTags, cover_jpeg: Option<&[u8]>) -> Result<(), TagError> {
    // Detection goes by content, not extension: the extraction subprocess
    // controls what actually lands at the working path.
    let mut tagged = Probe::open(path)?.guess_file_type()?.read()?;
    let tag_type = tagged.primary_tag_type();
    if tagged.primary_tag().is_none() {
        tagged.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged
        .primary_tag_mut()
        .ok_or_else(|| TagError::Untaggable(path.to_owned()))?;

    tag.set_title(tags.title.clone());
    tag.set_artist(tags.artist.clone());
    if tags.album.is_empty() {
        tag.remove_album();
    } else {
        tag.set_album(tags.album.clone());
    }

    if let Some(jpeg) = cover_jpeg {
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Jpeg),
            None,
            jpeg.to_vec(),
        ));
    }

    tag.save_to_path(path)?;
    Ok(())
}

/// Read back the embedded fields; absent text fields come back empty.
pub fn read_tags(path: &Path) -> Result<EmbeddedTags, TagError> {
    let tagged = Probe::open(path)?.guess_file_type()?.read()?;
    let tag = tagged
        .primary_tag()
        .or_else(|| tagged.first_tag())
        .ok_or_else(|| TagError::NoTags(path.to_owned()))?;

    Ok(EmbeddedTags {
        title: tag.title().map(|s| s.to_string()).unwrap_or_default(),
        artist: tag.artist().map(|s| s.to_string()).unwrap_or_default(),
        album: tag.album().map(|s| s.to_string()).unwrap_or_default(),
        has_cover: !tag.pictures().is_empty(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Minimal canonical RIFF/WAVE file: 16 kHz mono 16-bit, 0.05 s of
    /// silence. Enough for the probe to identify and tag it.
    fn write_test_wav(path: &Path) {
        let data = vec![0u8; 1600];
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36u32 + data.len() as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
        wav.extend_from_slice(&1u16.to_le_bytes()); // mono
        wav.extend_from_slice(&16000u32.to_le_bytes());
        wav.extend_from_slice(&32000u32.to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(data.len() as u32).to_le_bytes());
        wav.extend_from_slice(&data);
        std::fs::write(path, wav).unwrap();
    }

    fn tags() -> TrackTags {
        TrackTags {
            title: "Song A".to_string(),
            artist: "Artist X".to_string(),
            album: "Album Z".to_string(),
        }
    }

    #[test]
    fn test_tags_roundtrip_exactly() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("track.wav");
        write_test_wav(&file);

        write_tags(&file, &tags(), None).unwrap();
        let embedded = read_tags(&file).unwrap();

        assert_eq!(embedded.title, "Song A");
        assert_eq!(embedded.artist, "Artist X");
        assert_eq!(embedded.album, "Album Z");
        assert!(!embedded.has_cover);
    }

    #[test]
    fn test_empty_album_stays_empty() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("track.wav");
        write_test_wav(&file);

        let tags = TrackTags {
            album: String::new(),
            ..tags()
        };
        write_tags(&file, &tags, None).unwrap();

        assert_eq!(read_tags(&file).unwrap().album, "");
    }

    #[test]
    fn test_cover_is_embedded() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("track.wav");
        write_test_wav(&file);

        // Payload content is opaque to the tag layer.
        write_tags(&file, &tags(), Some(b"\xFF\xD8\xFF\xE0 jpeg-ish")).unwrap();

        assert!(read_tags(&file).unwrap().has_cover);
    }

    #[test]
    fn test_retagging_overwrites() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("track.wav");
        write_test_wav(&file);

        write_tags(&file, &tags(), None).unwrap();
        let updated = TrackTags {
            title: "Song B".to_string(),
            ..tags()
        };
        write_tags(&file, &updated, None).unwrap();

        assert_eq!(read_tags(&file).unwrap().title, "Song B");
    }

    #[test]
    fn test_garbage_file_errors() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("noise.mp3");
        std::fs::write(&file, b"not audio").unwrap();

        assert!(write_tags(&file, &tags(), None).is_err());
    }
}
