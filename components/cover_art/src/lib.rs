// components/cover_art/src/lib.rs
//! Best-effort cover art. Every failure here — network, wrong content type,
//! oversize response, undecodable image — degrades to "no cover"; a job is
//! never failed over artwork.

use futures::StreamExt;
use image::imageops::FilterType;
use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;
use temp_store::TempStore;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

pub const COVER_SIZE: u32 = 800;
const JPEG_QUALITY: u8 = 85;
const MAX_BYTES: usize = 10 * 1024 * 1024;
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CoverError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("response is not an image (content type {0:?})")]
    NotAnImage(Option<String>),

    #[error("response exceeds {MAX_BYTES} bytes")]
    TooLarge,

    #[error("image decode/encode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("resample task aborted")]
    TaskAborted,
}

/// Fetch a remote thumbnail, normalize it to a square JPEG and write it to
/// a temp-store path namespaced under `id`. `None` on any failure.
pub async fn fetch_cover(url: &str, store: &TempStore, id: Uuid) -> Option<PathBuf> {
    match try_fetch(url, store, id).await {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(url, error = %e, "cover fetch failed, continuing without artwork");
            None
        }
    }
}

async fn try_fetch(url: &str, store: &TempStore, id: Uuid) -> Result<PathBuf, CoverError> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()?;
    let response = client.get(url).send().await?.error_for_status()?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if !content_type
        .as_deref()
        .is_some_and(|t| t.starts_with("image/"))
    {
        return Err(CoverError::NotAnImage(content_type));
    }

    if response
        .content_length()
        .is_some_and(|len| len > MAX_BYTES as u64)
    {
        return Err(CoverError::TooLarge);
    }

    // The declared length can lie; cap while streaming as well.
    let mut raw = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if raw.len() + chunk.len() > MAX_BYTES {
            return Err(CoverError::TooLarge);
        }
        raw.extend_from_slice(&chunk);
    }

    let jpeg = tokio::task::spawn_blocking(move || square_jpeg(&raw, COVER_SIZE))
        .await
        .map_err(|_| CoverError::TaskAborted)??;

    let path = store.reserve_for(id, "jpg");
    tokio::fs::write(&path, jpeg).await?;
    Ok(path)
}

/// Re-encode raw image bytes as a cover-fit square JPEG. Also used to
/// normalize client-uploaded covers before they enter the store.
pub fn square_jpeg(raw: &[u8], size: u32) -> Result<Vec<u8>, CoverError> {
    let decoded = image::load_from_memory(raw)?;
    let square = decoded.resize_to_fill(size, size, FilterType::Lanczos3);
    // JPEG has no alpha channel.
    let square = image::DynamicImage::ImageRgb8(square.to_rgb8());

    let mut out = Vec::new();
    let mut cursor = Cursor::new(&mut out);
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
    square.write_with_encoder(encoder)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_square_jpeg_is_square_and_decodable() {
        let wide = png_bytes(128, 32);

        let jpeg = square_jpeg(&wide, 64).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();

        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 64);
    }

    #[test]
    fn test_square_jpeg_rejects_garbage() {
        assert!(square_jpeg(b"not an image at all", 64).is_err());
    }

    #[tokio::test]
    async fn test_fetch_cover_happy_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(png_bytes(32, 32)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = TempStore::open(dir.path());
        let id = Uuid::new_v4();

        let path = fetch_cover(&server.uri(), &store, id).await.unwrap();
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with(&id.to_string()));
    }

    #[tokio::test]
    async fn test_fetch_cover_404_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = TempStore::open(dir.path());

        assert!(fetch_cover(&server.uri(), &store, Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_cover_wrong_content_type_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html>not a thumbnail</html>"),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = TempStore::open(dir.path());

        assert!(fetch_cover(&server.uri(), &store, Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_cover_oversize_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![0u8; MAX_BYTES + 1]),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = TempStore::open(dir.path());

        assert!(fetch_cover(&server.uri(), &store, Uuid::new_v4()).await.is_none());
    }
}
