// components/delivery_stream/src/lib.rs
//! The per-request logical channel. Progress events and the bytes of the
//! finished artifact are multiplexed onto one frame stream; the channel is
//! bounded at a single in-flight frame, so the producer cannot run ahead of
//! the consumer's acknowledgement (the receive).

use bytes::Bytes;
use progress_feed::{Phase, ProgressEvent};
use std::path::Path;
use temp_store::TempStore;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

pub const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("requester went away mid-transfer")]
    Disconnected,

    #[error("failed to read artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// One frame on the wire: a structured event or a slab of artifact bytes.
#[derive(Debug, Clone)]
pub enum Frame {
    Event(ProgressEvent),
    Data(Bytes),
}

/// Producer half of a delivery channel.
#[derive(Clone)]
pub struct DeliveryChannel {
    tx: mpsc::Sender<Frame>,
}

impl DeliveryChannel {
    /// Create a channel pair. Capacity is one frame: `emit`/`stream_file`
    /// suspend until the consumer has taken the previous frame.
    pub fn pair() -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    pub async fn emit(&self, event: ProgressEvent) -> Result<(), DeliveryError> {
        self.tx
            .send(Frame::Event(event))
            .await
            .map_err(|_| DeliveryError::Disconnected)
    }

    async fn send_data(&self, data: Bytes) -> Result<(), DeliveryError> {
        self.tx
            .send(Frame::Data(data))
            .await
            .map_err(|_| DeliveryError::Disconnected)
    }

    /// Stream a finished artifact: one FileStart event, then data chunks
    /// each followed by a FileChunk event with cumulative percentage, then
    /// FileComplete. The artifact is deleted from the store afterwards,
    /// whether or not the transfer finished.
    pub async fn stream_file(
        &self,
        job_id: Uuid,
        path: &Path,
        store: &TempStore,
    ) -> Result<(), DeliveryError> {
        let result = self.stream_file_inner(job_id, path).await;
        store.delete(path).await;
        result
    }

    async fn stream_file_inner(&self, job_id: Uuid, path: &Path) -> Result<(), DeliveryError> {
        let mut file = tokio::fs::File::open(path).await?;
        let total = file.metadata().await?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());

        debug!(%job_id, path = %path.display(), total, "starting transfer");
        self.emit(
            ProgressEvent::new(job_id, Phase::FileStart, 0.0)
                .with_message(name)
                .with_total_bytes(total),
        )
        .await?;

        let mut sent: u64 = 0;
        loop {
            let mut buf = vec![0u8; CHUNK_SIZE];
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            buf.truncate(n);
            self.send_data(Bytes::from(buf)).await?;

            sent += n as u64;
            let percent = if total > 0 {
                (sent as f64 / total as f64 * 100.0) as f32
            } else {
                100.0
            };
            self.emit(ProgressEvent::new(job_id, Phase::FileChunk, percent))
                .await?;
        }

        self.emit(ProgressEvent::new(job_id, Phase::FileComplete, 100.0))
            .await?;
        debug!(%job_id, sent, "transfer complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    async fn drain(mut rx: mpsc::Receiver<Frame>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn test_stream_file_framing_and_cleanup() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::open(dir.path());
        let path = store.reserve("mp3");
        // Two full chunks and a partial one.
        std::fs::write(&path, vec![7u8; CHUNK_SIZE * 2 + 100]).unwrap();

        let (channel, rx) = DeliveryChannel::pair();
        let job_id = Uuid::new_v4();

        let collector = tokio::spawn(drain(rx));
        channel.stream_file(job_id, &path, &store).await.unwrap();
        drop(channel);
        let frames = collector.await.unwrap();

        assert!(!path.exists(), "artifact must be deleted after delivery");

        let events: Vec<&ProgressEvent> = frames
            .iter()
            .filter_map(|f| match f {
                Frame::Event(e) => Some(e),
                Frame::Data(_) => None,
            })
            .collect();
        let data_len: usize = frames
            .iter()
            .map(|f| match f {
                Frame::Data(d) => d.len(),
                Frame::Event(_) => 0,
            })
            .sum();

        assert_eq!(data_len, CHUNK_SIZE * 2 + 100);
        assert_eq!(events.first().unwrap().phase, Phase::FileStart);
        assert_eq!(
            events.first().unwrap().total_bytes,
            Some((CHUNK_SIZE * 2 + 100) as u64)
        );
        assert_eq!(events.last().unwrap().phase, Phase::FileComplete);

        let chunk_percents: Vec<f32> = events
            .iter()
            .filter(|e| e.phase == Phase::FileChunk)
            .map(|e| e.percent)
            .collect();
        assert_eq!(chunk_percents.len(), 3);
        assert!(chunk_percents.windows(2).all(|w| w[0] <= w[1]));
        assert!((chunk_percents.last().unwrap() - 100.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_backpressure_one_frame_in_flight() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::open(dir.path());
        let path = store.reserve("mp3");
        std::fs::write(&path, vec![1u8; CHUNK_SIZE * 4]).unwrap();

        let (channel, mut rx) = DeliveryChannel::pair();
        let job_id = Uuid::new_v4();

        let producer = {
            let store = store.clone();
            tokio::spawn(async move { channel.stream_file(job_id, &path, &store).await })
        };

        // Without the consumer taking frames, the producer must stall.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        // Draining releases it.
        while rx.recv().await.is_some() {}
        producer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_consumer_disconnect_surfaces_and_still_cleans_up() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::open(dir.path());
        let path = store.reserve("mp3");
        std::fs::write(&path, vec![1u8; CHUNK_SIZE * 2]).unwrap();

        let (channel, rx) = DeliveryChannel::pair();
        drop(rx);

        let result = channel.stream_file(Uuid::new_v4(), &path, &store).await;
        assert_matches!(result, Err(DeliveryError::Disconnected));
        assert!(!path.exists(), "artifact deleted even on failed delivery");
    }

    #[tokio::test]
    async fn test_missing_artifact_is_io_error() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::open(dir.path());
        let (channel, _rx) = DeliveryChannel::pair();

        let result = channel
            .stream_file(Uuid::new_v4(), &store.reserve("mp3"), &store)
            .await;
        assert_matches!(result, Err(DeliveryError::Io(_)));
    }
}
