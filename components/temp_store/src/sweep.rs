// components/temp_store/src/sweep.rs
use crate::TempStore;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Background task that periodically sweeps the scratch directory.
///
/// The first sweep runs immediately on spawn; afterwards one sweep per
/// interval for the lifetime of the process, until [`Sweeper::shutdown`].
pub struct Sweeper {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Sweeper {
    pub fn spawn(store: TempStore, interval: Duration, max_age: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    // First tick completes immediately: the eager startup sweep.
                    _ = ticker.tick() => {
                        info!(root = %store.root().display(), "sweeping scratch directory");
                        store.sweep(max_age, true).await;
                    }
                }
            }
        });

        Self { handle, cancel }
    }

    /// Stop the periodic sweep and wait for the task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sweeper_runs_eagerly_on_spawn() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::open(dir.path());
        let leftover = dir.path().join("orphan.part");
        std::fs::write(&leftover, b"x").unwrap();

        let sweeper = Sweeper::spawn(store, Duration::from_secs(3600), DEFAULT_MAX_AGE);

        // The eager sweep runs on the first (immediate) tick.
        for _ in 0..50 {
            if !leftover.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!leftover.exists());

        sweeper.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_shutdown_stops_task() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::open(dir.path());

        let sweeper = Sweeper::spawn(store, Duration::from_millis(10), DEFAULT_MAX_AGE);
        sweeper.shutdown().await;
    }
}
