// components/temp_store/src/lib.rs
mod sweep;

pub use sweep::{Sweeper, DEFAULT_MAX_AGE, DEFAULT_SWEEP_INTERVAL};

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Extensions the extraction subprocess is known to leave behind next to a
/// working file. `delete` and `sweep` remove these without looking at age.
pub const INTERMEDIATE_EXTENSIONS: &[&str] =
    &["part", "ytdl", "temp", "webm", "m4a", "opus", "aac", "frag"];

#[derive(Error, Debug)]
pub enum TempStoreError {
    #[error("scratch directory {path} is not usable")]
    Unusable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Owns the scratch directory every job allocates its files from.
///
/// Paths are namespaced by a v4 uuid so that everything a job touched can be
/// found again by filename prefix, even files the subprocess created with
/// extensions we did not predict.
#[derive(Debug, Clone)]
pub struct TempStore {
    root: PathBuf,
    degraded: bool,
}

impl TempStore {
    /// Open the store rooted at `root`, creating the directory and probing
    /// that it is writable.
    ///
    /// A failed probe is logged as critical but the store is still returned
    /// in degraded mode; callers may check [`TempStore::is_degraded`].
    pub fn open(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_owned();
        let degraded = match Self::verify(&root) {
            Ok(()) => false,
            Err(e) => {
                tracing::error!(path = %root.display(), error = %e, "CRITICAL: scratch directory unusable, continuing degraded");
                true
            }
        };
        Self { root, degraded }
    }

    fn verify(root: &Path) -> Result<(), TempStoreError> {
        let unusable = |source| TempStoreError::Unusable {
            path: root.to_owned(),
            source,
        };
        std::fs::create_dir_all(root).map_err(unusable)?;
        let probe = root.join(format!(".probe-{}", Uuid::new_v4()));
        std::fs::write(&probe, b"probe").map_err(unusable)?;
        std::fs::remove_file(&probe).map_err(unusable)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Reserve a fresh path under a newly generated id.
    pub fn reserve(&self, extension: &str) -> PathBuf {
        self.reserve_for(Uuid::new_v4(), extension)
    }

    /// Reserve a path under an existing id, so several files of one job
    /// share a prefix.
    pub fn reserve_for(&self, id: Uuid, extension: &str) -> PathBuf {
        self.root.join(format!("{id}.{extension}"))
    }

    /// Best-effort removal of `path` together with its known variants:
    /// sibling files that swap or append one of the intermediate extensions,
    /// and — when the file name starts with a uuid — any other file in the
    /// directory sharing that id. Failures are logged, never returned.
    pub async fn delete(&self, path: &Path) {
        remove_quietly(path).await;
        self.delete_siblings(path).await;
    }

    /// Like [`TempStore::delete`] but keeps `path` itself: clears the
    /// variants and id-siblings around a finished artifact.
    pub async fn delete_siblings(&self, path: &Path) {
        for ext in INTERMEDIATE_EXTENSIONS {
            remove_quietly(&path.with_extension(ext)).await;
            let mut appended = path.as_os_str().to_owned();
            appended.push(format!(".{ext}"));
            remove_quietly(Path::new(&appended)).await;
        }

        let Some(id) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(uuid_prefix)
        else {
            return;
        };
        let dir = path.parent().unwrap_or(&self.root);
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to scan for id siblings");
                return;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let entry_path = entry.path();
            if entry_path == path {
                continue;
            }
            let name = entry.file_name();
            if name
                .to_str()
                .and_then(uuid_prefix)
                .is_some_and(|sibling| sibling == id)
            {
                remove_quietly(&entry_path).await;
            }
        }
    }

    /// Delete intermediate-pattern files unconditionally and anything else
    /// older than `max_age`. Descends into subdirectories only when
    /// `recurse` is set, removing them afterwards if they emptied out.
    pub async fn sweep(&self, max_age: Duration, recurse: bool) {
        sweep_dir(self.root.clone(), max_age, recurse).await;
    }
}

fn sweep_dir(
    dir: PathBuf,
    max_age: Duration,
    recurse: bool,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "sweep: cannot read directory");
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Ok(meta) = entry.metadata().await else {
                continue;
            };

            if meta.is_dir() {
                if recurse {
                    sweep_dir(path.clone(), max_age, recurse).await;
                    // Only empty directories fall to remove_dir.
                    if tokio::fs::remove_dir(&path).await.is_ok() {
                        tracing::debug!(path = %path.display(), "sweep: removed empty directory");
                    }
                }
                continue;
            }

            if is_intermediate(&path) {
                tracing::debug!(path = %path.display(), "sweep: removing intermediate file");
                remove_quietly(&path).await;
                continue;
            }

            let stale = meta
                .modified()
                .ok()
                .and_then(|mtime| mtime.elapsed().ok())
                .is_some_and(|age| age > max_age);
            if stale {
                tracing::debug!(path = %path.display(), "sweep: removing stale file");
                remove_quietly(&path).await;
            }
        }
    })
}

fn is_intermediate(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| INTERMEDIATE_EXTENSIONS.contains(&ext))
}

/// Parse a leading v4 uuid out of a file name like
/// `9f1c...-....mp3.part`; the id is always the first 36 characters.
fn uuid_prefix(name: &str) -> Option<Uuid> {
    name.get(..36).and_then(|s| Uuid::parse_str(s).ok())
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove"),
    }
}
