use crate::core::error::PipelineError;
use crate::core::model::RunId;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Long-lived cookie jar in the temp root that sweeps must keep.
pub const PERSISTED_COOKIE_JAR: &str = "cookies.txt";
const RUN_DIR_PREFIX: &str = "run-";

/// The shared temp root. Each run works in its own `run-<id>` subdirectory.
#[derive(Debug, Clone)]
pub struct TempWorkspace {
    root: PathBuf,
    stale_after: Duration,
}

impl TempWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), stale_after: Duration::from_secs(3600) }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deletes loose files (except the persisted cookie jar) and run directories
    /// older than the stale window. Per-entry failures are logged, not returned.
    pub async fn sweep(&self) -> anyhow::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e).with_context(|| format!("read temp dir {}", self.root.display())),
        };

        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let path = entry.path();
            let meta = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "stat failed during sweep");
                    continue;
                }
            };

            let result = if meta.is_dir() {
                if !name.starts_with(RUN_DIR_PREFIX) || !self.is_stale(&meta) {
                    continue;
                }
                tokio::fs::remove_dir_all(&path).await
            } else {
                if name == PERSISTED_COOKIE_JAR {
                    continue;
                }
                tokio::fs::remove_file(&path).await
            };

            match result {
                Ok(()) => {
                    removed += 1;
                    debug!(path = %path.display(), "swept");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to delete temp entry"),
            }
        }
        Ok(removed)
    }

    fn is_stale(&self, meta: &std::fs::Metadata) -> bool {
        meta.modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .map(|age| age >= self.stale_after)
            .unwrap_or(false)
    }

    pub async fn create_run_dir(&self, run_id: RunId) -> Result<PathBuf, PipelineError> {
        let dir = self.root.join(format!("{RUN_DIR_PREFIX}{run_id}"));
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!(dir = %dir.display(), error = %e, "cannot create run dir");
            return Err(e.into());
        }
        Ok(dir)
    }
}

/// Removes a file if present; logs anything other than "not found".
pub async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove file"),
    }
}

pub async fn remove_dir_if_exists(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!(path = %path.display(), "removed dir"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove dir"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn sweep_keeps_cookie_jar_and_live_runs() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = TempWorkspace::new(tmp.path());
        std::fs::write(tmp.path().join(PERSISTED_COOKIE_JAR), "# Netscape HTTP Cookie File\n").unwrap();
        std::fs::write(tmp.path().join("old.m4a"), b"x").unwrap();
        std::fs::write(tmp.path().join("last_yt_dlp_stdout.log"), b"x").unwrap();
        let live = ws.create_run_dir(Uuid::new_v4()).await.unwrap();
        std::fs::write(live.join("track.webm"), b"x").unwrap();

        assert_eq!(ws.sweep().await.unwrap(), 2);
        assert!(tmp.path().join(PERSISTED_COOKIE_JAR).exists());
        assert!(live.join("track.webm").exists());
        assert!(!tmp.path().join("old.m4a").exists());
    }

    #[tokio::test]
    async fn sweep_removes_stale_run_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = TempWorkspace::new(tmp.path()).with_stale_after(Duration::ZERO);
        let dir = ws.create_run_dir(Uuid::new_v4()).await.unwrap();
        std::fs::create_dir(tmp.path().join("keepme")).unwrap();

        assert_eq!(ws.sweep().await.unwrap(), 1);
        assert!(!dir.exists());
        assert!(tmp.path().join("keepme").exists());
    }

    #[tokio::test]
    async fn sweep_is_idempotent_on_empty_or_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = TempWorkspace::new(tmp.path());
        std::fs::write(tmp.path().join(PERSISTED_COOKIE_JAR), "").unwrap();
        assert_eq!(ws.sweep().await.unwrap(), 0);
        assert_eq!(ws.sweep().await.unwrap(), 0);

        let missing = TempWorkspace::new(tmp.path().join("nope"));
        assert_eq!(missing.sweep().await.unwrap(), 0);
        assert!(!tmp.path().join("nope").exists());
    }

    #[tokio::test]
    async fn run_dir_failure_is_a_temp_storage_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocked = tmp.path().join("not-a-dir");
        std::fs::write(&blocked, b"x").unwrap();

        let err = TempWorkspace::new(&blocked).create_run_dir(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
        assert!(err.to_string().starts_with("temp storage error: "));
    }
}
