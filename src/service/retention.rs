//! Periodic retention sweep for the downloads directory and cache maps.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{DownloadCache, SearchCache};

/// Background housekeeping: old artifacts are deleted from disk first,
/// then the download cache is reconciled against what is actually left
/// there. Sweep failures are logged and never abort the loop or the
/// process; nothing awaits a sweep result.
pub struct RetentionSweeper {
    downloads_dir: PathBuf,
    search_cache: Arc<SearchCache>,
    download_cache: Arc<DownloadCache>,
    period: Duration,
}

/// Stops the sweeper cooperatively; an in-flight sweep finishes first.
pub struct RetentionHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RetentionHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("retention task ended abnormally: {e}");
        }
    }
}

impl RetentionSweeper {
    pub fn new(
        downloads_dir: PathBuf,
        search_cache: Arc<SearchCache>,
        download_cache: Arc<DownloadCache>,
        period: Duration,
    ) -> Self {
        Self {
            downloads_dir,
            search_cache,
            download_cache,
            period,
        }
    }

    /// Spawns the perpetual sweep loop. The first pass runs immediately.
    pub fn start(self) -> RetentionHandle {
        info!(
            "🧹 retention sweep every {}",
            humantime::format_duration(self.period)
        );
        let (shutdown, mut rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.sweep().await {
                            warn!("retention sweep failed: {e:#}");
                        }
                    }
                    _ = rx.changed() => {
                        info!("retention sweeper stopped");
                        break;
                    }
                }
            }
        });
        RetentionHandle { shutdown, task }
    }

    /// One sweep pass. File removals are independent; a failed removal is
    /// logged and the scan continues. The cache reconciliation works on a
    /// snapshot so request paths are not blocked for the whole pass.
    pub async fn sweep(&self) -> Result<()> {
        let ttl = self.download_cache.ttl();
        let mut removed_files = 0usize;

        let mut dir = tokio::fs::read_dir(&self.downloads_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("cannot stat {}: {e}", path.display());
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|mtime| mtime.elapsed().ok())
                .unwrap_or_default();
            if age > ttl {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        removed_files += 1;
                        info!("removed old file: {}", path.display());
                    }
                    Err(e) => warn!("failed to remove {}: {e}", path.display()),
                }
            }
        }

        let mut removed_entries = 0usize;
        for (video_id, entry) in self.download_cache.snapshot().await {
            if !entry.is_valid(ttl) || !entry.value.exists() {
                self.download_cache.remove(&video_id).await;
                removed_entries += 1;
            }
        }

        let pruned_searches = self.search_cache.prune_expired().await;
        debug!(
            "🧹 sweep done: {removed_files} files, {removed_entries} download entries, \
             {pruned_searches} search entries"
        );
        Ok(())
    }
}
