//! Disk retention for finished download directories
//!
//! Downloads accumulate under the output directory until someone removes
//! them. The [`RetentionSweeper`] deletes job directories that are not
//! tracked in the registry: periodically with an age threshold, or on demand
//! (the `/clear` endpoint) ignoring age. Directories belonging to live jobs
//! are never touched, whatever their age.

use crate::registry::JobRegistry;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Deletes stale job directories from the output directory
#[derive(Clone)]
pub struct RetentionSweeper {
    out_dir: PathBuf,
    registry: JobRegistry,
    max_age: Duration,
}

impl RetentionSweeper {
    /// Create a sweeper over `out_dir`, consulting `registry` for liveness
    pub fn new(out_dir: PathBuf, registry: JobRegistry, max_age: Duration) -> Self {
        Self {
            out_dir,
            registry,
            max_age,
        }
    }

    /// Run one sweep, returning the names of the directories deleted
    ///
    /// Only directories are considered; loose files are left alone. A
    /// directory is skipped when its name is a tracked job id, or — with
    /// `enforce_age` — when it is younger than the configured maximum age.
    /// Per-entry failures are logged and do not abort the sweep.
    pub async fn sweep(&self, enforce_age: bool) -> Vec<String> {
        let mut deleted = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.out_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(dir = %self.out_dir.display(), error = %e, "cannot read output directory");
                return deleted;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(dir = %self.out_dir.display(), error = %e, "error while listing output directory");
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();

            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => {}
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(entry = %name, error = %e, "cannot determine entry type");
                    continue;
                }
            }

            if self.registry.has(&name) {
                tracing::debug!(dir = %name, "skipping live job directory");
                continue;
            }

            if enforce_age && self.is_young(&entry, &name).await {
                continue;
            }

            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => {
                    tracing::info!(dir = %name, "deleted stale download directory");
                    deleted.push(name);
                }
                Err(e) => {
                    tracing::error!(dir = %name, error = %e, "failed to delete directory");
                }
            }
        }

        deleted
    }

    /// Sweep periodically until cancelled
    ///
    /// Waits out `startup_delay`, then sweeps with age enforcement once per
    /// `interval` (the first sweep fires right after the delay).
    pub async fn run(
        self,
        startup_delay: Duration,
        interval: Duration,
        shutdown: CancellationToken,
    ) {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(startup_delay) => {}
        }

        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("retention sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let deleted = self.sweep(true).await;
                    if !deleted.is_empty() {
                        tracing::info!(count = deleted.len(), "retention sweep removed directories");
                    }
                }
            }
        }
    }

    async fn is_young(&self, entry: &tokio::fs::DirEntry, name: &str) -> bool {
        match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(modified) => modified
                .elapsed()
                // clock skew puts the mtime in the future: treat as fresh
                .map_or(true, |age| age < self.max_age),
            Err(e) => {
                tracing::warn!(dir = %name, error = %e, "cannot stat entry, leaving it alone");
                true
            }
        }
    }
}
