use super::{ExternalCache, TwoTierCache};
use crate::config::CacheConfig;
use crate::walk;
use crate::{DriveError, DriveResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// Recursive statistics of one folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderStats {
    pub files: u64,
    pub folders: u64,
    pub total_bytes: u64,
    /// The walk hit its entry limit; counts are lower bounds.
    pub truncated: bool,
}

#[derive(Serialize, Deserialize)]
struct CachedStats {
    stats: FolderStats,
    mtime_secs: u64,
    mtime_nanos: u32,
}

/// Folder statistics keyed by real directory path, validated by directory mtime.
///
/// An entry is served only while the directory's modification time has not advanced past the
/// one recorded before the walk. Writes deeper in the tree do not touch the top-level mtime,
/// so mutating operations also call [`StatsCache::invalidate`] on every ancestor they affect.
pub struct StatsCache {
    inner: TwoTierCache,
    max_entries: usize,
}

async fn dir_mtime(dir: &Path) -> DriveResult<(u64, u32)> {
    let meta = tokio::fs::metadata(dir).await?;
    if !meta.is_dir() {
        return Err(DriveError::invalid_input("statistics are only available for folders"));
    }
    let since_epoch = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    Ok((since_epoch.as_secs(), since_epoch.subsec_nanos()))
}

fn key_of(dir: &Path) -> String {
    dir.to_string_lossy().into_owned()
}

impl StatsCache {
    pub fn new(config: &CacheConfig, external: Option<Arc<dyn ExternalCache>>) -> Self {
        Self {
            inner: TwoTierCache::new("stats", config, config.stats_ttl, external),
            max_entries: config.max_stats_entries,
        }
    }

    /// Cached statistics for `dir`, recomputing when missing or stale.
    pub async fn folder_stats(&self, dir: &Path) -> DriveResult<FolderStats> {
        let key = key_of(dir);
        let current = dir_mtime(dir).await?;

        if let Some(cached) = self.inner.get::<CachedStats>(&key).await {
            if current <= (cached.mtime_secs, cached.mtime_nanos) {
                return Ok(cached.stats);
            }
            tracing::debug!("folder statistics stale, recomputing");
        }

        let target: PathBuf = dir.to_path_buf();
        let max_entries = self.max_entries;
        let stats = tokio::task::spawn_blocking(move || walk::folder_stats(&target, max_entries))
            .await
            .map_err(|e| DriveError::Io(std::io::Error::other(e)))??;

        self.inner
            .set(
                &key,
                &CachedStats {
                    stats,
                    mtime_secs: current.0,
                    mtime_nanos: current.1,
                },
            )
            .await;
        Ok(stats)
    }

    pub async fn invalidate(&self, dir: &Path) {
        self.inner.remove(&key_of(dir)).await;
    }

    pub async fn clear(&self) {
        self.inner.clear().await;
    }

    pub(crate) fn clear_local(&self) {
        self.inner.clear_local();
    }
}
