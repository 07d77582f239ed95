//! Bounded recursive directory walks.
//!
//! Both walks are synchronous and meant to run on the blocking pool. Symlinks are reported but
//! never followed.

use crate::cache::FolderStats;
use crate::paths::join_virtual;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One match of a name search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    /// Virtual path of the match.
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// Counts files, folders and bytes beneath `dir`, stopping after `max_entries` entries.
///
/// Unreadable subdirectories are skipped. The top-level directory must be readable.
pub fn folder_stats(dir: &Path, max_entries: usize) -> io::Result<FolderStats> {
    let mut stats = FolderStats::default();
    let mut visited = 0usize;
    let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];
    let mut first = true;

    while let Some(current) = pending.pop() {
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(err) if first => return Err(err),
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable directory during stats walk");
                continue;
            }
        };
        first = false;

        for entry in entries.flatten() {
            if visited >= max_entries {
                stats.truncated = true;
                return Ok(stats);
            }
            visited += 1;

            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                stats.folders += 1;
                pending.push(entry.path());
            } else if file_type.is_file() {
                stats.files += 1;
                stats.total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
    }
    Ok(stats)
}

/// Case-insensitive substring search over entry names beneath `dir`.
///
/// `virtual_base` is the virtual path of `dir`; hit paths are built from it. The walk stops
/// after visiting `max_visited` entries or collecting `max_results` hits.
pub fn search(
    dir: &Path,
    virtual_base: &str,
    query: &str,
    max_visited: usize,
    max_results: usize,
) -> io::Result<Vec<SearchHit>> {
    let needle = query.to_lowercase();
    let mut hits = Vec::new();
    let mut visited = 0usize;
    let mut pending: Vec<(PathBuf, String)> = vec![(dir.to_path_buf(), virtual_base.to_string())];
    let mut first = true;

    while let Some((current, vpath)) = pending.pop() {
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(err) if first => return Err(err),
            Err(_) => continue,
        };
        first = false;

        for entry in entries.flatten() {
            if visited >= max_visited || hits.len() >= max_results {
                return Ok(hits);
            }
            visited += 1;

            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let child_vpath = join_virtual(&vpath, &name);
            if name.to_lowercase().contains(&needle) {
                hits.push(SearchHit {
                    path: child_vpath.clone(),
                    name: name.clone(),
                    is_dir: file_type.is_dir(),
                    size: if file_type.is_file() {
                        entry.metadata().map(|m| m.len()).unwrap_or(0)
                    } else {
                        0
                    },
                });
            }
            if file_type.is_dir() {
                pending.push((entry.path(), child_vpath));
            }
        }
    }
    Ok(hits)
}
