//! Filesystem interface consumed by the protocol surfaces.
//!
//! [`FileSystem`] is the seam: surfaces only ever talk to it, never to the resolvers or the
//! disk directly. [`VirtualFs`] is the one implementation, scoped to a single identity.

mod virtual_fs;

pub use virtual_fs::VirtualFs;

use crate::DriveResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::Metadata;

/// One directory entry as seen through the virtual namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Final path segment (empty for `/`).
    pub name: String,
    /// Virtual path the caller can use to address the entry.
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Human-readable name when it differs from `name` (shared-with-me entries are addressed
    /// by share id).
    pub display_name: Option<String>,
}

impl FileInfo {
    pub(crate) fn virtual_dir(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            is_dir: true,
            size: 0,
            modified: None,
            display_name: None,
        }
    }

    pub(crate) fn from_metadata(name: &str, path: &str, meta: &Metadata) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            display_name: None,
        }
    }

    /// The name to show a person.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// Async filesystem operations over virtual paths.
///
/// Read-class operations require read access, write-class ones write access (on both ends for
/// `rename`). Errors are [`DriveError`](crate::DriveError)s and convert into `io::Error` with
/// the matching kind for consumers that need one.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn stat(&self, path: &str) -> DriveResult<FileInfo>;
    async fn read_dir(&self, path: &str) -> DriveResult<Vec<FileInfo>>;
    async fn read_file(&self, path: &str) -> DriveResult<Vec<u8>>;
    /// Creates or replaces a file. The parent folder must exist.
    async fn write_file(&self, path: &str, data: &[u8]) -> DriveResult<FileInfo>;
    /// Creates a single folder. The parent folder must exist.
    async fn mkdir(&self, path: &str) -> DriveResult<FileInfo>;
    async fn remove_all(&self, path: &str) -> DriveResult<()>;
    /// Moves `from` to `to`. Never overwrites: an existing destination is `AlreadyExists`.
    async fn rename(&self, from: &str, to: &str) -> DriveResult<()>;
}
