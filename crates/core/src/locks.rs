//! Advisory write locks for WebDAV clients.
//!
//! Memory-resident and per-process: locks do not survive a restart and are not shared between
//! instances. Keys are real paths so that the same file reached through different virtual
//! paths (an owner's `/home/...` and a recipient's `/shared-with-me/...`) shares one lock.

use crate::constants::MAX_LOCK_TIMEOUT;
use crate::{DriveError, DriveResult, Identity};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub token: String,
    /// Virtual path the lock was taken through.
    pub display_path: String,
    pub owner: Uuid,
    /// Free-form owner description supplied by the client.
    pub owner_note: Option<String>,
    /// The lock covers the whole subtree.
    pub deep: bool,
    pub timeout: Duration,
    expires_at: Instant,
}

impl LockInfo {
    fn covers(&self, locked: &Path, target: &Path) -> bool {
        target == locked || (self.deep && target.starts_with(locked))
    }

    fn expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

#[derive(Default)]
pub struct LockTable {
    locks: DashMap<PathBuf, LockInfo>,
    /// Serialises the conflict scan and insert of `acquire`. A conflict can sit on an ancestor
    /// or descendant key, so a per-key entry lock is not enough.
    acquiring: Mutex<()>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired locks.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.locks.retain(|_, lock| !lock.expired(now));
    }

    /// Live locks that cover `target` or, when `deep`, lie anywhere under it.
    fn conflicts(&self, target: &Path, deep: bool) -> Vec<(PathBuf, LockInfo)> {
        let now = Instant::now();
        self.locks
            .iter()
            .filter(|e| !e.value().expired(now))
            .filter(|e| e.value().covers(e.key(), target) || (deep && e.key().starts_with(target)))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Takes an exclusive lock on `real_path`.
    ///
    /// # Errors
    /// `Locked` if any live lock covers the path or, for a deep lock, any path under it.
    pub fn acquire(
        &self,
        identity: &Identity,
        real_path: &Path,
        display_path: &str,
        timeout: Duration,
        deep: bool,
        owner_note: Option<String>,
    ) -> DriveResult<LockInfo> {
        let _gate = self.acquiring.lock();
        self.sweep();
        if !self.conflicts(real_path, deep).is_empty() {
            return Err(DriveError::Locked(display_path.to_string()));
        }
        let timeout = timeout.min(MAX_LOCK_TIMEOUT);
        let lock = LockInfo {
            token: format!("opaquelocktoken:{}", Uuid::new_v4()),
            display_path: display_path.to_string(),
            owner: identity.id,
            owner_note,
            deep,
            timeout,
            expires_at: Instant::now() + timeout,
        };
        self.locks.insert(real_path.to_path_buf(), lock.clone());
        tracing::debug!(path = display_path, "lock acquired");
        Ok(lock)
    }

    /// Extends the lock identified by `token` on `real_path`.
    pub fn refresh(
        &self,
        identity: &Identity,
        real_path: &Path,
        token: &str,
        timeout: Duration,
    ) -> DriveResult<LockInfo> {
        let mut entry = self
            .locks
            .get_mut(real_path)
            .filter(|l| l.token == token && l.owner == identity.id && !l.expired(Instant::now()))
            .ok_or_else(|| DriveError::not_found("lock"))?;
        entry.timeout = timeout.min(MAX_LOCK_TIMEOUT);
        entry.expires_at = Instant::now() + entry.timeout;
        Ok(entry.value().clone())
    }

    /// Releases the lock identified by `token` on `real_path`.
    pub fn release(&self, identity: &Identity, real_path: &Path, token: &str) -> DriveResult<()> {
        let removed = self
            .locks
            .remove_if(real_path, |_, l| l.token == token && l.owner == identity.id);
        match removed {
            Some(_) => Ok(()),
            None => Err(DriveError::not_found("lock")),
        }
    }

    /// Fails with `Locked` unless every live lock covering `real_path` is held by `identity`
    /// and its token was submitted.
    pub fn check_write(
        &self,
        identity: &Identity,
        real_path: &Path,
        display_path: &str,
        tokens: &[String],
    ) -> DriveResult<()> {
        let blocked = self
            .conflicts(real_path, false)
            .into_iter()
            .any(|(_, lock)| lock.owner != identity.id || !tokens.contains(&lock.token));
        if blocked {
            return Err(DriveError::Locked(display_path.to_string()));
        }
        Ok(())
    }

    /// Like [`check_write`](Self::check_write) but also refuses when anything under
    /// `real_path` is locked. Used before removing or moving a directory.
    pub fn check_tree(
        &self,
        identity: &Identity,
        real_path: &Path,
        display_path: &str,
        tokens: &[String],
    ) -> DriveResult<()> {
        let blocked = self
            .conflicts(real_path, true)
            .into_iter()
            .any(|(_, lock)| lock.owner != identity.id || !tokens.contains(&lock.token));
        if blocked {
            return Err(DriveError::Locked(display_path.to_string()));
        }
        Ok(())
    }

    /// Forgets every lock on or under `real_path` once it no longer exists.
    pub fn forget_tree(&self, real_path: &Path) {
        self.locks.retain(|path, _| !path.starts_with(real_path));
    }

    /// The live lock on exactly `real_path`, if any.
    pub fn lock_on(&self, real_path: &Path) -> Option<LockInfo> {
        self.locks
            .get(real_path)
            .filter(|l| !l.expired(Instant::now()))
            .map(|l| l.value().clone())
    }
}
