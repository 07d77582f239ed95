//! # DriveFS Core
//!
//! Virtual filesystem and access-control layer of the DriveFS file store.
//!
//! This crate contains everything between an authenticated request and the disk:
//! - Path resolution from virtual paths (`/home`, `/shared/<drive>`, `/shared-with-me`) onto
//!   the storage tree, with root containment guarantees
//! - Permission resolution over ownership, drive membership and item shares
//! - Two-tier caching of permission verdicts, drive lists and folder statistics
//! - The authoritative SQLite store and the admin/owner services that mutate it
//! - The [`vfs::FileSystem`] adapter the protocol surfaces are built on
//!
//! **No API concerns**: authentication, HTTP and WebDAV servers belong in `api-shared`,
//! `api-rest` and `api-dav`.

pub mod cache;
pub mod config;
pub mod constants;
pub mod drives;
mod error;
mod identity;
pub mod locks;
pub mod paths;
pub mod permissions;
pub mod shares;
pub mod store;
pub mod vfs;
pub mod walk;

pub use drivefs_types::PermissionLevel;
pub use error::{DriveError, DriveResult};
pub use identity::Identity;

use cache::CacheService;
use config::{CacheConfig, CoreConfig};
use drives::DriveService;
use locks::LockTable;
use paths::PathResolver;
use permissions::PermissionResolver;
use shares::ShareService;
use std::sync::Arc;
use store::{SqliteStore, Store};
use vfs::VirtualFs;

/// The assembled core services.
///
/// Cheap to clone; every field is shared. Surfaces hold one of these in their state and
/// derive a per-request [`VirtualFs`] from it.
#[derive(Clone)]
pub struct DriveCore {
    config: Arc<CoreConfig>,
    store: Arc<dyn Store>,
    cache: Arc<CacheService>,
    paths: Arc<PathResolver>,
    permissions: Arc<PermissionResolver>,
    drives: Arc<DriveService>,
    shares: Arc<ShareService>,
    locks: Arc<LockTable>,
}

impl DriveCore {
    /// Opens the store and caches described by `config` and wires the services together.
    ///
    /// Creates the data directory layout when missing.
    ///
    /// # Errors
    /// Returns `DriveError::Io` if the directories cannot be created, or `DriveError::Store`
    /// if the database cannot be opened.
    pub async fn open(config: CoreConfig, cache_config: &CacheConfig) -> DriveResult<Self> {
        tokio::fs::create_dir_all(config.users_root()).await?;
        tokio::fs::create_dir_all(config.drives_root()).await?;
        if let Some(parent) = config.database_path().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let store = Arc::new(SqliteStore::open(config.database_path())?);
        let cache = Arc::new(CacheService::open(cache_config).await);
        tracing::info!(data_dir = %config.data_dir().display(), external_cache = cache.has_external(), "core opened");
        Ok(Self::assemble(config, store, cache))
    }

    /// Wires the services over an existing store and cache service.
    pub fn assemble(config: CoreConfig, store: Arc<dyn Store>, cache: Arc<CacheService>) -> Self {
        let paths = Arc::new(PathResolver::new(config.users_root(), config.drives_root()));
        Self {
            permissions: Arc::new(PermissionResolver::new(
                paths.clone(),
                store.clone(),
                cache.clone(),
            )),
            drives: Arc::new(DriveService::new(store.clone(), paths.clone(), cache.clone())),
            shares: Arc::new(ShareService::new(store.clone(), paths.clone(), cache.clone())),
            locks: Arc::new(LockTable::new()),
            config: Arc::new(config),
            store,
            cache,
            paths,
        }
    }

    /// A filesystem view scoped to `identity`.
    pub fn fs(&self, identity: Identity) -> VirtualFs {
        VirtualFs::new(self.clone(), identity)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    pub fn permissions(&self) -> &PermissionResolver {
        &self.permissions
    }

    pub fn drives(&self) -> &DriveService {
        &self.drives
    }

    pub fn shares(&self) -> &ShareService {
        &self.shares
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Shutdown hook.
    pub async fn close(&self) {
        self.cache.close().await;
    }
}
