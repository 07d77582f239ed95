//! Shared drive administration.
//!
//! Every mutation fires its cache invalidation hook before returning, so a caller that sees
//! the call succeed will never be served a verdict computed from the previous state.

use crate::cache::{CacheService, FolderStats};
use crate::paths::{validate_component, PathResolver};
use crate::store::{Drive, DriveMember, DriveUpdate, Store, UserRecord};
use crate::{DriveError, DriveResult, Identity};
use drivefs_types::PermissionLevel;
use std::sync::Arc;

pub struct DriveService {
    store: Arc<dyn Store>,
    paths: Arc<PathResolver>,
    cache: Arc<CacheService>,
}

fn require_admin(actor: &Identity) -> DriveResult<()> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(DriveError::access_denied("administrator privileges required"))
    }
}

impl DriveService {
    pub fn new(store: Arc<dyn Store>, paths: Arc<PathResolver>, cache: Arc<CacheService>) -> Self {
        Self { store, paths, cache }
    }

    async fn drive(&self, name: &str) -> DriveResult<Drive> {
        self.store
            .drive_by_name(name)
            .await?
            .ok_or_else(|| DriveError::not_found(format!("drive {name}")))
    }

    async fn user(&self, login: &str) -> DriveResult<UserRecord> {
        self.store
            .user_by_login(login)
            .await?
            .ok_or_else(|| DriveError::not_found(format!("user {login}")))
    }

    /// Creates a drive and its directory.
    ///
    /// # Errors
    /// - `AccessDenied` unless `actor` is an administrator
    /// - `InvalidName` if `name` is not a valid path component
    /// - `AlreadyExists` if a drive with that name exists
    pub async fn create_drive(
        &self,
        actor: &Identity,
        name: &str,
        quota_bytes: u64,
    ) -> DriveResult<Drive> {
        require_admin(actor)?;
        let name = validate_component(name)?;
        let root = self.paths.drive_root(name.as_str())?;

        let drive = self
            .store
            .create_drive(name.as_str(), quota_bytes, actor.id)
            .await?;
        tokio::fs::create_dir_all(&root).await?;

        self.cache.permissions().invalidate_user(actor.id).await;
        tracing::info!(drive = %drive.name, "drive created");
        Ok(drive)
    }

    /// Deletes a drive, its memberships and its directory.
    ///
    /// The store rows go first. A failure removing the directory afterwards is logged and
    /// not rolled back.
    pub async fn delete_drive(&self, actor: &Identity, name: &str) -> DriveResult<Drive> {
        require_admin(actor)?;
        let root = self.paths.drive_root(name)?;
        let drive = self
            .store
            .delete_drive(name)
            .await?
            .ok_or_else(|| DriveError::not_found(format!("drive {name}")))?;

        self.cache.permissions().invalidate_drive(name).await;
        self.cache.stats().invalidate(&root).await;

        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(drive = name, error = %e, "drive deleted but its directory could not be removed");
            }
        }
        tracing::info!(drive = name, "drive deleted");
        Ok(drive)
    }

    /// Changes a drive's quota and/or active flag.
    pub async fn update_drive(
        &self,
        actor: &Identity,
        name: &str,
        update: DriveUpdate,
    ) -> DriveResult<Drive> {
        require_admin(actor)?;
        let drive = self
            .store
            .update_drive(name, update)
            .await?
            .ok_or_else(|| DriveError::not_found(format!("drive {name}")))?;
        self.cache.permissions().invalidate_drive(name).await;
        Ok(drive)
    }

    /// Adds `login` to the drive or changes its level.
    pub async fn set_member(
        &self,
        actor: &Identity,
        drive: &str,
        login: &str,
        permission: PermissionLevel,
    ) -> DriveResult<()> {
        require_admin(actor)?;
        let drive = self.drive(drive).await?;
        let user = self.user(login).await?;
        self.store.set_member(drive.id, user.id, permission).await?;
        self.cache.permissions().invalidate_user(user.id).await;
        tracing::info!(drive = %drive.name, member = login, permission = %permission, "drive member set");
        Ok(())
    }

    /// Removes `login` from the drive. Returns whether a membership existed.
    pub async fn remove_member(
        &self,
        actor: &Identity,
        drive: &str,
        login: &str,
    ) -> DriveResult<bool> {
        require_admin(actor)?;
        let drive = self.drive(drive).await?;
        let user = self.user(login).await?;
        let removed = self.store.remove_member(drive.id, user.id).await?;
        self.cache.permissions().invalidate_user(user.id).await;
        Ok(removed)
    }

    pub async fn list_drives(&self, actor: &Identity) -> DriveResult<Vec<Drive>> {
        require_admin(actor)?;
        self.store.list_drives().await
    }

    pub async fn members(&self, actor: &Identity, drive: &str) -> DriveResult<Vec<DriveMember>> {
        require_admin(actor)?;
        let drive = self.drive(drive).await?;
        self.store.drive_members(drive.id).await
    }

    /// Current usage of a drive, from the stats cache.
    pub async fn usage(&self, name: &str) -> DriveResult<FolderStats> {
        let root = self.paths.drive_root(name)?;
        match self.cache.stats().folder_stats(&root).await {
            Err(DriveError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(FolderStats::default())
            }
            other => other,
        }
    }

    /// Rejects a write of `incoming` bytes replacing `replaced` bytes if it would take the drive
    /// past its quota.
    pub async fn check_quota(&self, name: &str, incoming: u64, replaced: u64) -> DriveResult<()> {
        let drive = self.drive(name).await?;
        if drive.quota_bytes == 0 {
            return Ok(());
        }
        let used = self.usage(name).await?.total_bytes;
        let projected = used.saturating_sub(replaced).saturating_add(incoming);
        if projected > drive.quota_bytes {
            return Err(DriveError::QuotaExceeded { drive: drive.name });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::permissions::PermissionResolver;
    use crate::store::{NewUser, SqliteStore};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: Arc<SqliteStore>,
        paths: Arc<PathResolver>,
        drives: DriveService,
        permissions: PermissionResolver,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let paths = Arc::new(PathResolver::new(
            temp.path().join("users"),
            temp.path().join("drives"),
        ));
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let cache = Arc::new(CacheService::with_external(&CacheConfig::default(), None));
        Fixture {
            drives: DriveService::new(store.clone(), paths.clone(), cache.clone()),
            permissions: PermissionResolver::new(paths.clone(), store.clone(), cache),
            _temp: temp,
            store,
            paths,
        }
    }

    async fn user(store: &SqliteStore, login: &str, admin: bool) -> Identity {
        store
            .create_user(NewUser {
                login: login.into(),
                display_name: login.into(),
                is_admin: admin,
            })
            .await
            .unwrap()
            .identity()
    }

    #[tokio::test]
    async fn only_admins_manage_drives() {
        let f = fixture();
        let bob = user(&f.store, "bob", false).await;
        assert!(matches!(
            f.drives.create_drive(&bob, "design", 0).await,
            Err(DriveError::AccessDenied(_))
        ));
        let admin = user(&f.store, "admin", true).await;
        assert!(matches!(
            f.drives.create_drive(&admin, "bad/name", 0).await,
            Err(DriveError::InvalidName(_))
        ));
        f.drives.create_drive(&admin, "design", 0).await.unwrap();
        assert!(f.paths.drive_root("design").unwrap().is_dir());
    }

    #[tokio::test]
    async fn membership_changes_are_visible_immediately() {
        let f = fixture();
        let admin = user(&f.store, "admin", true).await;
        let bob = user(&f.store, "bob", false).await;
        f.drives.create_drive(&admin, "design", 0).await.unwrap();

        let write = PermissionLevel::ReadWrite;
        assert!(!f.permissions.authorize(&bob, "/shared/design", write).await.unwrap());
        assert!(f.permissions.list_accessible_drives(&bob).await.unwrap().is_empty());

        f.drives.set_member(&admin, "design", "bob", write).await.unwrap();
        assert!(f.permissions.authorize(&bob, "/shared/design", write).await.unwrap());
        assert_eq!(f.permissions.list_accessible_drives(&bob).await.unwrap(), ["design"]);

        f.drives
            .set_member(&admin, "design", "bob", PermissionLevel::Read)
            .await
            .unwrap();
        assert!(!f.permissions.authorize(&bob, "/shared/design", write).await.unwrap());

        assert!(f.drives.remove_member(&admin, "design", "bob").await.unwrap());
        assert!(!f
            .permissions
            .authorize(&bob, "/shared/design", PermissionLevel::Read)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn deactivate_and_delete_invalidate() {
        let f = fixture();
        let admin = user(&f.store, "admin", true).await;
        let bob = user(&f.store, "bob", false).await;
        f.drives.create_drive(&admin, "design", 0).await.unwrap();
        f.drives
            .set_member(&admin, "design", "bob", PermissionLevel::Read)
            .await
            .unwrap();
        let read = PermissionLevel::Read;
        assert!(f.permissions.authorize(&bob, "/shared/design/a", read).await.unwrap());

        f.drives
            .update_drive(&admin, "design", DriveUpdate { active: Some(false), quota_bytes: None })
            .await
            .unwrap();
        assert!(!f.permissions.authorize(&bob, "/shared/design/a", read).await.unwrap());
        assert!(f.permissions.list_accessible_drives(&bob).await.unwrap().is_empty());

        f.drives.delete_drive(&admin, "design").await.unwrap();
        assert!(!f.paths.drive_root("design").unwrap().exists());
        assert!(matches!(
            f.drives.delete_drive(&admin, "design").await,
            Err(DriveError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleting_an_active_drive_revokes_warmed_verdicts() {
        let temp = TempDir::new().unwrap();
        let paths = Arc::new(PathResolver::new(
            temp.path().join("users"),
            temp.path().join("drives"),
        ));
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let external = Arc::new(crate::cache::MemoryExternalCache::new());
        let cache = Arc::new(CacheService::with_external(&CacheConfig::default(), Some(external)));
        let drives = DriveService::new(store.clone(), paths.clone(), cache.clone());
        let permissions = PermissionResolver::new(paths, store.clone(), cache);

        let admin = user(&store, "admin", true).await;
        let bob = user(&store, "bob", false).await;
        drives.create_drive(&admin, "design", 0).await.unwrap();
        drives
            .set_member(&admin, "design", "bob", PermissionLevel::ReadWrite)
            .await
            .unwrap();

        let write = PermissionLevel::ReadWrite;
        assert!(permissions.authorize(&bob, "/shared/design/x.png", write).await.unwrap());
        assert_eq!(permissions.list_accessible_drives(&bob).await.unwrap(), ["design"]);

        drives.delete_drive(&admin, "design").await.unwrap();
        assert!(!permissions.authorize(&bob, "/shared/design/x.png", write).await.unwrap());
        assert!(!permissions
            .authorize(&bob, "/shared/design/x.png", PermissionLevel::Read)
            .await
            .unwrap());
        assert!(permissions.list_accessible_drives(&bob).await.unwrap().is_empty());

        // A new drive under the old name starts with no members.
        drives.create_drive(&admin, "design", 0).await.unwrap();
        assert!(!permissions
            .authorize(&bob, "/shared/design/x.png", PermissionLevel::Read)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn quota_is_enforced() {
        let f = fixture();
        let admin = user(&f.store, "admin", true).await;
        f.drives.create_drive(&admin, "small", 10).await.unwrap();
        std::fs::write(f.paths.drive_root("small").unwrap().join("a"), b"123456").unwrap();

        f.drives.check_quota("small", 4, 0).await.unwrap();
        assert!(matches!(
            f.drives.check_quota("small", 5, 0).await,
            Err(DriveError::QuotaExceeded { .. })
        ));
        // Overwriting the existing file frees its bytes first.
        f.drives.check_quota("small", 10, 6).await.unwrap();

        f.drives.create_drive(&admin, "unlimited", 0).await.unwrap();
        f.drives.check_quota("unlimited", u64::MAX, 0).await.unwrap();
    }
}
