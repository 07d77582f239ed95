//! Permission resolution.
//!
//! A request is allowed when any grant mechanism yields a level that satisfies the requested
//! one. Sources are consulted in order (ownership, membership, item share) and the first
//! sufficient grant wins, which makes the effective rule "most permissive applicable grant".
//! Verdicts that needed a store lookup are memoised in the permission cache.

mod grants;

pub use grants::{GrantSource, StoreGrants};

use crate::cache::CacheService;
use crate::paths::{NamespaceKind, PathResolver, ResolvedPath};
use crate::store::Store;
use crate::{DriveError, DriveResult, Identity};
use drivefs_types::PermissionLevel;
use std::sync::Arc;

pub struct PermissionResolver {
    paths: Arc<PathResolver>,
    grants: Arc<dyn GrantSource>,
    store: Arc<dyn Store>,
    cache: Arc<CacheService>,
}

impl PermissionResolver {
    pub fn new(
        paths: Arc<PathResolver>,
        store: Arc<dyn Store>,
        cache: Arc<CacheService>,
    ) -> Self {
        Self::with_grants(paths, Arc::new(StoreGrants::new(store.clone())), store, cache)
    }

    pub fn with_grants(
        paths: Arc<PathResolver>,
        grants: Arc<dyn GrantSource>,
        store: Arc<dyn Store>,
        cache: Arc<CacheService>,
    ) -> Self {
        Self {
            paths,
            grants,
            store,
            cache,
        }
    }

    /// Whether `identity` may access `virtual_path` (in its own namespace) at `level`.
    ///
    /// # Errors
    /// Any path rejection from the resolver, or a store failure.
    pub async fn authorize(
        &self,
        identity: &Identity,
        virtual_path: &str,
        level: PermissionLevel,
    ) -> DriveResult<bool> {
        let resolved = self.paths.resolve(virtual_path, Some(identity))?;
        self.check(identity, &resolved, level).await
    }

    /// Whether `identity` may access an already resolved path at `level`.
    ///
    /// For `/home` paths resolved in another actor's tree (see
    /// [`PathResolver::resolve_in_home_of`]) only item shares from that actor can grant access.
    pub async fn check(
        &self,
        identity: &Identity,
        path: &ResolvedPath,
        level: PermissionLevel,
    ) -> DriveResult<bool> {
        match path.namespace {
            NamespaceKind::Root | NamespaceKind::SharedWithMe if path.is_namespace_root() => {
                return Ok(level == PermissionLevel::Read);
            }
            // Items below /shared-with-me are authorised after translation to the owner's path.
            NamespaceKind::Root | NamespaceKind::SharedWithMe => return Ok(false),
            NamespaceKind::Shared if path.drive.is_none() => {
                return Ok(level == PermissionLevel::Read);
            }
            NamespaceKind::Home if path.home_owner == Some(identity.id) => return Ok(true),
            _ => {}
        }

        let permissions = self.cache.permissions();
        let ticket = permissions.ticket(identity.id);
        if let Some(allowed) = permissions
            .verdict(identity.id, level, path.home_owner, &path.display_path)
            .await
        {
            return Ok(allowed);
        }

        let allowed = self.evaluate(identity, path, level).await?;
        permissions
            .store_verdict(&ticket, level, path.home_owner, &path.display_path, allowed)
            .await;
        if !allowed {
            tracing::debug!(actor = %identity.id, level = %level, "access denied");
        }
        Ok(allowed)
    }

    async fn evaluate(
        &self,
        identity: &Identity,
        path: &ResolvedPath,
        level: PermissionLevel,
    ) -> DriveResult<bool> {
        let satisfied = |granted: Option<PermissionLevel>| granted.is_some_and(|g| g.satisfies(level));

        if satisfied(self.grants.ownership(identity, path).await?) {
            return Ok(true);
        }
        if let Some(drive) = path.drive.as_deref() {
            if satisfied(self.grants.membership(identity, drive).await?) {
                return Ok(true);
            }
        }
        if let (NamespaceKind::Home, Some(owner)) = (path.namespace, path.home_owner) {
            if owner != identity.id
                && satisfied(
                    self.grants
                        .item_share(identity, owner, &path.display_path)
                        .await?,
                )
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Like [`check`](Self::check) but maps a denial onto `AccessDenied`.
    pub async fn require(
        &self,
        identity: &Identity,
        path: &ResolvedPath,
        level: PermissionLevel,
    ) -> DriveResult<()> {
        if self.check(identity, path, level).await? {
            Ok(())
        } else {
            Err(DriveError::access_denied(path.display_path.clone()))
        }
    }

    /// Names of the drives `identity` can see: active drives it is a member of, plus drives it
    /// created when it is an administrator. Sorted, cached per actor.
    pub async fn list_accessible_drives(&self, identity: &Identity) -> DriveResult<Vec<String>> {
        let permissions = self.cache.permissions();
        let ticket = permissions.ticket(identity.id);
        if let Some(drives) = permissions.drive_list(identity.id).await {
            return Ok(drives);
        }

        let mut names: Vec<String> = self
            .store
            .drives_for_member(identity.id)
            .await?
            .into_iter()
            .map(|d| d.name)
            .collect();
        if identity.is_admin {
            names.extend(
                self.store
                    .drives_owned_by(identity.id)
                    .await?
                    .into_iter()
                    .filter(|d| d.active)
                    .map(|d| d.name),
            );
        }
        names.sort();
        names.dedup();

        permissions.store_drive_list(&ticket, &names).await;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::store::{NewShare, NewUser, SqliteStore, UserRecord};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: Arc<SqliteStore>,
        paths: Arc<PathResolver>,
        resolver: PermissionResolver,
    }

    async fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let paths = Arc::new(PathResolver::new(
            temp.path().join("users"),
            temp.path().join("drives"),
        ));
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let cache = Arc::new(CacheService::with_external(&CacheConfig::default(), None));
        let resolver = PermissionResolver::new(paths.clone(), store.clone(), cache);
        Fixture {
            _temp: temp,
            store,
            paths,
            resolver,
        }
    }

    async fn user(store: &SqliteStore, login: &str, admin: bool) -> UserRecord {
        store
            .create_user(NewUser {
                login: login.into(),
                display_name: login.into(),
                is_admin: admin,
            })
            .await
            .unwrap()
    }

    fn folder_share(owner: &UserRecord, to: &UserRecord, path: &str, level: PermissionLevel) -> NewShare {
        NewShare {
            item_path: path.into(),
            item_name: path.rsplit('/').next().unwrap().into(),
            is_folder: true,
            owner_id: owner.id,
            recipient_id: to.id,
            permission: level,
            message: None,
        }
    }

    #[tokio::test]
    async fn own_home_is_read_write() {
        let f = fixture().await;
        let u = user(&f.store, "alice", false).await.identity();
        assert!(f
            .resolver
            .authorize(&u, "/home/anything/deep", PermissionLevel::ReadWrite)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn namespace_indexes_are_read_only() {
        let f = fixture().await;
        let u = user(&f.store, "alice", false).await.identity();
        for path in ["/", "/shared", "/shared-with-me"] {
            assert!(f.resolver.authorize(&u, path, PermissionLevel::Read).await.unwrap());
            assert!(!f
                .resolver
                .authorize(&u, path, PermissionLevel::ReadWrite)
                .await
                .unwrap());
        }
    }

    #[tokio::test]
    async fn membership_requires_level_and_active_drive() {
        let f = fixture().await;
        let admin = user(&f.store, "admin", true).await;
        let bob = user(&f.store, "bob", false).await;
        let drive = f.store.create_drive("design", 0, admin.id).await.unwrap();
        f.store
            .set_member(drive.id, bob.id, PermissionLevel::Read)
            .await
            .unwrap();
        let bob = bob.identity();

        let r = &f.resolver;
        assert!(r.authorize(&bob, "/shared/design/x", PermissionLevel::Read).await.unwrap());
        assert!(!r
            .authorize(&bob, "/shared/design/x", PermissionLevel::ReadWrite)
            .await
            .unwrap());
        assert!(!r.authorize(&bob, "/shared/other", PermissionLevel::Read).await.unwrap());

        // Admin creator has implicit access.
        assert!(r
            .authorize(&admin.identity(), "/shared/design", PermissionLevel::ReadWrite)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn folder_share_covers_descendants_only() {
        let f = fixture().await;
        let owner = user(&f.store, "u1", false).await;
        let guest = user(&f.store, "u2", false).await;
        f.store
            .upsert_share(folder_share(&owner, &guest, "/home/reports", PermissionLevel::Read))
            .await
            .unwrap();
        let (owner, guest) = (owner.identity(), guest.identity());

        let check = |path: &'static str, level| {
            let resolved = f.paths.resolve_in_home_of(path, &owner).unwrap();
            let resolver = &f.resolver;
            let guest = guest.clone();
            async move { resolver.check(&guest, &resolved, level).await.unwrap() }
        };
        assert!(check("/home/reports", PermissionLevel::Read).await);
        assert!(check("/home/reports/2024/q1.xlsx", PermissionLevel::Read).await);
        assert!(!check("/home/reports/2024/q1.xlsx", PermissionLevel::ReadWrite).await);
        assert!(!check("/home/reports-old/x", PermissionLevel::Read).await);
        assert!(!check("/home", PermissionLevel::Read).await);
    }

    #[tokio::test]
    async fn most_permissive_grant_wins() {
        let f = fixture().await;
        let owner = user(&f.store, "u1", false).await;
        let guest = user(&f.store, "u2", false).await;
        f.store
            .upsert_share(folder_share(&owner, &guest, "/home/a", PermissionLevel::Read))
            .await
            .unwrap();
        f.store
            .upsert_share(folder_share(&owner, &guest, "/home/a/b", PermissionLevel::ReadWrite))
            .await
            .unwrap();

        let resolved = f
            .paths
            .resolve_in_home_of("/home/a/b/c.txt", &owner.identity())
            .unwrap();
        assert!(f
            .resolver
            .check(&guest.identity(), &resolved, PermissionLevel::ReadWrite)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn accessible_drives_are_cached_and_sorted() {
        let f = fixture().await;
        let admin = user(&f.store, "admin", true).await;
        let bob = user(&f.store, "bob", false).await;
        for name in ["zeta", "alpha", "hidden"] {
            let d = f.store.create_drive(name, 0, admin.id).await.unwrap();
            if name != "hidden" {
                f.store
                    .set_member(d.id, bob.id, PermissionLevel::Read)
                    .await
                    .unwrap();
            }
        }
        let bob = bob.identity();
        assert_eq!(
            f.resolver.list_accessible_drives(&bob).await.unwrap(),
            ["alpha", "zeta"]
        );
        assert_eq!(
            f.resolver.list_accessible_drives(&admin.identity()).await.unwrap(),
            ["alpha", "hidden", "zeta"]
        );
    }

    /// Grants membership, but a drive invalidation lands while each lookup is in flight.
    struct InvalidatedMidway {
        cache: Arc<CacheService>,
        lookups: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl GrantSource for InvalidatedMidway {
        async fn ownership(
            &self,
            _identity: &Identity,
            _path: &ResolvedPath,
        ) -> DriveResult<Option<PermissionLevel>> {
            Ok(None)
        }

        async fn membership(
            &self,
            _identity: &Identity,
            drive: &str,
        ) -> DriveResult<Option<PermissionLevel>> {
            self.lookups.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.cache.permissions().invalidate_drive(drive).await;
            Ok(Some(PermissionLevel::Read))
        }

        async fn item_share(
            &self,
            _identity: &Identity,
            _owner: uuid::Uuid,
            _path: &str,
        ) -> DriveResult<Option<PermissionLevel>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn verdict_racing_an_invalidation_is_not_cached() {
        let temp = TempDir::new().unwrap();
        let paths = Arc::new(PathResolver::new(
            temp.path().join("users"),
            temp.path().join("drives"),
        ));
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let cache = Arc::new(CacheService::with_external(&CacheConfig::default(), None));
        let grants = Arc::new(InvalidatedMidway {
            cache: cache.clone(),
            lookups: Default::default(),
        });
        let resolver = PermissionResolver::with_grants(paths, grants.clone(), store.clone(), cache);
        let bob = user(&store, "bob", false).await.identity();

        for expected in 1..=2 {
            assert!(resolver
                .authorize(&bob, "/shared/design/x.png", PermissionLevel::Read)
                .await
                .unwrap());
            assert_eq!(grants.lookups.load(std::sync::atomic::Ordering::SeqCst), expected);
        }
    }
}
