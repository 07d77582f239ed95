use super::{FileInfo, FileSystem};
use crate::cache::FolderStats;
use crate::constants::{
    DEFAULT_LOCK_TIMEOUT, HOME_NAMESPACE, MAX_SEARCH_RESULTS, MAX_SEARCH_VISITED,
    SHARED_NAMESPACE, SHARED_WITH_ME_NAMESPACE,
};
use crate::locks::LockInfo;
use crate::paths::{is_within_root, join_virtual, split_parent, validate_component};
use crate::paths::{NamespaceKind, ResolvedPath};
use crate::shares::SharedTarget;
use crate::walk::{self, SearchHit};
use crate::{DriveCore, DriveError, DriveResult, Identity};
use async_trait::async_trait;
use drivefs_types::PermissionLevel;
use std::fs::Metadata;
use std::path::Path;
use std::time::Duration;

/// What a virtual path addresses, decided once per operation.
enum Location {
    /// `/`: the namespace list.
    Root,
    /// `/shared`: one entry per accessible drive.
    SharedIndex,
    /// `/shared-with-me`: one entry per share received.
    SharedWithMeIndex,
    /// `/home`: the caller's home root, created on first use.
    HomeRoot(ResolvedPath),
    /// Anything else under `/home` or `/shared/<drive>`.
    Real(ResolvedPath),
    /// Anything under `/shared-with-me/<id>`, with the caller's display path.
    SharedItem(Box<SharedTarget>, String),
}

impl Location {
    fn resolved(&self) -> Option<&ResolvedPath> {
        match self {
            Location::HomeRoot(r) | Location::Real(r) => Some(r),
            Location::SharedItem(target, _) => Some(&target.path),
            _ => None,
        }
    }

    /// The virtual path as the caller addressed it.
    fn display(&self) -> String {
        match self {
            Location::Root => "/".into(),
            Location::SharedIndex => format!("/{SHARED_NAMESPACE}"),
            Location::SharedWithMeIndex => format!("/{SHARED_WITH_ME_NAMESPACE}"),
            Location::HomeRoot(r) | Location::Real(r) => r.display_path.clone(),
            Location::SharedItem(_, display) => display.clone(),
        }
    }

    /// True for entries a client may never remove, rename or write to directly.
    fn is_fixed(&self) -> bool {
        match self {
            Location::Root | Location::SharedIndex | Location::SharedWithMeIndex => true,
            Location::HomeRoot(_) => true,
            Location::Real(r) => r.is_namespace_root(),
            Location::SharedItem(target, _) => target.is_share_root,
        }
    }
}

fn last_segment(display: &str) -> &str {
    split_parent(display).map(|(_, name)| name).unwrap_or("")
}

/// [`FileSystem`] over the virtual namespace, scoped to one identity.
pub struct VirtualFs {
    core: DriveCore,
    identity: Identity,
    lock_tokens: Vec<String>,
}

impl VirtualFs {
    pub fn new(core: DriveCore, identity: Identity) -> Self {
        Self {
            core,
            identity,
            lock_tokens: Vec::new(),
        }
    }

    /// Lock tokens the client submitted with this request.
    pub fn with_lock_tokens(mut self, tokens: Vec<String>) -> Self {
        self.lock_tokens = tokens;
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn classify(&self, path: &str) -> DriveResult<Location> {
        let resolved = self.core.paths().resolve(path, Some(&self.identity))?;
        let location = match resolved.namespace {
            NamespaceKind::Root => Location::Root,
            NamespaceKind::Shared if resolved.drive.is_none() => Location::SharedIndex,
            NamespaceKind::Shared => Location::Real(resolved),
            NamespaceKind::SharedWithMe if resolved.is_namespace_root() => {
                Location::SharedWithMeIndex
            }
            NamespaceKind::SharedWithMe => {
                let target = self
                    .core
                    .shares()
                    .resolve_shared(&self.identity, &resolved)
                    .await?;
                Location::SharedItem(Box::new(target), resolved.display_path)
            }
            NamespaceKind::Home => {
                if let Some(root) = &resolved.root {
                    tokio::fs::create_dir_all(root).await?;
                }
                if resolved.is_namespace_root() {
                    Location::HomeRoot(resolved)
                } else {
                    Location::Real(resolved)
                }
            }
        };
        Ok(location)
    }

    /// The resolved target of `location` once `level` access is confirmed.
    async fn authorised<'a>(
        &self,
        location: &'a Location,
        level: PermissionLevel,
    ) -> DriveResult<&'a ResolvedPath> {
        let resolved = location
            .resolved()
            .ok_or_else(|| DriveError::access_denied(location.display()))?;
        self.core
            .permissions()
            .require(&self.identity, resolved, level)
            .await?;
        Ok(resolved)
    }

    /// Resolves `path` for a mutation of an existing, non-fixed entry.
    async fn mutable(&self, path: &str) -> DriveResult<Location> {
        let location = self.classify(path).await?;
        if location.is_fixed() {
            return Err(DriveError::access_denied(location.display()));
        }
        self.authorised(&location, PermissionLevel::ReadWrite).await?;
        Ok(location)
    }

    async fn metadata(real: &Path, display: &str) -> DriveResult<Metadata> {
        tokio::fs::symlink_metadata(real)
            .await
            .map_err(|e| DriveError::from_io(e, display))
    }

    async fn require_parent_dir(real: &Path, display: &str) -> DriveResult<()> {
        let parent_display = split_parent(display).map(|(p, _)| p).unwrap_or("/");
        let parent = real
            .parent()
            .ok_or_else(|| DriveError::not_found(parent_display))?;
        let meta = Self::metadata(parent, parent_display).await?;
        if !meta.is_dir() {
            return Err(DriveError::not_found(parent_display));
        }
        Ok(())
    }

    /// Drops cached statistics for `real` and every ancestor up to its namespace root.
    async fn invalidate_stats(&self, resolved: &ResolvedPath, real: &Path) {
        let Some(root) = &resolved.root else {
            return;
        };
        for ancestor in real.ancestors() {
            if !is_within_root(ancestor, root) {
                break;
            }
            self.core.cache().stats().invalidate(ancestor).await;
        }
    }

    async fn bytes_at(&self, real: &Path, meta: &Metadata) -> DriveResult<u64> {
        if meta.is_dir() {
            Ok(self.core.cache().stats().folder_stats(real).await?.total_bytes)
        } else {
            Ok(meta.len())
        }
    }

    fn info(location: &Location, meta: &Metadata) -> FileInfo {
        let display = location.display();
        let mut info = FileInfo::from_metadata(last_segment(&display), &display, meta);
        if let Location::SharedItem(target, _) = location {
            if target.is_share_root {
                info.display_name = Some(target.share.item_name.clone());
            }
        }
        info
    }

    async fn list_drives(&self) -> DriveResult<Vec<FileInfo>> {
        let names = self
            .core
            .permissions()
            .list_accessible_drives(&self.identity)
            .await?;
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let path = join_virtual(&format!("/{SHARED_NAMESPACE}"), &name);
            let mut info = FileInfo::virtual_dir(&name, &path);
            if let Ok(root) = self.core.paths().drive_root(&name) {
                if let Ok(meta) = tokio::fs::metadata(&root).await {
                    info.modified = meta.modified().ok().map(Into::into);
                }
            }
            out.push(info);
        }
        Ok(out)
    }

    async fn list_shared_with_me(&self) -> DriveResult<Vec<FileInfo>> {
        let shares = self.core.shares().shared_with_me(&self.identity).await?;
        let base = format!("/{SHARED_WITH_ME_NAMESPACE}");
        let mut out = Vec::with_capacity(shares.len());
        for share in shares {
            let Some(owner) = self.core.store().user_by_id(share.owner_id).await? else {
                continue;
            };
            let Ok(resolved) = self
                .core
                .paths()
                .resolve_in_home_of(&share.item_path, &owner.identity())
            else {
                continue;
            };
            let Some(real) = resolved.real_path.as_deref() else {
                continue;
            };
            let Ok(meta) = tokio::fs::symlink_metadata(real).await else {
                tracing::debug!(share = %share.id, "shared item no longer exists");
                continue;
            };
            let id = share.id.to_string();
            let mut info = FileInfo::from_metadata(&id, &join_virtual(&base, &id), &meta);
            info.display_name = Some(share.item_name);
            out.push(info);
        }
        Ok(out)
    }

    /// Recursive statistics of a folder.
    pub async fn folder_stats(&self, path: &str) -> DriveResult<FolderStats> {
        let location = self.classify(path).await?;
        let resolved = self.authorised(&location, PermissionLevel::Read).await?;
        self.core
            .cache()
            .stats()
            .folder_stats(resolved.require_real()?)
            .await
    }

    /// Case-insensitive name search beneath a folder.
    pub async fn search(&self, path: &str, query: &str) -> DriveResult<Vec<SearchHit>> {
        let location = self.classify(path).await?;
        let resolved = self.authorised(&location, PermissionLevel::Read).await?;
        let real = resolved.require_real()?.to_path_buf();
        let base = location.display();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || {
            walk::search(&real, &base, &query, MAX_SEARCH_VISITED, MAX_SEARCH_RESULTS)
        })
        .await
        .map_err(|e| DriveError::Io(std::io::Error::other(e)))?
        .map_err(|e| DriveError::from_io(e, path))
    }

    /// Takes an exclusive write lock, creating an empty file when nothing exists at `path`.
    pub async fn lock(
        &self,
        path: &str,
        timeout: Option<Duration>,
        deep: bool,
        owner_note: Option<String>,
    ) -> DriveResult<LockInfo> {
        let location = self.classify(path).await?;
        if matches!(
            location,
            Location::Root | Location::SharedIndex | Location::SharedWithMeIndex
        ) {
            return Err(DriveError::access_denied(location.display()));
        }
        let resolved = self.authorised(&location, PermissionLevel::ReadWrite).await?;
        let real = resolved.require_real()?;
        let display = location.display();

        if tokio::fs::symlink_metadata(real).await.is_err() {
            self.write_file(path, &[]).await?;
        }
        self.core.locks().acquire(
            &self.identity,
            real,
            &display,
            timeout.unwrap_or(DEFAULT_LOCK_TIMEOUT),
            deep,
            owner_note,
        )
    }

    pub async fn refresh_lock(
        &self,
        path: &str,
        token: &str,
        timeout: Option<Duration>,
    ) -> DriveResult<LockInfo> {
        let location = self.classify(path).await?;
        let resolved = self.authorised(&location, PermissionLevel::ReadWrite).await?;
        self.core.locks().refresh(
            &self.identity,
            resolved.require_real()?,
            token,
            timeout.unwrap_or(DEFAULT_LOCK_TIMEOUT),
        )
    }

    pub async fn unlock(&self, path: &str, token: &str) -> DriveResult<()> {
        let location = self.classify(path).await?;
        let resolved = self.authorised(&location, PermissionLevel::ReadWrite).await?;
        self.core
            .locks()
            .release(&self.identity, resolved.require_real()?, token)
    }

    /// Keeps share records in step with a removed or moved item of a home tree.
    ///
    /// Runs after the filesystem change has committed, so a store failure is logged rather than
    /// reported: the caller's operation did happen.
    async fn update_shares(&self, from: &ResolvedPath, to: Option<&ResolvedPath>) {
        let (NamespaceKind::Home, Some(owner)) = (from.namespace, from.home_owner) else {
            return;
        };
        let shares = self.core.shares();
        let result = match to {
            Some(to) if to.namespace == NamespaceKind::Home && to.home_owner == Some(owner) => {
                shares
                    .on_item_moved(owner, &from.display_path, &to.display_path)
                    .await
            }
            _ => shares.on_item_removed(owner, &from.display_path).await,
        };
        if let Err(err) = result {
            tracing::error!(
                %owner,
                path = %from.display_path,
                error = %err,
                "filesystem change committed but share records were not updated"
            );
        }
    }
}

#[async_trait]
impl FileSystem for VirtualFs {
    async fn stat(&self, path: &str) -> DriveResult<FileInfo> {
        let location = self.classify(path).await?;
        match &location {
            Location::Root => Ok(FileInfo::virtual_dir("", "/")),
            Location::SharedIndex => Ok(FileInfo::virtual_dir(
                SHARED_NAMESPACE,
                &location.display(),
            )),
            Location::SharedWithMeIndex => Ok(FileInfo::virtual_dir(
                SHARED_WITH_ME_NAMESPACE,
                &location.display(),
            )),
            _ => {
                let resolved = self.authorised(&location, PermissionLevel::Read).await?;
                let meta = Self::metadata(resolved.require_real()?, &location.display()).await?;
                Ok(Self::info(&location, &meta))
            }
        }
    }

    async fn read_dir(&self, path: &str) -> DriveResult<Vec<FileInfo>> {
        let location = self.classify(path).await?;
        let resolved = match &location {
            Location::Root => {
                return Ok(vec![
                    FileInfo::virtual_dir(HOME_NAMESPACE, &format!("/{HOME_NAMESPACE}")),
                    FileInfo::virtual_dir(SHARED_NAMESPACE, &format!("/{SHARED_NAMESPACE}")),
                ]);
            }
            Location::SharedIndex => return self.list_drives().await,
            Location::SharedWithMeIndex => return self.list_shared_with_me().await,
            _ => self.authorised(&location, PermissionLevel::Read).await?,
        };

        let display = location.display();
        let real = resolved.require_real()?;
        let meta = Self::metadata(real, &display).await?;
        if !meta.is_dir() {
            return Err(DriveError::invalid_input("not a folder"));
        }

        let mut entries = tokio::fs::read_dir(real)
            .await
            .map_err(|e| DriveError::from_io(e, &display))?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            // Symlinks are never served.
            if meta.file_type().is_symlink() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            out.push(FileInfo::from_metadata(
                &name,
                &join_virtual(&display, &name),
                &meta,
            ));
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn read_file(&self, path: &str) -> DriveResult<Vec<u8>> {
        let location = self.classify(path).await?;
        let display = location.display();
        let resolved = self.authorised(&location, PermissionLevel::Read).await?;
        let real = resolved.require_real()?;
        let meta = Self::metadata(real, &display).await?;
        if !meta.is_file() {
            return Err(DriveError::invalid_input("not a file"));
        }
        tokio::fs::read(real)
            .await
            .map_err(|e| DriveError::from_io(e, &display))
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> DriveResult<FileInfo> {
        let location = self.classify(path).await?;
        let display = location.display();
        let overwriting_share = matches!(&location, Location::SharedItem(t, _) if t.is_share_root);
        if location.is_fixed() && !overwriting_share {
            return Err(DriveError::access_denied(display));
        }
        let resolved = self.authorised(&location, PermissionLevel::ReadWrite).await?;
        let real = resolved.require_real()?;

        let existing = tokio::fs::symlink_metadata(real).await.ok();
        let replaced = match &existing {
            Some(meta) if meta.is_dir() => {
                return Err(DriveError::already_exists(display));
            }
            Some(meta) => meta.len(),
            None => {
                validate_component(last_segment(&display))?;
                Self::require_parent_dir(real, &display).await?;
                0
            }
        };

        self.core
            .locks()
            .check_write(&self.identity, real, &display, &self.lock_tokens)?;
        if let Some(drive) = &resolved.drive {
            self.core
                .drives()
                .check_quota(drive, data.len() as u64, replaced)
                .await?;
        }

        tokio::fs::write(real, data)
            .await
            .map_err(|e| DriveError::from_io(e, &display))?;
        self.invalidate_stats(resolved, real).await;
        tracing::debug!(bytes = data.len(), "file written");

        let meta = Self::metadata(real, &display).await?;
        Ok(Self::info(&location, &meta))
    }

    async fn mkdir(&self, path: &str) -> DriveResult<FileInfo> {
        let location = self.classify(path).await?;
        let display = location.display();
        if location.is_fixed() {
            return Err(DriveError::already_exists(display));
        }
        let resolved = self.authorised(&location, PermissionLevel::ReadWrite).await?;
        let real = resolved.require_real()?;
        validate_component(last_segment(&display))?;
        self.core
            .locks()
            .check_write(&self.identity, real, &display, &self.lock_tokens)?;

        tokio::fs::create_dir(real).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DriveError::not_found(split_parent(&display).map(|(p, _)| p).unwrap_or("/"))
            } else {
                DriveError::from_io(e, &display)
            }
        })?;
        self.invalidate_stats(resolved, real).await;

        let meta = Self::metadata(real, &display).await?;
        Ok(Self::info(&location, &meta))
    }

    async fn remove_all(&self, path: &str) -> DriveResult<()> {
        let location = self.mutable(path).await?;
        let display = location.display();
        let resolved = location
            .resolved()
            .ok_or_else(|| DriveError::access_denied(display.clone()))?;
        let real = resolved.require_real()?;
        let meta = Self::metadata(real, &display).await?;

        self.core
            .locks()
            .check_tree(&self.identity, real, &display, &self.lock_tokens)?;
        let removed = if meta.is_dir() {
            tokio::fs::remove_dir_all(real).await
        } else {
            tokio::fs::remove_file(real).await
        };
        removed.map_err(|e| DriveError::from_io(e, &display))?;

        self.core.locks().forget_tree(real);
        self.invalidate_stats(resolved, real).await;
        self.update_shares(resolved, None).await;
        tracing::debug!(folder = meta.is_dir(), "entry removed");
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> DriveResult<()> {
        let source = self.mutable(from).await?;
        let destination = self.classify(to).await?;
        let (from_display, to_display) = (source.display(), destination.display());
        if destination.is_fixed() {
            return Err(DriveError::already_exists(to_display));
        }
        let dst = self
            .authorised(&destination, PermissionLevel::ReadWrite)
            .await?;
        let src = source
            .resolved()
            .ok_or_else(|| DriveError::access_denied(from_display.clone()))?;
        let (src_real, dst_real) = (src.require_real()?, dst.require_real()?);

        let meta = Self::metadata(src_real, &from_display).await?;
        if tokio::fs::symlink_metadata(dst_real).await.is_ok() {
            return Err(DriveError::already_exists(to_display));
        }
        validate_component(last_segment(&to_display))?;
        Self::require_parent_dir(dst_real, &to_display).await?;
        if meta.is_dir() && dst_real.starts_with(src_real) {
            return Err(DriveError::invalid_input("cannot move a folder into itself"));
        }

        let locks = self.core.locks();
        locks.check_tree(&self.identity, src_real, &from_display, &self.lock_tokens)?;
        locks.check_write(&self.identity, dst_real, &to_display, &self.lock_tokens)?;

        if let Some(drive) = &dst.drive {
            if src.drive.as_ref() != Some(drive) {
                let incoming = self.bytes_at(src_real, &meta).await?;
                self.core.drives().check_quota(drive, incoming, 0).await?;
            }
        }

        tokio::fs::rename(src_real, dst_real)
            .await
            .map_err(|e| DriveError::from_io(e, &to_display))?;

        locks.forget_tree(src_real);
        self.invalidate_stats(src, src_real).await;
        self.invalidate_stats(dst, dst_real).await;
        self.update_shares(src, Some(dst)).await;
        tracing::debug!("entry renamed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheService;
    use crate::config::{CacheConfig, CoreConfig};
    use crate::store::{NewUser, SqliteStore, Store};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        core: DriveCore,
        admin: Identity,
        u1: Identity,
        u2: Identity,
    }

    async fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let config = CoreConfig::new(temp.path().to_path_buf(), None).unwrap();
        std::fs::create_dir_all(config.users_root()).unwrap();
        std::fs::create_dir_all(config.drives_root()).unwrap();
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let cache = Arc::new(CacheService::with_external(&CacheConfig::default(), None));

        let mut ids = Vec::new();
        for (login, admin) in [("admin", true), ("u1", false), ("u2", false)] {
            ids.push(
                store
                    .create_user(NewUser {
                        login: login.into(),
                        display_name: login.into(),
                        is_admin: admin,
                    })
                    .await
                    .unwrap()
                    .identity(),
            );
        }
        let core = DriveCore::assemble(config, store, cache);
        let u2 = ids.pop().unwrap();
        let u1 = ids.pop().unwrap();
        let admin = ids.pop().unwrap();
        Fixture {
            _temp: temp,
            core,
            admin,
            u1,
            u2,
        }
    }

    fn names(entries: &[FileInfo]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[tokio::test]
    async fn root_lists_two_namespaces() {
        let f = fixture().await;
        let fs = f.core.fs(f.u1.clone());
        assert_eq!(names(&fs.read_dir("/").await.unwrap()), ["home", "shared"]);
        assert!(fs.stat("/").await.unwrap().is_dir);
        assert!(matches!(
            fs.mkdir("/shared").await,
            Err(DriveError::AlreadyExists(_))
        ));
        assert!(matches!(
            fs.write_file("/shared-with-me", b"x").await,
            Err(DriveError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn home_is_created_lazily_and_writable() {
        let f = fixture().await;
        let fs = f.core.fs(f.u1.clone());
        assert!(fs.read_dir("/home").await.unwrap().is_empty());
        fs.mkdir("/home/reports").await.unwrap();
        let info = fs.write_file("/home/reports/q1.txt", b"hello").await.unwrap();
        assert_eq!(info.size, 5);
        assert_eq!(info.path, "/home/reports/q1.txt");
        assert_eq!(fs.read_file("/home/reports/q1.txt").await.unwrap(), b"hello");

        assert!(matches!(
            fs.write_file("/home/missing/q1.txt", b"x").await,
            Err(DriveError::NotFound(_))
        ));
        assert!(matches!(
            fs.mkdir("/home/reports").await,
            Err(DriveError::AlreadyExists(_))
        ));
        assert!(matches!(
            fs.write_file("/home/bad:name", b"x").await,
            Err(DriveError::InvalidName(_))
        ));
        assert!(matches!(
            fs.remove_all("/home").await,
            Err(DriveError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn rename_never_overwrites() {
        let f = fixture().await;
        let fs = f.core.fs(f.u1.clone());
        fs.write_file("/home/a.txt", b"a").await.unwrap();
        fs.write_file("/home/b.txt", b"b").await.unwrap();
        assert!(matches!(
            fs.rename("/home/a.txt", "/home/b.txt").await,
            Err(DriveError::AlreadyExists(_))
        ));
        fs.rename("/home/a.txt", "/home/c.txt").await.unwrap();
        assert_eq!(names(&fs.read_dir("/home").await.unwrap()), ["b.txt", "c.txt"]);

        fs.mkdir("/home/dir").await.unwrap();
        assert!(matches!(
            fs.rename("/home/dir", "/home/dir/inner").await,
            Err(DriveError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn drive_access_follows_membership() {
        let f = fixture().await;
        let drives = f.core.drives();
        drives.create_drive(&f.admin, "design", 0).await.unwrap();
        drives
            .set_member(&f.admin, "design", "u1", PermissionLevel::ReadWrite)
            .await
            .unwrap();
        drives
            .set_member(&f.admin, "design", "u2", PermissionLevel::Read)
            .await
            .unwrap();

        let fs1 = f.core.fs(f.u1.clone());
        let fs2 = f.core.fs(f.u2.clone());
        assert_eq!(names(&fs2.read_dir("/shared").await.unwrap()), ["design"]);

        fs1.write_file("/shared/design/logo.png", b"png").await.unwrap();
        assert_eq!(fs2.read_file("/shared/design/logo.png").await.unwrap(), b"png");
        assert!(matches!(
            fs2.write_file("/shared/design/x.png", b"x").await,
            Err(DriveError::AccessDenied(_))
        ));
        assert!(matches!(
            fs2.remove_all("/shared/design/logo.png").await,
            Err(DriveError::AccessDenied(_))
        ));
        assert!(matches!(
            fs1.remove_all("/shared/design").await,
            Err(DriveError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn quota_blocks_oversized_writes() {
        let f = fixture().await;
        f.core.drives().create_drive(&f.admin, "small", 8).await.unwrap();
        f.core
            .drives()
            .set_member(&f.admin, "small", "u1", PermissionLevel::ReadWrite)
            .await
            .unwrap();
        let fs = f.core.fs(f.u1.clone());
        fs.write_file("/shared/small/a", b"12345").await.unwrap();
        assert!(matches!(
            fs.write_file("/shared/small/b", b"12345").await,
            Err(DriveError::QuotaExceeded { .. })
        ));
        // Replacing the existing file stays within quota.
        fs.write_file("/shared/small/a", b"12345678").await.unwrap();

        fs.write_file("/home/big", b"123456789").await.unwrap();
        assert!(matches!(
            fs.rename("/home/big", "/shared/small/big").await,
            Err(DriveError::QuotaExceeded { .. })
        ));
    }

    /// U1 shares `/home/brief.pdf` with U2 at read; U2 is a read-write member of `design`.
    #[tokio::test]
    async fn shared_file_and_drive_scenario() {
        let f = fixture().await;
        let fs1 = f.core.fs(f.u1.clone());
        let fs2 = f.core.fs(f.u2.clone());
        fs1.write_file("/home/brief.pdf", b"%PDF").await.unwrap();

        let (share, _) = f
            .core
            .shares()
            .share_item(&f.u1, "/home/brief.pdf", "u2", PermissionLevel::Read, None)
            .await
            .unwrap();
        f.core
            .drives()
            .create_drive(&f.admin, "design", 0)
            .await
            .unwrap();
        f.core
            .drives()
            .set_member(&f.admin, "design", "u2", PermissionLevel::ReadWrite)
            .await
            .unwrap();

        let perms = f.core.permissions();
        let brief = f
            .core
            .paths()
            .resolve_in_home_of("/home/brief.pdf", &f.u1)
            .unwrap();
        assert!(perms.check(&f.u2, &brief, PermissionLevel::Read).await.unwrap());
        assert!(!perms.check(&f.u2, &brief, PermissionLevel::ReadWrite).await.unwrap());
        // In U2's own namespace the same virtual path is U2's own file.
        assert!(perms
            .authorize(&f.u2, "/home/brief.pdf", PermissionLevel::ReadWrite)
            .await
            .unwrap());
        assert!(perms
            .authorize(&f.u2, "/shared/design/x.png", PermissionLevel::ReadWrite)
            .await
            .unwrap());
        assert!(!perms
            .authorize(&f.u1, "/shared/design/x.png", PermissionLevel::Read)
            .await
            .unwrap());

        let listing = fs2.read_dir("/shared-with-me").await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].label(), "brief.pdf");
        let shared_path = format!("/shared-with-me/{}", share.id);
        assert_eq!(fs2.read_file(&shared_path).await.unwrap(), b"%PDF");
        assert!(matches!(
            fs2.write_file(&shared_path, b"edit").await,
            Err(DriveError::AccessDenied(_))
        ));

        // Upgrading the share is visible immediately.
        f.core
            .shares()
            .share_item(&f.u1, "/home/brief.pdf", "u2", PermissionLevel::ReadWrite, None)
            .await
            .unwrap();
        fs2.write_file(&shared_path, b"edited").await.unwrap();
        assert_eq!(fs1.read_file("/home/brief.pdf").await.unwrap(), b"edited");
        assert!(matches!(
            fs2.remove_all(&shared_path).await,
            Err(DriveError::AccessDenied(_))
        ));

        // Removing the item drops the share.
        fs1.remove_all("/home/brief.pdf").await.unwrap();
        assert!(fs2.read_dir("/shared-with-me").await.unwrap().is_empty());
        assert!(f
            .core
            .store()
            .shares_for_recipient(f.u2.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn locks_block_other_writers() {
        let f = fixture().await;
        let fs1 = f.core.fs(f.u1.clone());
        let lock = fs1.lock("/home/doc.txt", None, false, None).await.unwrap();
        assert!(fs1.stat("/home/doc.txt").await.unwrap().size == 0);
        assert!(matches!(
            fs1.write_file("/home/doc.txt", b"x").await,
            Err(DriveError::Locked(_))
        ));
        let fs1 = f.core.fs(f.u1.clone()).with_lock_tokens(vec![lock.token.clone()]);
        fs1.write_file("/home/doc.txt", b"x").await.unwrap();
        fs1.unlock("/home/doc.txt", &lock.token).await.unwrap();
        f.core.fs(f.u1.clone()).remove_all("/home/doc.txt").await.unwrap();
    }

    #[tokio::test]
    async fn stats_and_search_through_virtual_paths() {
        let f = fixture().await;
        let fs = f.core.fs(f.u1.clone());
        fs.mkdir("/home/reports").await.unwrap();
        fs.write_file("/home/reports/Q1.xlsx", b"1234").await.unwrap();
        let stats = fs.folder_stats("/home").await.unwrap();
        assert_eq!((stats.files, stats.folders, stats.total_bytes), (1, 1, 4));

        fs.write_file("/home/reports/q2.xlsx", b"12").await.unwrap();
        assert_eq!(fs.folder_stats("/home").await.unwrap().total_bytes, 6);

        let hits = fs.search("/home", "q2").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/home/reports/q2.xlsx");
    }

    #[tokio::test]
    async fn traversal_is_rejected_before_touching_disk() {
        let f = fixture().await;
        let fs = f.core.fs(f.u1.clone());
        for bad in ["/home/../u2/secret", "/home/%2e%2e/u2", "/etc/passwd"] {
            let err = fs.read_dir(bad).await.unwrap_err();
            assert!(err.is_invalid_path(), "{bad}: {err:?}");
        }
    }

    #[tokio::test]
    async fn share_bookkeeping_failure_does_not_fail_committed_changes() {
        let temp = TempDir::new().unwrap();
        let config = CoreConfig::new(temp.path().to_path_buf(), None).unwrap();
        std::fs::create_dir_all(config.users_root()).unwrap();
        std::fs::create_dir_all(config.drives_root()).unwrap();
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let u1 = store
            .create_user(NewUser {
                login: "u1".into(),
                display_name: "u1".into(),
                is_admin: false,
            })
            .await
            .unwrap()
            .identity();
        let cache = Arc::new(CacheService::with_external(&CacheConfig::default(), None));
        let core = DriveCore::assemble(config, store.clone(), cache);
        let fs = core.fs(u1);

        fs.write_file("/home/a.txt", b"a").await.unwrap();
        fs.write_file("/home/c.txt", b"c").await.unwrap();
        store.execute_raw("DROP TABLE item_shares").unwrap();

        fs.rename("/home/a.txt", "/home/b.txt").await.unwrap();
        assert_eq!(fs.read_file("/home/b.txt").await.unwrap(), b"a");
        assert!(matches!(fs.stat("/home/a.txt").await, Err(DriveError::NotFound(_))));

        fs.remove_all("/home/c.txt").await.unwrap();
        assert!(matches!(fs.stat("/home/c.txt").await, Err(DriveError::NotFound(_))));
    }
}
