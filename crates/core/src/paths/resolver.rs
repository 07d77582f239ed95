//! Virtual path → real path resolution.

use super::sanitise::{clean, is_within_root, screen_raw, segments};
use crate::constants::{HOME_NAMESPACE, SHARED_NAMESPACE, SHARED_WITH_ME_NAMESPACE};
use crate::{DriveError, DriveResult, Identity};
use drivefs_types::PathComponent;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// The namespace a virtual path belongs to, derived purely from its first segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    /// `/` itself; enumerates the namespaces and never touches the filesystem.
    Root,
    Home,
    Shared,
    /// Virtual namespace whose members are resolved one by one through share records.
    SharedWithMe,
}

impl NamespaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceKind::Root => "root",
            NamespaceKind::Home => HOME_NAMESPACE,
            NamespaceKind::Shared => SHARED_NAMESPACE,
            NamespaceKind::SharedWithMe => SHARED_WITH_ME_NAMESPACE,
        }
    }
}

/// The outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub namespace: NamespaceKind,
    /// Cleaned virtual path, safe to show to the caller.
    pub display_path: String,
    /// Location on disk; `None` for the root and shared-with-me namespaces.
    pub real_path: Option<PathBuf>,
    /// The root `real_path` is guaranteed to be contained in.
    pub root: Option<PathBuf>,
    /// Drive name for paths under `/shared/<drive>`.
    pub drive: Option<String>,
    /// Owner of the home tree for `/home` paths.
    pub home_owner: Option<Uuid>,
    /// Path inside the namespace root (or inside the drive for shared paths), `/` for the
    /// root itself.
    pub inner: String,
}

impl ResolvedPath {
    /// True for `/`, `/home`, `/shared`, `/shared/<drive>` and `/shared-with-me`: entries that
    /// may never be created, renamed or removed by a client.
    pub fn is_namespace_root(&self) -> bool {
        self.inner == "/"
    }

    /// The on-disk path, or `NotFound` for namespaces that have none.
    pub fn require_real(&self) -> DriveResult<&Path> {
        self.real_path
            .as_deref()
            .ok_or_else(|| DriveError::not_found(self.display_path.clone()))
    }
}

/// Maps virtual paths onto the storage tree.
///
/// Holds only the two absolute roots; resolution itself is a pure function of the input
/// apart from the symlink re-check on paths that already exist.
#[derive(Debug, Clone)]
pub struct PathResolver {
    users_root: PathBuf,
    drives_root: PathBuf,
}

fn absolute_root(path: PathBuf) -> PathBuf {
    match dunce::canonicalize(&path) {
        Ok(canonical) => canonical,
        Err(_) => std::path::absolute(&path).unwrap_or(path),
    }
}

impl PathResolver {
    /// Create a resolver. Roots are made absolute (and canonical when they already exist).
    pub fn new(users_root: PathBuf, drives_root: PathBuf) -> Self {
        Self {
            users_root: absolute_root(users_root),
            drives_root: absolute_root(drives_root),
        }
    }

    pub fn users_root(&self) -> &Path {
        &self.users_root
    }

    pub fn drives_root(&self) -> &Path {
        &self.drives_root
    }

    /// Real directory holding `login`'s home tree.
    pub fn home_root(&self, login: &str) -> DriveResult<PathBuf> {
        let login = PathComponent::new(login)?;
        Ok(self.users_root.join(login.as_str()))
    }

    /// Real directory of the drive called `name`.
    pub fn drive_root(&self, name: &str) -> DriveResult<PathBuf> {
        let name = PathComponent::new(name)?;
        Ok(self.drives_root.join(name.as_str()))
    }

    /// Resolve `virtual_path` for `identity`.
    ///
    /// # Errors
    /// - `NullByte`, `PathTraversal`, `DangerousPattern` for rejected raw input
    /// - `AuthenticationRequired` for `home`/`shared` paths without an identity
    /// - `UnknownNamespace` for any other first segment
    /// - `EscapesRoot` if the final containment guard fails
    pub fn resolve(
        &self,
        virtual_path: &str,
        identity: Option<&Identity>,
    ) -> DriveResult<ResolvedPath> {
        screen_raw(virtual_path)?;
        let cleaned = clean(virtual_path);
        let parts = segments(&cleaned);
        // Cleaning resolves `..` lexically, so this only fires if the screen is ever loosened.
        if parts.contains(&"..") {
            return Err(DriveError::PathTraversal);
        }

        let Some((&first, rest)) = parts.split_first() else {
            return Ok(ResolvedPath {
                namespace: NamespaceKind::Root,
                display_path: "/".into(),
                real_path: None,
                root: None,
                drive: None,
                home_owner: None,
                inner: "/".into(),
            });
        };

        match first {
            HOME_NAMESPACE => {
                let identity = identity.ok_or(DriveError::AuthenticationRequired)?;
                self.resolve_home(cleaned.clone(), rest, identity)
            }
            SHARED_NAMESPACE => {
                if identity.is_none() {
                    return Err(DriveError::AuthenticationRequired);
                }
                self.resolve_shared(cleaned.clone(), rest)
            }
            SHARED_WITH_ME_NAMESPACE => {
                if identity.is_none() {
                    return Err(DriveError::AuthenticationRequired);
                }
                Ok(ResolvedPath {
                    namespace: NamespaceKind::SharedWithMe,
                    display_path: cleaned.clone(),
                    real_path: None,
                    root: None,
                    drive: None,
                    home_owner: None,
                    inner: inner_of(rest),
                })
            }
            other => Err(DriveError::UnknownNamespace(other.to_string())),
        }
    }

    /// Resolve a `/home/...` path against `owner`'s home tree instead of the caller's.
    ///
    /// Used to serve items another actor shared: the physical file lives in the owner's
    /// namespace, never the recipient's.
    pub fn resolve_in_home_of(
        &self,
        virtual_path: &str,
        owner: &Identity,
    ) -> DriveResult<ResolvedPath> {
        let resolved = self.resolve(virtual_path, Some(owner))?;
        if resolved.namespace != NamespaceKind::Home {
            return Err(DriveError::invalid_input(
                "shared items must live in the owner's home namespace",
            ));
        }
        Ok(resolved)
    }

    fn resolve_home(
        &self,
        display_path: String,
        rest: &[&str],
        identity: &Identity,
    ) -> DriveResult<ResolvedPath> {
        let root = self.home_root(identity.home_dir_name())?;
        let real = join_segments(&root, rest);
        guard(&real, &root)?;
        Ok(ResolvedPath {
            namespace: NamespaceKind::Home,
            display_path,
            real_path: Some(real),
            root: Some(root),
            drive: None,
            home_owner: Some(identity.id),
            inner: inner_of(rest),
        })
    }

    fn resolve_shared(&self, display_path: String, rest: &[&str]) -> DriveResult<ResolvedPath> {
        let Some((&drive, within)) = rest.split_first() else {
            return Ok(ResolvedPath {
                namespace: NamespaceKind::Shared,
                display_path,
                real_path: Some(self.drives_root.clone()),
                root: Some(self.drives_root.clone()),
                drive: None,
                home_owner: None,
                inner: "/".into(),
            });
        };

        let root = self.drive_root(drive)?;
        guard(&root, &self.drives_root)?;
        let real = join_segments(&root, within);
        guard(&real, &root)?;
        Ok(ResolvedPath {
            namespace: NamespaceKind::Shared,
            display_path,
            real_path: Some(real),
            root: Some(root),
            drive: Some(drive.to_string()),
            home_owner: None,
            inner: inner_of(within),
        })
    }
}

fn join_segments(root: &Path, rest: &[&str]) -> PathBuf {
    let mut path = root.to_path_buf();
    for segment in rest {
        path.push(segment);
    }
    path
}

fn inner_of(rest: &[&str]) -> String {
    if rest.is_empty() {
        "/".into()
    } else {
        format!("/{}", rest.join("/"))
    }
}

/// Final containment guard.
///
/// The lexical check runs first. Then the deepest existing ancestor of `candidate` (the
/// candidate itself when it exists) is canonicalised and checked against the canonical root,
/// which catches symlinks pointing out of the tree.
fn guard(candidate: &Path, root: &Path) -> DriveResult<()> {
    if !is_within_root(candidate, root) {
        tracing::warn!("rejected path outside its namespace root");
        return Err(DriveError::EscapesRoot);
    }

    let Ok(canonical_root) = dunce::canonicalize(root) else {
        // Root not created yet: nothing beneath it can exist either.
        return Ok(());
    };

    for ancestor in candidate.ancestors() {
        if !is_within_root(ancestor, root) {
            break;
        }
        match std::fs::symlink_metadata(ancestor) {
            Ok(meta) => {
                let canonical = match dunce::canonicalize(ancestor) {
                    Ok(c) => c,
                    Err(_) if meta.file_type().is_symlink() => {
                        tracing::warn!("rejected dangling symlink inside a namespace root");
                        return Err(DriveError::EscapesRoot);
                    }
                    Err(_) => return Ok(()),
                };
                if !is_within_root(&canonical, &canonical_root) {
                    tracing::warn!("rejected path escaping its namespace root via symlink");
                    return Err(DriveError::EscapesRoot);
                }
                return Ok(());
            }
            Err(_) => continue,
        }
    }
    Ok(())
}
