//! The three grant mechanisms, one method each.

use crate::paths::{is_same_or_under, NamespaceKind, ResolvedPath};
use crate::store::Store;
use crate::{DriveResult, Identity};
use async_trait::async_trait;
use drivefs_types::PermissionLevel;
use std::sync::Arc;
use uuid::Uuid;

/// Sources of access grants.
///
/// Each method answers for one mechanism only and returns the level it grants, if any. The
/// resolver decides how the answers combine.
#[async_trait]
pub trait GrantSource: Send + Sync {
    /// Implicit ownership: the caller's own home tree, or a drive an administrator created.
    async fn ownership(
        &self,
        identity: &Identity,
        path: &ResolvedPath,
    ) -> DriveResult<Option<PermissionLevel>>;

    /// Membership of the (active) drive named `drive`.
    async fn membership(
        &self,
        identity: &Identity,
        drive: &str,
    ) -> DriveResult<Option<PermissionLevel>>;

    /// An item share from `owner` covering `path`, either exactly or through a shared folder
    /// above it. When several shares cover the path the highest level is returned.
    async fn item_share(
        &self,
        identity: &Identity,
        owner: Uuid,
        path: &str,
    ) -> DriveResult<Option<PermissionLevel>>;
}

/// Grant lookups against the authoritative store.
pub struct StoreGrants {
    store: Arc<dyn Store>,
}

impl StoreGrants {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl GrantSource for StoreGrants {
    async fn ownership(
        &self,
        identity: &Identity,
        path: &ResolvedPath,
    ) -> DriveResult<Option<PermissionLevel>> {
        match path.namespace {
            NamespaceKind::Home if path.home_owner == Some(identity.id) => {
                Ok(Some(PermissionLevel::ReadWrite))
            }
            NamespaceKind::Shared if identity.is_admin => {
                let Some(name) = path.drive.as_deref() else {
                    return Ok(None);
                };
                let owned = self
                    .store
                    .drive_by_name(name)
                    .await?
                    .is_some_and(|d| d.active && d.owner_id == identity.id);
                Ok(owned.then_some(PermissionLevel::ReadWrite))
            }
            _ => Ok(None),
        }
    }

    async fn membership(
        &self,
        identity: &Identity,
        drive: &str,
    ) -> DriveResult<Option<PermissionLevel>> {
        Ok(self
            .store
            .membership(identity.id, drive)
            .await?
            .filter(|m| m.drive.active)
            .map(|m| m.permission))
    }

    async fn item_share(
        &self,
        identity: &Identity,
        owner: Uuid,
        path: &str,
    ) -> DriveResult<Option<PermissionLevel>> {
        let exact = self
            .store
            .exact_share(owner, path, identity.id)
            .await?
            .map(|s| s.permission);
        if exact == Some(PermissionLevel::ReadWrite) {
            return Ok(exact);
        }

        let covering = self
            .store
            .folder_shares(owner, identity.id)
            .await?
            .into_iter()
            .filter(|s| is_same_or_under(path, &s.item_path))
            .map(|s| s.permission)
            .max();
        Ok(exact.max(covering))
    }
}
