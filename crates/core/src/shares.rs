//! Per-item sharing from an owner's home tree to a single recipient.

use crate::cache::CacheService;
use crate::paths::{join_virtual, split_parent, NamespaceKind, PathResolver, ResolvedPath};
use crate::store::{ItemShare, NewShare, ShareUpsert, Store};
use crate::{DriveError, DriveResult, Identity};
use drivefs_types::PermissionLevel;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// A `/shared-with-me/<share id>[/sub]` path translated into the owner's tree.
#[derive(Debug, Clone)]
pub struct SharedTarget {
    pub share: ItemShare,
    pub owner: Identity,
    /// The path in the owner's home namespace, resolved against the owner's home root.
    pub path: ResolvedPath,
    /// True when the path addresses the shared item itself rather than something inside it.
    pub is_share_root: bool,
}

pub struct ShareService {
    store: Arc<dyn Store>,
    paths: Arc<PathResolver>,
    cache: Arc<CacheService>,
}

impl ShareService {
    pub fn new(store: Arc<dyn Store>, paths: Arc<PathResolver>, cache: Arc<CacheService>) -> Self {
        Self { store, paths, cache }
    }

    /// Shares `path` from `owner`'s home with `recipient_login`.
    ///
    /// Sharing the same item with the same recipient again updates the permission level (and
    /// message, when given) of the existing share.
    ///
    /// # Errors
    /// - `InvalidInput` for paths outside `/home`, the home root itself, or a self-share
    /// - `NotFound` if the item or the recipient does not exist
    pub async fn share_item(
        &self,
        owner: &Identity,
        path: &str,
        recipient_login: &str,
        permission: PermissionLevel,
        message: Option<String>,
    ) -> DriveResult<(ItemShare, ShareUpsert)> {
        let resolved = self.paths.resolve(path, Some(owner))?;
        if resolved.namespace != NamespaceKind::Home {
            return Err(DriveError::invalid_input(
                "only items in your home folder can be shared",
            ));
        }
        if resolved.is_namespace_root() {
            return Err(DriveError::invalid_input("the home folder itself cannot be shared"));
        }
        let real = resolved.require_real()?;
        let meta = tokio::fs::symlink_metadata(real)
            .await
            .map_err(|e| DriveError::from_io(e, &resolved.display_path))?;

        let recipient = self
            .store
            .user_by_login(recipient_login)
            .await?
            .ok_or_else(|| DriveError::not_found(format!("user {recipient_login}")))?;
        if recipient.id == owner.id {
            return Err(DriveError::invalid_input("cannot share an item with yourself"));
        }

        let item_name = split_parent(&resolved.display_path)
            .map(|(_, name)| name.to_string())
            .unwrap_or_default();
        let (share, outcome) = self
            .store
            .upsert_share(NewShare {
                item_path: resolved.display_path.clone(),
                item_name,
                is_folder: meta.is_dir(),
                owner_id: owner.id,
                recipient_id: recipient.id,
                permission,
                message,
            })
            .await?;

        self.cache.permissions().invalidate_user(recipient.id).await;
        tracing::info!(share = %share.id, outcome = ?outcome, "item shared");
        Ok((share, outcome))
    }

    /// Revokes a share. Only its owner or an administrator may do so.
    pub async fn revoke(&self, actor: &Identity, id: Uuid) -> DriveResult<ItemShare> {
        let share = self
            .store
            .share_by_id(id)
            .await?
            .ok_or_else(|| DriveError::not_found("share"))?;
        if share.owner_id != actor.id && !actor.is_admin {
            return Err(DriveError::access_denied("share"));
        }
        self.store.delete_share(id).await?;
        self.cache.permissions().invalidate_user(share.recipient_id).await;
        tracing::info!(share = %id, "share revoked");
        Ok(share)
    }

    pub async fn shared_with_me(&self, identity: &Identity) -> DriveResult<Vec<ItemShare>> {
        self.store.shares_for_recipient(identity.id).await
    }

    pub async fn shared_by_me(&self, identity: &Identity) -> DriveResult<Vec<ItemShare>> {
        self.store.shares_by_owner(identity.id).await
    }

    /// Translates a resolved `/shared-with-me/<id>[/sub]` path into the owner's tree.
    ///
    /// A share that does not exist, or was granted to somebody else, is reported as
    /// `NotFound` so share ids cannot be probed.
    pub async fn resolve_shared(
        &self,
        identity: &Identity,
        path: &ResolvedPath,
    ) -> DriveResult<SharedTarget> {
        let missing = || DriveError::not_found(path.display_path.clone());
        let rest = path.inner.trim_start_matches('/');
        let (id, sub) = match rest.split_once('/') {
            Some((id, sub)) => (id, Some(sub)),
            None => (rest, None),
        };
        let id = Uuid::parse_str(id).map_err(|_| missing())?;

        let share = self
            .store
            .share_by_id(id)
            .await?
            .filter(|s| s.recipient_id == identity.id)
            .ok_or_else(missing)?;
        if sub.is_some() && !share.is_folder {
            return Err(missing());
        }
        let owner = self
            .store
            .user_by_id(share.owner_id)
            .await?
            .ok_or_else(missing)?
            .identity();

        let owner_path = match sub {
            Some(sub) => sub
                .split('/')
                .fold(share.item_path.clone(), |acc, seg| join_virtual(&acc, seg)),
            None => share.item_path.clone(),
        };
        let resolved = self.paths.resolve_in_home_of(&owner_path, &owner)?;
        Ok(SharedTarget {
            share,
            owner,
            path: resolved,
            is_share_root: sub.is_none(),
        })
    }

    /// Drops shares of `path` (and anything under it) after the owner removed it.
    pub async fn on_item_removed(&self, owner: Uuid, path: &str) -> DriveResult<()> {
        let removed = self.store.delete_shares_under(owner, path).await?;
        self.invalidate_recipients(&removed).await;
        Ok(())
    }

    /// Rewrites shares of `from` (and anything under it) after the owner renamed it to `to`.
    pub async fn on_item_moved(&self, owner: Uuid, from: &str, to: &str) -> DriveResult<()> {
        let moved = self.store.repath_shares(owner, from, to).await?;
        self.invalidate_recipients(&moved).await;
        Ok(())
    }

    async fn invalidate_recipients(&self, shares: &[ItemShare]) {
        let recipients: HashSet<Uuid> = shares.iter().map(|s| s.recipient_id).collect();
        for recipient in recipients {
            self.cache.permissions().invalidate_user(recipient).await;
        }
    }
}
