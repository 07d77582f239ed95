//! Authoritative store of users, drives, drive memberships and item shares.
//!
//! Everything the caches hold is derived from this store. The trait is async so a networked
//! backend can slot in later; the bundled [`SqliteStore`] runs its queries inline behind a
//! mutex since each one is a short indexed lookup.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::{DriveResult, Identity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drivefs_types::PermissionLevel;
use uuid::Uuid;

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub login: String,
    pub display_name: String,
    pub is_admin: bool,
    /// Hex SHA-256 digest of the primary API token.
    pub api_token_sha256: Option<String>,
    /// Argon2 PHC string of the WebDAV application password.
    pub dav_password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn identity(&self) -> Identity {
        Identity::new(self.id, &self.login, &self.display_name, self.is_admin)
    }
}

/// Fields needed to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub login: String,
    pub display_name: String,
    pub is_admin: bool,
}

/// A shared drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drive {
    pub id: Uuid,
    pub name: String,
    /// Storage quota in bytes, `0` meaning unlimited.
    pub quota_bytes: u64,
    pub active: bool,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Partial update of a drive's mutable settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriveUpdate {
    pub quota_bytes: Option<u64>,
    pub active: Option<bool>,
}

/// A user's membership of one drive, joined with the drive itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub drive: Drive,
    pub permission: PermissionLevel,
}

/// One row of a drive's member list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveMember {
    pub user_id: Uuid,
    pub login: String,
    pub display_name: String,
    pub permission: PermissionLevel,
}

/// An item in an owner's home tree shared with one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemShare {
    pub id: Uuid,
    /// Owner's virtual path (`/home/...`).
    pub item_path: String,
    pub item_name: String,
    pub is_folder: bool,
    pub owner_id: Uuid,
    pub recipient_id: Uuid,
    pub permission: PermissionLevel,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create or update a share.
#[derive(Debug, Clone)]
pub struct NewShare {
    pub item_path: String,
    pub item_name: String,
    pub is_folder: bool,
    pub owner_id: Uuid,
    pub recipient_id: Uuid,
    pub permission: PermissionLevel,
    pub message: Option<String>,
}

/// Whether an upsert inserted a new share or updated an existing one in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareUpsert {
    Created,
    Updated,
}

#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn create_user(&self, user: NewUser) -> DriveResult<UserRecord>;
    async fn user_by_id(&self, id: Uuid) -> DriveResult<Option<UserRecord>>;
    async fn user_by_login(&self, login: &str) -> DriveResult<Option<UserRecord>>;
    async fn user_by_token_digest(&self, digest: &str) -> DriveResult<Option<UserRecord>>;
    async fn set_api_token_digest(&self, id: Uuid, digest: &str) -> DriveResult<()>;
    async fn set_dav_password_hash(&self, id: Uuid, hash: &str) -> DriveResult<()>;
    async fn list_users(&self) -> DriveResult<Vec<UserRecord>>;

    // Drives
    async fn create_drive(&self, name: &str, quota_bytes: u64, owner_id: Uuid)
        -> DriveResult<Drive>;
    async fn drive_by_name(&self, name: &str) -> DriveResult<Option<Drive>>;
    async fn list_drives(&self) -> DriveResult<Vec<Drive>>;
    async fn update_drive(&self, name: &str, update: DriveUpdate) -> DriveResult<Option<Drive>>;
    /// Deletes the drive and its membership rows. Returns the deleted drive.
    async fn delete_drive(&self, name: &str) -> DriveResult<Option<Drive>>;

    // Memberships
    async fn set_member(
        &self,
        drive_id: Uuid,
        user_id: Uuid,
        permission: PermissionLevel,
    ) -> DriveResult<()>;
    async fn remove_member(&self, drive_id: Uuid, user_id: Uuid) -> DriveResult<bool>;
    async fn membership(&self, user_id: Uuid, drive_name: &str)
        -> DriveResult<Option<Membership>>;
    /// Active drives `user_id` is a member of.
    async fn drives_for_member(&self, user_id: Uuid) -> DriveResult<Vec<Drive>>;
    async fn drives_owned_by(&self, user_id: Uuid) -> DriveResult<Vec<Drive>>;
    async fn drive_members(&self, drive_id: Uuid) -> DriveResult<Vec<DriveMember>>;

    // Shares
    async fn upsert_share(&self, share: NewShare) -> DriveResult<(ItemShare, ShareUpsert)>;
    async fn share_by_id(&self, id: Uuid) -> DriveResult<Option<ItemShare>>;
    async fn exact_share(
        &self,
        owner_id: Uuid,
        item_path: &str,
        recipient_id: Uuid,
    ) -> DriveResult<Option<ItemShare>>;
    /// Folder shares from `owner_id` to `recipient_id`.
    async fn folder_shares(&self, owner_id: Uuid, recipient_id: Uuid)
        -> DriveResult<Vec<ItemShare>>;
    async fn shares_for_recipient(&self, recipient_id: Uuid) -> DriveResult<Vec<ItemShare>>;
    async fn shares_by_owner(&self, owner_id: Uuid) -> DriveResult<Vec<ItemShare>>;
    async fn delete_share(&self, id: Uuid) -> DriveResult<Option<ItemShare>>;
    /// Removes every share of `path` or anything under it. Returns the removed rows.
    async fn delete_shares_under(&self, owner_id: Uuid, path: &str)
        -> DriveResult<Vec<ItemShare>>;
    /// Rewrites share paths after `from` was renamed to `to`. Returns the updated rows.
    async fn repath_shares(&self, owner_id: Uuid, from: &str, to: &str)
        -> DriveResult<Vec<ItemShare>>;
}
