//! Request and response bodies of the JSON API.

use chrono::{DateTime, Utc};
use drivefs_core::cache::FolderStats;
use drivefs_core::store::{Drive, DriveMember, ItemShare};
use drivefs_core::vfs::FileInfo;
use drivefs_core::walk::SearchHit;
use drivefs_types::PermissionLevel;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageRes {
    pub message: String,
}

/// `?path=` of the file endpoints. A missing path means `/`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct PathQuery {
    pub path: Option<String>,
}

impl PathQuery {
    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or("/")
    }
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct SearchQuery {
    pub path: Option<String>,
    pub q: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EntryRes {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    /// RFC 3339 modification time; absent for virtual folders.
    pub modified: Option<String>,
    /// Name to show when it differs from `name`.
    pub display_name: Option<String>,
}

impl From<FileInfo> for EntryRes {
    fn from(info: FileInfo) -> Self {
        Self {
            name: info.name,
            path: info.path,
            is_dir: info.is_dir,
            size: info.size,
            modified: info.modified.map(timestamp),
            display_name: info.display_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListRes {
    pub path: String,
    pub entries: Vec<EntryRes>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PathReq {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RenameReq {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatsRes {
    pub files: u64,
    pub folders: u64,
    pub total_bytes: u64,
    pub truncated: bool,
}

impl From<FolderStats> for StatsRes {
    fn from(stats: FolderStats) -> Self {
        Self {
            files: stats.files,
            folders: stats.folders,
            total_bytes: stats.total_bytes,
            truncated: stats.truncated,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SearchHitRes {
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

impl From<SearchHit> for SearchHitRes {
    fn from(hit: SearchHit) -> Self {
        Self {
            path: hit.path,
            name: hit.name,
            is_dir: hit.is_dir,
            size: hit.size,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SearchRes {
    pub hits: Vec<SearchHitRes>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DrivesRes {
    pub drives: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShareReq {
    /// Item in the caller's home (`/home/...`).
    pub path: String,
    /// Recipient login name.
    pub recipient: String,
    pub permission: PermissionLevel,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShareRes {
    pub id: String,
    pub item_path: String,
    pub item_name: String,
    pub is_folder: bool,
    pub owner_id: String,
    pub recipient_id: String,
    pub permission: PermissionLevel,
    pub message: Option<String>,
    pub created_at: String,
    /// Path under which the recipient reaches the item.
    pub shared_path: String,
}

impl From<ItemShare> for ShareRes {
    fn from(share: ItemShare) -> Self {
        Self {
            shared_path: format!("/shared-with-me/{}", share.id),
            id: share.id.to_string(),
            item_path: share.item_path,
            item_name: share.item_name,
            is_folder: share.is_folder,
            owner_id: share.owner_id.to_string(),
            recipient_id: share.recipient_id.to_string(),
            permission: share.permission,
            message: share.message,
            created_at: timestamp(share.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SharesRes {
    pub shares: Vec<ShareRes>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateDriveReq {
    pub name: String,
    /// Quota in bytes; absent or `0` means unlimited.
    pub quota_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DriveRes {
    pub id: String,
    pub name: String,
    pub quota_bytes: u64,
    pub active: bool,
    pub created_at: String,
}

impl From<Drive> for DriveRes {
    fn from(drive: Drive) -> Self {
        Self {
            id: drive.id.to_string(),
            name: drive.name,
            quota_bytes: drive.quota_bytes,
            active: drive.active,
            created_at: timestamp(drive.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemberReq {
    pub permission: PermissionLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DriveListRes {
    pub drives: Vec<DriveRes>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateDriveReq {
    pub quota_bytes: Option<u64>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemberRes {
    pub user_id: String,
    pub login: String,
    pub display_name: String,
    pub permission: PermissionLevel,
}

impl From<DriveMember> for MemberRes {
    fn from(member: DriveMember) -> Self {
        Self {
            user_id: member.user_id.to_string(),
            login: member.login,
            display_name: member.display_name,
            permission: member.permission,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MembersRes {
    pub members: Vec<MemberRes>,
}
