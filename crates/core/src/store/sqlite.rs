//! SQLite-backed [`Store`].

use super::{
    Drive, DriveMember, DriveUpdate, ItemShare, Membership, NewShare, NewUser, ShareUpsert, Store,
    UserRecord,
};
use crate::{DriveError, DriveResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drivefs_types::PermissionLevel;
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use uuid::Uuid;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    login TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    is_admin INTEGER NOT NULL DEFAULT 0,
    api_token_sha256 TEXT UNIQUE,
    dav_password_hash TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS drives (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    quota_bytes INTEGER NOT NULL DEFAULT 0,
    active INTEGER NOT NULL DEFAULT 1,
    owner_id TEXT NOT NULL REFERENCES users(id),
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS drive_members (
    drive_id TEXT NOT NULL REFERENCES drives(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    permission TEXT NOT NULL,
    PRIMARY KEY (drive_id, user_id)
);
CREATE INDEX IF NOT EXISTS idx_members_user ON drive_members(user_id);

CREATE TABLE IF NOT EXISTS item_shares (
    id TEXT PRIMARY KEY,
    item_path TEXT NOT NULL,
    item_name TEXT NOT NULL,
    is_folder INTEGER NOT NULL,
    owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    recipient_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    permission TEXT NOT NULL,
    message TEXT,
    created_at INTEGER NOT NULL,
    UNIQUE (item_path, owner_id, recipient_id)
);
CREATE INDEX IF NOT EXISTS idx_shares_recipient ON item_shares(recipient_id, owner_id);
"#;

const USER_COLUMNS: &str =
    "id, login, display_name, is_admin, api_token_sha256, dav_password_hash, created_at";
const DRIVE_COLUMNS: &str = "id, name, quota_bytes, active, owner_id, created_at";
const SHARE_COLUMNS: &str = "id, item_path, item_name, is_folder, owner_id, recipient_id, \
                             permission, message, created_at";

/// Store handle over a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> DriveResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> DriveResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs raw SQL against the connection, for tests that need to break the schema.
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> DriveResult<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }
}

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn level_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<PermissionLevel> {
    let raw: String = row.get(idx)?;
    raw.parse::<PermissionLevel>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    Ok(DateTime::from_timestamp(secs, 0).unwrap_or_default())
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: uuid_col(row, 0)?,
        login: row.get(1)?,
        display_name: row.get(2)?,
        is_admin: row.get(3)?,
        api_token_sha256: row.get(4)?,
        dav_password_hash: row.get(5)?,
        created_at: time_col(row, 6)?,
    })
}

fn drive_from_row(row: &Row<'_>) -> rusqlite::Result<Drive> {
    let quota: i64 = row.get(2)?;
    Ok(Drive {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        quota_bytes: quota.max(0) as u64,
        active: row.get(3)?,
        owner_id: uuid_col(row, 4)?,
        created_at: time_col(row, 5)?,
    })
}

fn share_from_row(row: &Row<'_>) -> rusqlite::Result<ItemShare> {
    Ok(ItemShare {
        id: uuid_col(row, 0)?,
        item_path: row.get(1)?,
        item_name: row.get(2)?,
        is_folder: row.get(3)?,
        owner_id: uuid_col(row, 4)?,
        recipient_id: uuid_col(row, 5)?,
        permission: level_col(row, 6)?,
        message: row.get(7)?,
        created_at: time_col(row, 8)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn quota_param(quota_bytes: u64) -> DriveResult<i64> {
    i64::try_from(quota_bytes).map_err(|_| DriveError::invalid_input("quota is too large"))
}

/// `path` itself or anything beneath it, as a SQL predicate on `item_path` bound to `?2`.
const UNDER_PATH: &str =
    "(item_path = ?2 OR substr(item_path, 1, length(?2) + 1) = ?2 || '/')";

impl SqliteStore {
    fn query_users(&self, filter: &str, param: &str) -> DriveResult<Option<UserRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {filter} = ?1");
        Ok(conn.query_row(&sql, params![param], user_from_row).optional()?)
    }

    fn query_shares(&self, filter: &str, args: &[String]) -> DriveResult<Vec<ItemShare>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {SHARE_COLUMNS} FROM item_shares WHERE {filter} ORDER BY created_at, item_path"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), share_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn query_drives(&self, filter: &str, param: String) -> DriveResult<Vec<Drive>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {DRIVE_COLUMNS} FROM drives WHERE {filter} ORDER BY name");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![param], drive_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_user(&self, user: NewUser) -> DriveResult<UserRecord> {
        let record = UserRecord {
            id: Uuid::new_v4(),
            login: user.login,
            display_name: user.display_name,
            is_admin: user.is_admin,
            api_token_sha256: None,
            dav_password_hash: None,
            created_at: DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or_default(),
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, login, display_name, is_admin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id.to_string(),
                record.login,
                record.display_name,
                record.is_admin,
                record.created_at.timestamp(),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                DriveError::already_exists(format!("user {}", record.login))
            } else {
                e.into()
            }
        })?;
        Ok(record)
    }

    async fn user_by_id(&self, id: Uuid) -> DriveResult<Option<UserRecord>> {
        self.query_users("id", &id.to_string())
    }

    async fn user_by_login(&self, login: &str) -> DriveResult<Option<UserRecord>> {
        self.query_users("login", login)
    }

    async fn user_by_token_digest(&self, digest: &str) -> DriveResult<Option<UserRecord>> {
        self.query_users("api_token_sha256", digest)
    }

    async fn set_api_token_digest(&self, id: Uuid, digest: &str) -> DriveResult<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE users SET api_token_sha256 = ?2 WHERE id = ?1",
            params![id.to_string(), digest],
        )?;
        if changed == 0 {
            return Err(DriveError::not_found("user"));
        }
        Ok(())
    }

    async fn set_dav_password_hash(&self, id: Uuid, hash: &str) -> DriveResult<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE users SET dav_password_hash = ?2 WHERE id = ?1",
            params![id.to_string(), hash],
        )?;
        if changed == 0 {
            return Err(DriveError::not_found("user"));
        }
        Ok(())
    }

    async fn list_users(&self) -> DriveResult<Vec<UserRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY login");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], user_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn create_drive(
        &self,
        name: &str,
        quota_bytes: u64,
        owner_id: Uuid,
    ) -> DriveResult<Drive> {
        let drive = Drive {
            id: Uuid::new_v4(),
            name: name.to_string(),
            quota_bytes,
            active: true,
            owner_id,
            created_at: DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or_default(),
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO drives (id, name, quota_bytes, active, owner_id, created_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?5)",
            params![
                drive.id.to_string(),
                drive.name,
                quota_param(quota_bytes)?,
                owner_id.to_string(),
                drive.created_at.timestamp(),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                DriveError::already_exists(format!("drive {name}"))
            } else {
                e.into()
            }
        })?;
        Ok(drive)
    }

    async fn drive_by_name(&self, name: &str) -> DriveResult<Option<Drive>> {
        Ok(self.query_drives("name = ?1", name.to_string())?.into_iter().next())
    }

    async fn list_drives(&self) -> DriveResult<Vec<Drive>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {DRIVE_COLUMNS} FROM drives ORDER BY name");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], drive_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn update_drive(&self, name: &str, update: DriveUpdate) -> DriveResult<Option<Drive>> {
        {
            let conn = self.conn.lock();
            if let Some(quota) = update.quota_bytes {
                conn.execute(
                    "UPDATE drives SET quota_bytes = ?2 WHERE name = ?1",
                    params![name, quota_param(quota)?],
                )?;
            }
            if let Some(active) = update.active {
                conn.execute(
                    "UPDATE drives SET active = ?2 WHERE name = ?1",
                    params![name, active],
                )?;
            }
        }
        self.drive_by_name(name).await
    }

    async fn delete_drive(&self, name: &str) -> DriveResult<Option<Drive>> {
        let Some(drive) = self.drive_by_name(name).await? else {
            return Ok(None);
        };
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM drive_members WHERE drive_id = ?1",
            params![drive.id.to_string()],
        )?;
        tx.execute("DELETE FROM drives WHERE id = ?1", params![drive.id.to_string()])?;
        tx.commit()?;
        Ok(Some(drive))
    }

    async fn set_member(
        &self,
        drive_id: Uuid,
        user_id: Uuid,
        permission: PermissionLevel,
    ) -> DriveResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO drive_members (drive_id, user_id, permission) VALUES (?1, ?2, ?3)
             ON CONFLICT(drive_id, user_id) DO UPDATE SET permission = excluded.permission",
            params![drive_id.to_string(), user_id.to_string(), permission.as_str()],
        )?;
        Ok(())
    }

    async fn remove_member(&self, drive_id: Uuid, user_id: Uuid) -> DriveResult<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM drive_members WHERE drive_id = ?1 AND user_id = ?2",
            params![drive_id.to_string(), user_id.to_string()],
        )?;
        Ok(removed > 0)
    }

    async fn membership(
        &self,
        user_id: Uuid,
        drive_name: &str,
    ) -> DriveResult<Option<Membership>> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT d.id, d.name, d.quota_bytes, d.active, d.owner_id, d.created_at,
                        m.permission
                 FROM drives d JOIN drive_members m ON m.drive_id = d.id
                 WHERE m.user_id = ?1 AND d.name = ?2",
                params![user_id.to_string(), drive_name], |row| {
                Ok(Membership {
                    drive: drive_from_row(row)?,
                    permission: level_col(row, 6)?,
                })
            })
            .optional()?;
        Ok(found)
    }

    async fn drives_for_member(&self, user_id: Uuid) -> DriveResult<Vec<Drive>> {
        self.query_drives(
            "active = 1 AND id IN (SELECT drive_id FROM drive_members WHERE user_id = ?1)",
            user_id.to_string(),
        )
    }

    async fn drives_owned_by(&self, user_id: Uuid) -> DriveResult<Vec<Drive>> {
        self.query_drives("owner_id = ?1", user_id.to_string())
    }

    async fn drive_members(&self, drive_id: Uuid) -> DriveResult<Vec<DriveMember>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT u.id, u.login, u.display_name, m.permission FROM drive_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.drive_id = ?1 ORDER BY u.login",
        )?;
        let rows = stmt.query_map(params![drive_id.to_string()], |row| {
            Ok(DriveMember {
                user_id: uuid_col(row, 0)?,
                login: row.get(1)?,
                display_name: row.get(2)?,
                permission: level_col(row, 3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn upsert_share(&self, share: NewShare) -> DriveResult<(ItemShare, ShareUpsert)> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM item_shares
                 WHERE item_path = ?1 AND owner_id = ?2 AND recipient_id = ?3",
                params![
                    share.item_path,
                    share.owner_id.to_string(),
                    share.recipient_id.to_string()
                ],
                |row| row.get(0),
            )
            .optional()?;

        let (id, outcome) = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE item_shares
                     SET permission = ?2, message = COALESCE(?3, message),
                         item_name = ?4, is_folder = ?5
                     WHERE id = ?1",
                    params![
                        id,
                        share.permission.as_str(),
                        share.message,
                        share.item_name,
                        share.is_folder
                    ],
                )?;
                (id, ShareUpsert::Updated)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO item_shares (id, item_path, item_name, is_folder, owner_id,
                                              recipient_id, permission, message, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        id,
                        share.item_path,
                        share.item_name,
                        share.is_folder,
                        share.owner_id.to_string(),
                        share.recipient_id.to_string(),
                        share.permission.as_str(),
                        share.message,
                        Utc::now().timestamp(),
                    ],
                )?;
                (id, ShareUpsert::Created)
            }
        };

        let sql = format!("SELECT {SHARE_COLUMNS} FROM item_shares WHERE id = ?1");
        let stored = tx.query_row(&sql, params![id], share_from_row)?;
        tx.commit()?;
        Ok((stored, outcome))
    }

    async fn share_by_id(&self, id: Uuid) -> DriveResult<Option<ItemShare>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {SHARE_COLUMNS} FROM item_shares WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![id.to_string()], share_from_row)
            .optional()?)
    }

    async fn exact_share(
        &self,
        owner_id: Uuid,
        item_path: &str,
        recipient_id: Uuid,
    ) -> DriveResult<Option<ItemShare>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {SHARE_COLUMNS} FROM item_shares
             WHERE item_path = ?1 AND owner_id = ?2 AND recipient_id = ?3"
        );
        Ok(conn
            .query_row(
                &sql,
                params![item_path, owner_id.to_string(), recipient_id.to_string()],
                share_from_row,
            )
            .optional()?)
    }

    async fn folder_shares(
        &self,
        owner_id: Uuid,
        recipient_id: Uuid,
    ) -> DriveResult<Vec<ItemShare>> {
        self.query_shares(
            "owner_id = ?1 AND recipient_id = ?2 AND is_folder = 1",
            &[owner_id.to_string(), recipient_id.to_string()],
        )
    }

    async fn shares_for_recipient(&self, recipient_id: Uuid) -> DriveResult<Vec<ItemShare>> {
        self.query_shares("recipient_id = ?1", &[recipient_id.to_string()])
    }

    async fn shares_by_owner(&self, owner_id: Uuid) -> DriveResult<Vec<ItemShare>> {
        self.query_shares("owner_id = ?1", &[owner_id.to_string()])
    }

    async fn delete_share(&self, id: Uuid) -> DriveResult<Option<ItemShare>> {
        let Some(share) = self.share_by_id(id).await? else {
            return Ok(None);
        };
        let conn = self.conn.lock();
        conn.execute("DELETE FROM item_shares WHERE id = ?1", params![id.to_string()])?;
        Ok(Some(share))
    }

    async fn delete_shares_under(
        &self,
        owner_id: Uuid,
        path: &str,
    ) -> DriveResult<Vec<ItemShare>> {
        let filter = format!("owner_id = ?1 AND {UNDER_PATH}");
        let removed = self.query_shares(&filter, &[owner_id.to_string(), path.to_string()])?;
        if !removed.is_empty() {
            let conn = self.conn.lock();
            conn.execute(
                &format!("DELETE FROM item_shares WHERE {filter}"),
                params![owner_id.to_string(), path],
            )?;
        }
        Ok(removed)
    }

    async fn repath_shares(
        &self,
        owner_id: Uuid,
        from: &str,
        to: &str,
    ) -> DriveResult<Vec<ItemShare>> {
        let filter = format!("owner_id = ?1 AND {UNDER_PATH}");
        let affected = self.query_shares(&filter, &[owner_id.to_string(), from.to_string()])?;
        if affected.is_empty() {
            return Ok(affected);
        }

        let mut updated = Vec::with_capacity(affected.len());
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for mut share in affected {
            share.item_path = format!("{to}{}", &share.item_path[from.len()..]);
            if let Some(name) = share.item_path.rsplit('/').next() {
                share.item_name = name.to_string();
            }
            tx.execute(
                "UPDATE item_shares SET item_path = ?2, item_name = ?3 WHERE id = ?1",
                params![share.id.to_string(), share.item_path, share.item_name],
            )?;
            updated.push(share);
        }
        tx.commit()?;
        Ok(updated)
    }
}
