//! Constants used throughout the DriveFS core crate.
//!
//! This module contains namespace names, directory names and cache defaults so that
//! every surface agrees on them.

use std::time::Duration;

/// First path segment of the caller's private namespace.
pub const HOME_NAMESPACE: &str = "home";

/// First path segment of the shared-drive namespace.
pub const SHARED_NAMESPACE: &str = "shared";

/// First path segment of the virtual namespace holding items other actors shared with the caller.
pub const SHARED_WITH_ME_NAMESPACE: &str = "shared-with-me";

/// Directory (under the data directory) holding one home directory per actor.
pub const USERS_DIR_NAME: &str = "users";

/// Directory (under the data directory) holding one directory per shared drive.
pub const DRIVES_DIR_NAME: &str = "drives";

/// Default directory for file storage when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "drivefs_data";

/// Filename of the SQLite database holding users, drives, memberships and shares.
pub const DATABASE_FILENAME: &str = "drivefs.db";

/// Default prefix applied to every key written to the external cache.
pub const DEFAULT_CACHE_PREFIX: &str = "drivefs:";

/// Default TTL of cached permission verdicts and drive lists.
pub const DEFAULT_PERMISSION_TTL: Duration = Duration::from_secs(5 * 60);

/// Default TTL of cached folder statistics.
pub const DEFAULT_STATS_TTL: Duration = Duration::from_secs(30 * 60);

/// Default freshness window of the in-process cache tier.
pub const DEFAULT_LOCAL_FRESHNESS: Duration = Duration::from_secs(5 * 60);

/// Default per-call timeout for the external cache.
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default Redis port.
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Maximum number of entries a folder statistics walk visits before giving up.
pub const MAX_STATS_ENTRIES: usize = 100_000;

/// Maximum number of entries a name search visits.
pub const MAX_SEARCH_VISITED: usize = 50_000;

/// Maximum number of hits a name search returns.
pub const MAX_SEARCH_RESULTS: usize = 200;

/// Default lifetime of an advisory lock when the client does not ask for one.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Upper bound on any lock lifetime a client may request.
pub const MAX_LOCK_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);
