//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in multi-threaded runtimes
//! and test harnesses. Binaries read the environment and hand the raw values to the parsing
//! functions here.

use crate::constants::{
    DATABASE_FILENAME, DEFAULT_CACHE_PREFIX, DEFAULT_CACHE_TIMEOUT, DEFAULT_DATA_DIR,
    DEFAULT_LOCAL_FRESHNESS, DEFAULT_PERMISSION_TTL, DEFAULT_REDIS_PORT, DEFAULT_STATS_TTL, DRIVES_DIR_NAME,
    MAX_STATS_ENTRIES, USERS_DIR_NAME,
};
use crate::{DriveError, DriveResult};
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    database_path: PathBuf,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// When `database_path` is `None` the database lives at `<data_dir>/drivefs.db`.
    pub fn new(data_dir: PathBuf, database_path: Option<PathBuf>) -> DriveResult<Self> {
        if data_dir.as_os_str().is_empty() {
            return Err(DriveError::invalid_input("data directory cannot be empty"));
        }
        let database_path = database_path.unwrap_or_else(|| data_dir.join(DATABASE_FILENAME));
        Ok(Self {
            data_dir,
            database_path,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    /// Root under which every actor's home directory lives.
    pub fn users_root(&self) -> PathBuf {
        self.data_dir.join(USERS_DIR_NAME)
    }

    /// Root under which every shared drive's directory lives.
    pub fn drives_root(&self) -> PathBuf {
        self.data_dir.join(DRIVES_DIR_NAME)
    }
}

/// Build a [`CoreConfig`] from the raw `DRIVEFS_DATA_DIR` and `DRIVEFS_DB_PATH` values.
///
/// Blank values count as unset; the data directory defaults to [`DEFAULT_DATA_DIR`].
pub fn core_config_from_env_values(
    data_dir: Option<String>,
    database_path: Option<String>,
) -> DriveResult<CoreConfig> {
    let data_dir = non_blank(data_dir).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
    CoreConfig::new(
        PathBuf::from(data_dir),
        non_blank(database_path).map(PathBuf::from),
    )
}

/// Connection settings for the external (Redis) cache tier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl RedisSettings {
    /// Structured connection details. The password is passed through as-is, never
    /// spliced into a URL.
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }
}

/// Cache configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub redis: Option<RedisSettings>,
    pub key_prefix: String,
    pub permission_ttl: Duration,
    pub stats_ttl: Duration,
    pub local_freshness: Duration,
    pub call_timeout: Duration,
    pub max_stats_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis: None,
            key_prefix: DEFAULT_CACHE_PREFIX.into(),
            permission_ttl: DEFAULT_PERMISSION_TTL,
            stats_ttl: DEFAULT_STATS_TTL,
            local_freshness: DEFAULT_LOCAL_FRESHNESS,
            call_timeout: DEFAULT_CACHE_TIMEOUT,
            max_stats_entries: MAX_STATS_ENTRIES,
        }
    }
}

/// Raw, unparsed cache settings as read from the environment.
///
/// Every field is optional; missing or blank values fall back to the defaults.
#[derive(Clone, Debug, Default)]
pub struct RawCacheSettings {
    pub redis_host: Option<String>,
    pub redis_port: Option<String>,
    pub redis_password: Option<String>,
    pub key_prefix: Option<String>,
    pub permission_ttl_minutes: Option<String>,
    pub stats_ttl_minutes: Option<String>,
    pub local_minutes: Option<String>,
    pub timeout_ms: Option<String>,
}

impl RawCacheSettings {
    /// Collects the raw settings through `lookup` (normally `std::env::var(..).ok()`).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            redis_host: lookup("REDIS_HOST"),
            redis_port: lookup("REDIS_PORT"),
            redis_password: lookup("REDIS_PASSWORD"),
            key_prefix: lookup("DRIVEFS_CACHE_PREFIX"),
            permission_ttl_minutes: lookup("DRIVEFS_PERMISSION_CACHE_TTL_MINUTES"),
            stats_ttl_minutes: lookup("DRIVEFS_STATS_CACHE_TTL_MINUTES"),
            local_minutes: lookup("DRIVEFS_LOCAL_CACHE_MINUTES"),
            timeout_ms: lookup("DRIVEFS_CACHE_TIMEOUT_MS"),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &str, value: Option<String>) -> DriveResult<Option<T>> {
    non_blank(value)
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| DriveError::invalid_input(format!("{name} must be a number, got '{v}'")))
        })
        .transpose()
}

/// Parse cache configuration from raw settings.
///
/// # Errors
/// Returns `DriveError::InvalidInput` if a numeric setting cannot be parsed or a TTL is zero.
pub fn cache_config_from_raw(raw: RawCacheSettings) -> DriveResult<CacheConfig> {
    let defaults = CacheConfig::default();

    let redis = match non_blank(raw.redis_host) {
        Some(host) => Some(RedisSettings {
            host,
            port: parse_number::<u16>("REDIS_PORT", raw.redis_port)?
                .unwrap_or(DEFAULT_REDIS_PORT),
            password: non_blank(raw.redis_password),
        }),
        None => None,
    };

    let minutes = |name: &str, value: Option<String>, default: Duration| -> DriveResult<Duration> {
        match parse_number::<u64>(name, value)? {
            Some(0) => Err(DriveError::invalid_input(format!("{name} must be positive"))),
            Some(m) => Ok(Duration::from_secs(m * 60)),
            None => Ok(default),
        }
    };

    Ok(CacheConfig {
        redis,
        key_prefix: non_blank(raw.key_prefix).unwrap_or(defaults.key_prefix),
        permission_ttl: minutes(
            "DRIVEFS_PERMISSION_CACHE_TTL_MINUTES",
            raw.permission_ttl_minutes,
            defaults.permission_ttl,
        )?,
        stats_ttl: minutes(
            "DRIVEFS_STATS_CACHE_TTL_MINUTES",
            raw.stats_ttl_minutes,
            defaults.stats_ttl,
        )?,
        local_freshness: minutes(
            "DRIVEFS_LOCAL_CACHE_MINUTES",
            raw.local_minutes,
            defaults.local_freshness,
        )?,
        call_timeout: parse_number::<u64>("DRIVEFS_CACHE_TIMEOUT_MS", raw.timeout_ms)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.call_timeout),
        max_stats_entries: defaults.max_stats_entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn raw(pairs: &[(&str, &str)]) -> RawCacheSettings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RawCacheSettings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_without_settings() {
        let cfg = cache_config_from_raw(RawCacheSettings::default()).unwrap();
        assert!(cfg.redis.is_none());
        assert_eq!(cfg.key_prefix, "drivefs:");
        assert_eq!(cfg.permission_ttl, Duration::from_secs(300));
        assert_eq!(cfg.stats_ttl, Duration::from_secs(1800));
        assert_eq!(cfg.local_freshness, Duration::from_secs(300));
        assert_eq!(cfg.call_timeout, Duration::from_secs(2));
    }

    #[test]
    fn redis_settings_and_overrides() {
        let cfg = cache_config_from_raw(raw(&[
            ("REDIS_HOST", "cache.internal"),
            ("REDIS_PASSWORD", "s3cret"),
            ("DRIVEFS_CACHE_PREFIX", "tenant-a:"),
            ("DRIVEFS_PERMISSION_CACHE_TTL_MINUTES", "10"),
            ("DRIVEFS_CACHE_TIMEOUT_MS", "750"),
        ]))
        .unwrap();

        let redis = cfg.redis.unwrap();
        assert_eq!(redis.port, 6379);
        let info = redis.connection_info();
        assert!(matches!(&info.addr, ConnectionAddr::Tcp(host, 6379) if host == "cache.internal"));
        assert_eq!(info.redis.password.as_deref(), Some("s3cret"));
        assert_eq!(cfg.key_prefix, "tenant-a:");
        assert_eq!(cfg.permission_ttl, Duration::from_secs(600));
        assert_eq!(cfg.call_timeout, Duration::from_millis(750));
    }

    #[test]
    fn redis_password_keeps_url_delimiters() {
        let cfg = cache_config_from_raw(raw(&[
            ("REDIS_HOST", "cache.internal"),
            ("REDIS_PORT", "6380"),
            ("REDIS_PASSWORD", "p@ss/w:rd#1"),
        ]))
        .unwrap();

        let info = cfg.redis.unwrap().connection_info();
        assert!(matches!(&info.addr, ConnectionAddr::Tcp(host, 6380) if host == "cache.internal"));
        assert_eq!(info.redis.password.as_deref(), Some("p@ss/w:rd#1"));
        assert_eq!(info.redis.db, 0);
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(cache_config_from_raw(raw(&[("REDIS_HOST", "h"), ("REDIS_PORT", "x")])).is_err());
        assert!(
            cache_config_from_raw(raw(&[("DRIVEFS_STATS_CACHE_TTL_MINUTES", "0")])).is_err()
        );
    }

    #[test]
    fn core_config_paths() {
        let cfg = CoreConfig::new(PathBuf::from("/srv/drivefs"), None).unwrap();
        assert_eq!(cfg.users_root(), PathBuf::from("/srv/drivefs/users"));
        assert_eq!(cfg.drives_root(), PathBuf::from("/srv/drivefs/drives"));
        assert_eq!(cfg.database_path(), Path::new("/srv/drivefs/drivefs.db"));
        assert!(CoreConfig::new(PathBuf::new(), None).is_err());
    }

    #[test]
    fn core_config_from_env() {
        let cfg = core_config_from_env_values(None, Some("  ".into())).unwrap();
        assert_eq!(cfg.data_dir(), Path::new("drivefs_data"));
        assert_eq!(cfg.database_path(), Path::new("drivefs_data/drivefs.db"));

        let cfg =
            core_config_from_env_values(Some("/srv/d".into()), Some("/var/db/x.db".into())).unwrap();
        assert_eq!(cfg.database_path(), Path::new("/var/db/x.db"));
    }
}
