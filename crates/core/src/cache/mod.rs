//! Two-tier caching of permission verdicts, drive lists and folder statistics.
//!
//! Every cache is a [`TwoTierCache`]: an in-process `DashMap` in front of an optional
//! [`ExternalCache`] shared between instances. Reads go local → external → miss, writes fill
//! both tiers. External failures and timeouts are logged at debug level and treated as misses,
//! so a cache outage only costs latency.
//!
//! Entries are derived data. Dropping any of them at any time is always correct. Keeping one
//! that an invalidation meant to drop is not: when an external delete fails, the cache stops
//! reading the external tier until everything written before the failure has expired.

mod external;
mod permission;
mod stats;

pub use external::{CacheError, ExternalCache, MemoryExternalCache, RedisCache};
pub use permission::{CacheTicket, PermissionCache};
pub use stats::{FolderStats, StatsCache};

use crate::config::CacheConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct LocalEntry {
    payload: String,
    stored_at: Instant,
}

/// One logical cache: a key namespace with its own TTL, spread over both tiers.
pub struct TwoTierCache {
    namespace: &'static str,
    key_prefix: String,
    local: DashMap<String, LocalEntry>,
    external: Option<Arc<dyn ExternalCache>>,
    ttl: Duration,
    local_freshness: Duration,
    call_timeout: Duration,
    /// Set when an external invalidation failed; external reads are skipped until then.
    untrusted_until: Mutex<Option<Instant>>,
}

impl TwoTierCache {
    pub fn new(
        namespace: &'static str,
        config: &CacheConfig,
        ttl: Duration,
        external: Option<Arc<dyn ExternalCache>>,
    ) -> Self {
        Self {
            namespace,
            key_prefix: format!("{}{}:", config.key_prefix, namespace),
            local: DashMap::new(),
            external,
            ttl,
            local_freshness: config.local_freshness.min(ttl),
            call_timeout: config.call_timeout,
            untrusted_until: Mutex::new(None),
        }
    }

    fn external_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Runs one external call under the configured timeout; any failure becomes `None`.
    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, CacheError>>,
    ) -> Option<T> {
        let err = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(err)) => err,
            Err(_) => CacheError::Timeout,
        };
        tracing::debug!(cache = self.namespace, op, error = %err, "external cache call failed");
        None
    }

    /// Stop trusting the external tier for one TTL, after which every entry that survived a
    /// failed invalidation has expired there.
    fn distrust_external(&self) {
        let until = Instant::now() + self.ttl;
        *self.untrusted_until.lock() = Some(until);
        tracing::warn!(
            cache = self.namespace,
            ttl_secs = self.ttl.as_secs(),
            "external invalidation failed, bypassing external reads"
        );
    }

    fn external_trusted(&self) -> bool {
        let mut guard = self.untrusted_until.lock();
        match *guard {
            Some(until) if Instant::now() < until => false,
            Some(_) => {
                *guard = None;
                true
            }
            None => true,
        }
    }

    /// Looks `key` up in the local tier, evicting it if it has outlived the freshness window.
    fn local_get(&self, key: &str) -> Option<String> {
        let hit = self.local.get(key).map(|entry| {
            (
                entry.stored_at.elapsed() < self.local_freshness,
                entry.payload.clone(),
            )
        });
        match hit {
            Some((true, payload)) => Some(payload),
            Some((false, _)) => {
                self.local.remove(key);
                None
            }
            None => None,
        }
    }

    fn local_put(&self, key: &str, payload: String) {
        self.local.insert(
            key.to_string(),
            LocalEntry {
                payload,
                stored_at: Instant::now(),
            },
        );
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = match self.local_get(key) {
            Some(payload) => payload,
            None => {
                let external = self.external.as_ref()?;
                if !self.external_trusted() {
                    return None;
                }
                let full = self.external_key(key);
                let payload = self.bounded("get", external.get(&full)).await.flatten()?;
                self.local_put(key, payload.clone());
                payload
            }
        };

        match serde_json::from_str(&payload) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(cache = self.namespace, error = %err, "discarding undecodable cache entry");
                self.remove(key).await;
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::debug!(cache = self.namespace, error = %err, "cache entry not serialisable");
                return;
            }
        };
        if let Some(external) = &self.external {
            let full = self.external_key(key);
            self.bounded("set", external.set(&full, &payload, self.ttl))
                .await;
        }
        self.local_put(key, payload);
    }

    pub async fn remove(&self, key: &str) {
        self.local.remove(key);
        if let Some(external) = &self.external {
            let full = [self.external_key(key)];
            if self.bounded("delete", external.delete(&full)).await.is_none() {
                self.distrust_external();
            }
        }
    }

    /// Removes every key starting with `prefix` for which `matches` holds, in both tiers.
    pub async fn remove_where(&self, prefix: &str, matches: impl Fn(&str) -> bool) {
        self.local
            .retain(|key, _| !(key.starts_with(prefix) && matches(key)));

        let Some(external) = &self.external else {
            return;
        };
        let full_prefix = self.external_key(prefix);
        let Some(keys) = self.bounded("keys", external.keys(&full_prefix)).await else {
            self.distrust_external();
            return;
        };
        let doomed: Vec<String> = keys
            .into_iter()
            .filter(|full| {
                full.strip_prefix(self.key_prefix.as_str())
                    .is_some_and(|key| matches(key))
            })
            .collect();
        if !doomed.is_empty() && self.bounded("delete", external.delete(&doomed)).await.is_none() {
            self.distrust_external();
        }
    }

    /// Drops every entry of this cache in both tiers.
    pub async fn clear(&self) {
        self.remove_where("", |_| true).await;
    }

    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    pub(crate) fn clear_local(&self) {
        self.local.clear();
    }
}

/// Owner of every cache in the process.
///
/// Built once at startup and handed to the services that need it; there are no globals.
pub struct CacheService {
    permissions: PermissionCache,
    stats: StatsCache,
    external: Option<Arc<dyn ExternalCache>>,
}

impl CacheService {
    /// Build the caches, connecting to Redis when configured.
    ///
    /// A Redis connection failure is logged and the service falls back to the local tier only.
    pub async fn open(config: &CacheConfig) -> Self {
        let external: Option<Arc<dyn ExternalCache>> = match &config.redis {
            Some(redis) => {
                let connect = RedisCache::connect(redis.connection_info());
                match tokio::time::timeout(config.call_timeout, connect).await {
                    Ok(Ok(cache)) => {
                        tracing::info!(host = %redis.host, port = redis.port, "connected to external cache");
                        Some(Arc::new(cache))
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(error = %err, "external cache unavailable, using local cache only");
                        None
                    }
                    Err(_) => {
                        tracing::warn!("external cache connection timed out, using local cache only");
                        None
                    }
                }
            }
            None => None,
        };
        Self::with_external(config, external)
    }

    /// Build the caches over an explicit external tier (or none).
    pub fn with_external(config: &CacheConfig, external: Option<Arc<dyn ExternalCache>>) -> Self {
        Self {
            permissions: PermissionCache::new(config, external.clone()),
            stats: StatsCache::new(config, external.clone()),
            external,
        }
    }

    pub fn permissions(&self) -> &PermissionCache {
        &self.permissions
    }

    pub fn stats(&self) -> &StatsCache {
        &self.stats
    }

    pub fn has_external(&self) -> bool {
        self.external.is_some()
    }

    /// Full invalidation sweep over both tiers of every cache.
    pub async fn flush_all(&self) {
        self.permissions.invalidate_all().await;
        self.stats.clear().await;
        tracing::info!("all caches flushed");
    }

    /// Shutdown hook. Local entries are dropped; the external tier is left to expire on its own.
    pub async fn close(&self) {
        self.permissions.clear_local();
        self.stats.clear_local();
        tracing::debug!("cache service closed");
    }
}
