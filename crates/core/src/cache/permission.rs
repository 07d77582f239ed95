use super::{ExternalCache, TwoTierCache};
use crate::config::CacheConfig;
use crate::paths::is_same_or_under;
use dashmap::DashMap;
use drivefs_types::PermissionLevel;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Cached permission verdicts and per-actor accessible drive lists.
///
/// Verdict keys are `<actor>:<level>:<home owner or ->:<virtual path>`, with the path last so
/// it may contain any character. Drive-list keys are the actor id alone.
///
/// Every invalidation bumps a generation before it deletes anything. Callers take a
/// [`CacheTicket`] before computing a value and hand it back when storing; a value computed
/// under an older generation is dropped instead of cached.
pub struct PermissionCache {
    verdicts: TwoTierCache,
    drive_lists: TwoTierCache,
    /// Bumped by drive-wide and full invalidations.
    epoch: AtomicU64,
    actors: DashMap<Uuid, u64>,
}

/// Generations observed before a lookup was computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheTicket {
    actor: Uuid,
    epoch: u64,
    generation: u64,
}

fn verdict_key(actor: Uuid, level: PermissionLevel, owner: Option<Uuid>, path: &str) -> String {
    let owner = owner.map_or_else(|| "-".to_string(), |o| o.simple().to_string());
    format!("{}:{}:{}:{}", actor.simple(), level.as_str(), owner, path)
}

/// The virtual path component of a verdict key.
fn verdict_path(key: &str) -> Option<&str> {
    key.splitn(4, ':').nth(3)
}

impl PermissionCache {
    pub fn new(config: &CacheConfig, external: Option<Arc<dyn ExternalCache>>) -> Self {
        Self {
            verdicts: TwoTierCache::new("perm", config, config.permission_ttl, external.clone()),
            drive_lists: TwoTierCache::new("drives", config, config.permission_ttl, external),
            epoch: AtomicU64::new(0),
            actors: DashMap::new(),
        }
    }

    /// Snapshot of the generations covering `actor`. Take it before computing anything to store.
    pub fn ticket(&self, actor: Uuid) -> CacheTicket {
        CacheTicket {
            actor,
            epoch: self.epoch.load(Ordering::SeqCst),
            generation: self.actors.get(&actor).map_or(0, |g| *g),
        }
    }

    fn is_current(&self, ticket: &CacheTicket) -> bool {
        self.ticket(ticket.actor) == *ticket
    }

    fn bump_actor(&self, actor: Uuid) {
        *self.actors.entry(actor).or_insert(0) += 1;
    }

    pub async fn verdict(
        &self,
        actor: Uuid,
        level: PermissionLevel,
        owner: Option<Uuid>,
        path: &str,
    ) -> Option<bool> {
        self.verdicts
            .get(&verdict_key(actor, level, owner, path))
            .await
    }

    /// Caches a verdict computed under `ticket`, unless an invalidation has run since.
    pub async fn store_verdict(
        &self,
        ticket: &CacheTicket,
        level: PermissionLevel,
        owner: Option<Uuid>,
        path: &str,
        allowed: bool,
    ) {
        let key = verdict_key(ticket.actor, level, owner, path);
        self.store_checked(&self.verdicts, ticket, &key, &allowed).await;
    }

    pub async fn drive_list(&self, actor: Uuid) -> Option<Vec<String>> {
        self.drive_lists.get(&actor.simple().to_string()).await
    }

    pub async fn store_drive_list(&self, ticket: &CacheTicket, drives: &[String]) {
        let key = ticket.actor.simple().to_string();
        self.store_checked(&self.drive_lists, ticket, &key, &drives).await;
    }

    /// Invalidations bump generations before deleting, so an entry written concurrently is
    /// either deleted by the invalidation or caught by the second check here.
    async fn store_checked<T: serde::Serialize>(
        &self,
        cache: &TwoTierCache,
        ticket: &CacheTicket,
        key: &str,
        value: &T,
    ) {
        if !self.is_current(ticket) {
            return;
        }
        cache.set(key, value).await;
        if !self.is_current(ticket) {
            cache.remove(key).await;
        }
    }

    /// Drops every verdict and the drive list of `actor`.
    pub async fn invalidate_user(&self, actor: Uuid) {
        self.bump_actor(actor);
        let prefix = format!("{}:", actor.simple());
        self.verdicts.remove_where(&prefix, |_| true).await;
        self.drive_lists.remove(&actor.simple().to_string()).await;
        tracing::debug!(%actor, "permission cache invalidated for user");
    }

    /// Drops every verdict on a path inside drive `name` and every actor's drive list.
    pub async fn invalidate_drive(&self, name: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let root = format!("/shared/{name}");
        self.verdicts
            .remove_where("", |key| {
                verdict_path(key).is_some_and(|path| is_same_or_under(path, &root))
            })
            .await;
        self.drive_lists.clear().await;
        tracing::debug!(drive = name, "permission cache invalidated for drive");
    }

    pub async fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.verdicts.clear().await;
        self.drive_lists.clear().await;
    }

    pub(crate) fn clear_local(&self) {
        self.verdicts.clear_local();
        self.drive_lists.clear_local();
    }
}
