//! MetadataManager - owns every live MetadataCache and persists them
//!
//! One cache per document, created lazily on first `acquire`. Writes are
//! coalesced: widgets only mark caches dirty, and `sync_cycle` (driven by
//! `spawn_sync_loop`) flushes each dirty cache with a single store write.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::MetadataCache;
use crate::binding::{resolve_bind_target, BindTarget};
use crate::error::Result;
use crate::store::{DocumentRef, DocumentStore};

/// Sync cycles a cache may sit without subscribers before eviction
pub const DEFAULT_EVICT_AFTER_CYCLES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub evict_after_cycles: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            evict_after_cycles: DEFAULT_EVICT_AFTER_CYCLES,
        }
    }
}

/// Outcome of one sync cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub flushed: usize,
    pub failed: usize,
    pub evicted: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.flushed == 0 && self.failed == 0 && self.evicted == 0
    }
}

pub struct MetadataManager {
    store: Arc<dyn DocumentStore>,
    caches: DashMap<DocumentRef, Arc<MetadataCache>>,
    settings: SyncSettings,
}

impl MetadataManager {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_settings(store, SyncSettings::default())
    }

    pub fn with_settings(store: Arc<dyn DocumentStore>, settings: SyncSettings) -> Self {
        Self {
            store,
            caches: DashMap::new(),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn settings(&self) -> SyncSettings {
        self.settings
    }

    /// Resolve declaration target text against this manager's store
    pub fn resolve(&self, raw: &str, current: &DocumentRef) -> Result<BindTarget> {
        resolve_bind_target(raw, current, self.store.as_ref())
    }

    /// Get the cache for `document`, reading it from the store on first use
    ///
    /// Does not register anything; an acquired cache with no subscribers is
    /// evicted by the sync cycle like any other idle cache.
    pub async fn acquire(&self, document: &DocumentRef) -> Result<Arc<MetadataCache>> {
        if let Some(cache) = self.cached(document) {
            return Ok(cache);
        }

        let tree = self.store.read_metadata(document).await?;

        // Another task may have created it while we were reading; keep theirs
        let cache = Arc::clone(
            self.caches
                .entry(document.clone())
                .or_insert_with(|| {
                    tracing::debug!(document = %document, "metadata cache created");
                    Arc::new(MetadataCache::new(document.clone(), tree))
                })
                .value(),
        );
        Ok(cache)
    }

    /// Cache for `document` if one is live
    pub fn cached(&self, document: &DocumentRef) -> Option<Arc<MetadataCache>> {
        self.caches.get(document).map(|c| Arc::clone(c.value()))
    }

    pub fn is_cached(&self, document: &DocumentRef) -> bool {
        self.caches.contains_key(document)
    }

    pub fn cache_count(&self) -> usize {
        self.caches.len()
    }

    /// Value currently bound at `target`, without creating a cache
    pub async fn get_initial_value(&self, target: &BindTarget) -> Result<Option<Value>> {
        if let Some(cache) = self.cached(&target.document) {
            return Ok(cache.get(&target.path));
        }
        let tree = self.store.read_metadata(&target.document).await?;
        Ok(target.path.read(&tree))
    }

    /// Re-read `document` from storage and push it to every subscriber
    ///
    /// Returns false if nothing was refreshed: the document has no live
    /// cache, or storage still holds exactly what the cache last read or
    /// flushed (our own write coming back through a file watcher). Edits made
    /// since then stay in place. Otherwise the stored content wins and
    /// unflushed local edits are discarded.
    pub async fn invalidate_and_reload(&self, document: &DocumentRef) -> Result<bool> {
        let Some(cache) = self.cached(document) else {
            return Ok(false);
        };

        let tree = self.store.read_metadata(document).await?;
        if cache.is_persisted(&tree) {
            tracing::debug!(document = %document, "storage unchanged since last sync, reload skipped");
            return Ok(false);
        }
        if cache.is_dirty() {
            tracing::warn!(document = %document, "reload discards unflushed edits");
        }
        cache.reload(tree);
        tracing::info!(
            document = %document,
            subscribers = cache.subscriber_count(),
            "metadata reloaded from storage"
        );
        Ok(true)
    }

    /// One tick: flush dirty caches, then evict long-idle clean ones
    pub async fn sync_cycle(&self) -> SyncReport {
        let mut report = SyncReport::default();

        for cache in self.live_caches() {
            self.flush(&cache, &mut report).await;

            let idle = cache.tick_idle();
            if idle < self.settings.evict_after_cycles {
                continue;
            }
            let evicted = self.caches.remove_if(cache.document(), |_, live| {
                Arc::ptr_eq(live, &cache) && live.subscriber_count() == 0 && !live.is_dirty()
            });
            if evicted.is_some() {
                tracing::info!(document = %cache.document(), idle_cycles = idle, "metadata cache evicted");
                report.evicted += 1;
            }
        }

        report
    }

    /// Flush every dirty cache now (used on shutdown)
    pub async fn flush_all(&self) -> SyncReport {
        let mut report = SyncReport::default();
        for cache in self.live_caches() {
            self.flush(&cache, &mut report).await;
        }
        report
    }

    /// Run `sync_cycle` every `interval` until `cancel` fires, then flush once more
    pub fn spawn_sync_loop(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = self.sync_cycle().await;
                        if !report.is_empty() {
                            tracing::debug!(
                                flushed = report.flushed,
                                failed = report.failed,
                                evicted = report.evicted,
                                "sync cycle"
                            );
                        }
                    }
                }
            }

            let report = self.flush_all().await;
            if report.failed > 0 {
                tracing::warn!(failed = report.failed, "final flush left unsaved metadata");
            }
            tracing::debug!(flushed = report.flushed, "sync loop stopped");
        })
    }

    fn live_caches(&self) -> Vec<Arc<MetadataCache>> {
        self.caches.iter().map(|c| Arc::clone(c.value())).collect()
    }

    async fn flush(&self, cache: &MetadataCache, report: &mut SyncReport) {
        let Some(tree) = cache.take_dirty_snapshot() else {
            return;
        };

        match self.store.write_metadata(cache.document(), &tree).await {
            Ok(()) => {
                cache.mark_persisted(tree);
                tracing::debug!(document = %cache.document(), "metadata flushed");
                report.flushed += 1;
            }
            Err(e) => {
                // Keep the in-memory tree; retry on the next cycle
                cache.mark_dirty();
                tracing::warn!(document = %cache.document(), error = %e, "metadata flush failed");
                report.failed += 1;
            }
        }
    }
}

impl std::fmt::Debug for MetadataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataManager")
            .field("caches", &self.caches.len())
            .field("settings", &self.settings)
            .finish()
    }
}
