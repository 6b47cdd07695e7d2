//! Two-tier cache store: in-process map in front of a persistent tier

use crate::cache::{
    config::CacheConfig,
    entry::CacheEntry,
    persistent::{FileTier, MemoryTier, PersistentTier},
    types::{CacheKey, CacheStats, Tier},
};
use crate::error::Result;
use chrono::Utc;
use serde::{de::DeserializeOwned, de::IgnoredAny, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// TTL-bounded memoization of arbitrary payloads over two tiers
///
/// This implementation provides:
/// - An in-process tier guarded by an async RwLock, never held across
///   persistent-tier I/O
/// - A persistent tier (source of truth across restarts) behind
///   [`PersistentTier`], whose failures are logged and swallowed
/// - Lazy expiry on read and eager expiry via [`CacheStore::sweep_expired`]
pub struct CacheStore<T> {
    /// Cache configuration
    pub(crate) config: CacheConfig,

    /// In-process tier
    tier: RwLock<InProcessTier<T>>,

    /// Durable tier
    persistent: Arc<dyn PersistentTier>,
}

/// Internal in-process storage
struct InProcessTier<T> {
    /// Main storage: key -> entry
    entries: HashMap<CacheKey, CacheEntry<T>>,

    /// Current cache statistics
    stats: CacheStats,

    /// Bumped on every set, delete and eviction so a slow persistent read
    /// can tell the key was rewritten or removed while it waited
    generation: u64,
}

impl<T> CacheStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a store over the given persistent tier
    pub fn new(config: CacheConfig, persistent: Arc<dyn PersistentTier>) -> Self {
        info!(
            "Initializing cache store (namespace: {}, default_ttl: {:?})",
            config.namespace, config.default_ttl
        );

        Self {
            config,
            tier: RwLock::new(InProcessTier {
                entries: HashMap::new(),
                stats: CacheStats::default(),
                generation: 0,
            }),
            persistent,
        }
    }

    /// Create a store whose persistent tier lives in memory
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(config, Arc::new(MemoryTier::new()))
    }

    /// Create a store backed by `config.cache_dir`, or by memory if unset
    pub async fn open(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let persistent: Arc<dyn PersistentTier> = match &config.cache_dir {
            Some(dir) => Arc::new(FileTier::open(dir.clone()).await?),
            None => Arc::new(MemoryTier::new()),
        };

        Ok(Self::new(config, persistent))
    }

    /// The configuration this store was built with
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The persistent tier shared with other components
    pub fn persistent(&self) -> Arc<dyn PersistentTier> {
        self.persistent.clone()
    }

    /// Store `value` under `key` with the default TTL (jitter applied)
    pub async fn insert(&self, key: impl Into<CacheKey>, value: T) {
        let ttl = self.config.ttl_with_jitter();
        self.set(key, value, ttl).await
    }

    /// Store `value` under `key` for `ttl`
    ///
    /// The in-process write always happens. The persistent write is
    /// best-effort: serialization or storage failures are logged and the
    /// entry stays cached in process only.
    pub async fn set(&self, key: impl Into<CacheKey>, value: T, ttl: Duration) {
        let key = key.into();
        let entry = CacheEntry::new(key.clone(), value, ttl);
        let serialized = serde_json::to_string(&entry);

        {
            let mut tier = self.tier.write().await;
            debug!("Caching entry {} for {:?}", key, ttl);
            tier.entries.insert(key.clone(), entry);
            tier.generation += 1;
        }

        let result = match serialized {
            Ok(json) => self.persistent.write(&self.namespaced(&key), &json).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            warn!("Persistent write failed for {}, keeping in-process copy only: {}", key, e);
            self.tier.write().await.stats.persistent_failures += 1;
        }
    }

    /// Get a value from the cache
    ///
    /// Checks the in-process tier, then the persistent tier. A valid
    /// persistent entry is promoted into process. Expired entries are
    /// removed from both tiers; unreadable persistent entries are treated
    /// as a miss and removed.
    pub async fn get(&self, key: &str) -> Option<T> {
        let now = Utc::now();

        let seen = {
            let mut tier = self.tier.write().await;

            let cached = tier
                .entries
                .get(key)
                .map(|entry| (!entry.is_expired_at(now)).then(|| entry.value.clone()));

            match cached {
                Some(Some(value)) => {
                    tier.stats.hits += 1;
                    debug!("Cache hit ({}): {}", Tier::InProcess, key);
                    return Some(value);
                }
                Some(None) => {
                    debug!("Cache entry expired: {}", key);
                    tier.entries.remove(key);
                    tier.stats.evictions_ttl += 1;
                    tier.stats.misses += 1;
                    tier.generation += 1;
                    let generation = tier.generation;
                    drop(tier);
                    self.remove_persistent(key).await;
                    self.restore_if_rewritten(key, generation).await;
                    return None;
                }
                None => tier.generation,
            }
        };

        match self.read_persistent(key, seen).await {
            Some(entry) if !entry.is_expired_at(now) => {
                let value = entry.value.clone();
                let mut tier = self.tier.write().await;

                // A concurrent delete wins over this promotion; a concurrent
                // set already holds a fresher entry.
                if tier.generation == seen {
                    tier.entries.entry(key.to_string()).or_insert(entry);
                }
                tier.stats.hits += 1;
                tier.stats.promotions += 1;
                debug!("Cache hit ({}), promoted: {}", Tier::Persistent, key);
                Some(value)
            }
            Some(_) => {
                debug!("Persistent entry expired: {}", key);
                let evicted = self.evict_stale(key, seen).await;
                let mut tier = self.tier.write().await;
                if evicted {
                    tier.stats.evictions_ttl += 1;
                }
                tier.stats.misses += 1;
                None
            }
            None => {
                debug!("Cache miss: {}", key);
                self.tier.write().await.stats.misses += 1;
                None
            }
        }
    }

    /// Remove `key` from both tiers
    pub async fn delete(&self, key: &str) {
        {
            let mut tier = self.tier.write().await;
            tier.entries.remove(key);
            tier.generation += 1;
        }
        self.remove_persistent(key).await;
        debug!("Deleted cache entry: {}", key);
    }

    /// Remove every entry in this store's namespace from both tiers
    pub async fn clear(&self) -> Result<usize> {
        let keys = self.persistent.list_keys(&self.prefix()).await?;
        for namespaced in &keys {
            self.persistent.remove(namespaced).await?;
        }

        let mut tier = self.tier.write().await;
        let count = tier.entries.len().max(keys.len());
        tier.entries.clear();
        tier.generation += 1;

        info!("Cleared {} entries from cache", count);
        Ok(count)
    }

    /// Remove every expired entry from both tiers
    ///
    /// Maintenance only: `get` never returns an expired value regardless.
    /// Persistent entries that cannot be parsed are removed too. An entry
    /// rewritten while the sweep inspected it is left alone. Returns the
    /// number of distinct keys removed.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut removed: HashSet<CacheKey> = HashSet::new();

        let prefix = self.prefix();
        for namespaced in self.persistent.list_keys(&prefix).await? {
            let key = namespaced[prefix.len()..].to_string();
            let seen = self.tier.read().await.generation;

            let stale = match self.persistent.read(&namespaced).await {
                Ok(Some(json)) => match serde_json::from_str::<CacheEntry<IgnoredAny>>(&json) {
                    Ok(header) => header.is_expired_at(now),
                    Err(e) => {
                        warn!("Dropping unreadable persistent entry {}: {}", key, e);
                        true
                    }
                },
                Ok(None) => false,
                Err(e) => {
                    warn!("Sweep could not read {}: {}", key, e);
                    false
                }
            };

            if stale && self.evict_stale(&key, seen).await {
                removed.insert(key);
            }
        }

        let mut tier = self.tier.write().await;
        let expired_in_process: Vec<CacheKey> = tier
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired_in_process {
            tier.entries.remove(&key);
            removed.insert(key);
        }
        tier.stats.evictions_ttl += removed.len() as u64;

        if !removed.is_empty() {
            info!("Swept {} expired entries", removed.len());
        }
        Ok(removed.len())
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let listed = self.persistent.list_keys(&self.prefix()).await;

        let tier = self.tier.read().await;
        let mut stats = tier.stats.clone();
        stats.in_process_entries = tier.entries.len();
        stats.total_entries = match listed {
            Ok(keys) => keys.len(),
            Err(e) => {
                warn!("Could not list persistent entries: {}", e);
                tier.entries.len()
            }
        };
        stats
    }

    /// Number of entries held in process
    pub async fn len(&self) -> usize {
        self.tier.read().await.entries.len()
    }

    /// Check if the in-process tier is empty
    pub async fn is_empty(&self) -> bool {
        self.tier.read().await.entries.is_empty()
    }

    fn prefix(&self) -> String {
        format!("{}:", self.config.namespace)
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.config.namespace, key)
    }

    /// Internal: read and decode a persistent entry; failures become misses
    async fn read_persistent(&self, key: &str, seen: u64) -> Option<CacheEntry<T>> {
        let namespaced = self.namespaced(key);

        let json = match self.persistent.read(&namespaced).await {
            Ok(json) => json?,
            Err(e) => {
                warn!("Persistent read failed for {}, treating as miss: {}", key, e);
                self.tier.write().await.stats.persistent_failures += 1;
                return None;
            }
        };

        match serde_json::from_str(&json) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Corrupt persistent entry {}, treating as miss: {}", key, e);
                self.tier.write().await.stats.persistent_failures += 1;
                self.evict_stale(key, seen).await;
                None
            }
        }
    }

    /// Internal: remove a stale persistent entry unless `key` was written
    /// or removed since generation `seen` was observed
    ///
    /// The in-process copy goes too, but only if it has itself expired.
    /// Returns whether the persistent entry was removed.
    async fn evict_stale(&self, key: &str, seen: u64) -> bool {
        let generation = {
            let mut tier = self.tier.write().await;
            if tier.generation != seen {
                debug!("Skipping eviction of {}, rewritten meanwhile", key);
                return false;
            }

            let now = Utc::now();
            if tier.entries.get(key).map_or(false, |e| e.is_expired_at(now)) {
                tier.entries.remove(key);
            }
            tier.generation += 1;
            tier.generation
        };

        let removed = self.remove_persistent(key).await;
        self.restore_if_rewritten(key, generation).await;
        removed
    }

    /// Internal: a set that landed while a stale persistent entry was being
    /// removed may have had its own write removed with it; write the live
    /// in-process entry back
    async fn restore_if_rewritten(&self, key: &str, generation: u64) {
        let serialized = {
            let tier = self.tier.read().await;
            if tier.generation == generation {
                return;
            }
            match tier.entries.get(key) {
                Some(entry) if !entry.is_expired() => serde_json::to_string(entry),
                _ => return,
            }
        };

        let result = match serialized {
            Ok(json) => self.persistent.write(&self.namespaced(key), &json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!("Could not restore persistent entry {}: {}", key, e);
            self.tier.write().await.stats.persistent_failures += 1;
        }
    }

    /// Internal: best-effort persistent removal
    async fn remove_persistent(&self, key: &str) -> bool {
        match self.persistent.remove(&self.namespaced(key)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Persistent remove failed for {}: {}", key, e);
                self.tier.write().await.stats.persistent_failures += 1;
                false
            }
        }
    }
}

/// Spawn a background task that sweeps `cache` every `sweep_interval`
pub fn spawn_auto_sweep<T>(cache: Arc<CacheStore<T>>) -> JoinHandle<()>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let interval = cache.config.sweep_interval;

    info!("Starting automatic cache sweep task (interval: {:?})", interval);

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            match cache.sweep_expired().await {
                Ok(removed) if removed > 0 => debug!("Auto sweep removed {} entries", removed),
                Ok(_) => {}
                Err(e) => warn!("Auto sweep failed: {}", e),
            }
        }
    })
}
