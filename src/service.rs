//! Cache-then-coordinate-then-meter front door for expensive generation calls
//!
//! Callers hand over the semantic inputs, the metric the call counts
//! against, and the operation itself. The service derives the cache key,
//! answers from cache when it can, and otherwise runs the operation once
//! for all concurrent callers before storing and metering the result.

use crate::cache::{derive_key, spawn_auto_sweep, CacheStore, CacheStats};
use crate::config::GenCacheConfig;
use crate::coordinator::RequestCoordinator;
use crate::error::{GenCacheError, Result};
use crate::usage::{UsageMeter, UsageSnapshot};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One shared cache, coordinator and meter, constructed at process start
pub struct GenerationService<T> {
    cache: Arc<CacheStore<T>>,
    coordinator: Arc<RequestCoordinator<T>>,
    meter: Arc<UsageMeter>,
    sweeper: Option<Arc<SweepTask>>,
}

/// Background sweep, stopped when the last service clone goes away
struct SweepTask(JoinHandle<()>);

impl Drop for SweepTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<T> Clone for GenerationService<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            coordinator: self.coordinator.clone(),
            meter: self.meter.clone(),
            sweeper: self.sweeper.clone(),
        }
    }
}

impl<T> GenerationService<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Build a service from already constructed components
    pub fn from_parts(
        cache: Arc<CacheStore<T>>,
        coordinator: Arc<RequestCoordinator<T>>,
        meter: Arc<UsageMeter>,
    ) -> Self {
        Self {
            cache,
            coordinator,
            meter,
            sweeper: None,
        }
    }

    /// Open the store and restore usage counters saved by a previous run
    pub async fn open(config: GenCacheConfig) -> Result<Self> {
        config.validate()?;

        let cache = CacheStore::open(config.cache).await?;
        let meter = UsageMeter::load(
            cache.persistent().as_ref(),
            &cache.config().namespace,
            config.usage,
        )
        .await;

        info!("Generation service ready (namespace: {})", cache.config().namespace);

        let cache = Arc::new(cache);
        let sweeper = cache
            .config()
            .enable_auto_sweep
            .then(|| Arc::new(SweepTask(spawn_auto_sweep(cache.clone()))));

        Ok(Self {
            sweeper,
            ..Self::from_parts(
                cache,
                Arc::new(RequestCoordinator::new(config.coordinator)),
                Arc::new(meter),
            )
        })
    }

    pub fn cache(&self) -> &Arc<CacheStore<T>> {
        &self.cache
    }

    pub fn coordinator(&self) -> &Arc<RequestCoordinator<T>> {
        &self.coordinator
    }

    pub fn meter(&self) -> &Arc<UsageMeter> {
        &self.meter
    }

    /// Serve from cache or run `operation`, with the category's TTL
    pub async fn call<S, F, Fut>(
        &self,
        category: impl Display,
        inputs: &[S],
        metric: &str,
        operation: F,
    ) -> Result<T>
    where
        S: AsRef<str>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let ttl = self.cache.config().ttl_for(&category.to_string());
        self.call_with_ttl(category, inputs, metric, ttl, operation).await
    }

    /// Serve from cache or run `operation`, caching a success for `ttl`
    ///
    /// A cache hit, or attaching to a call already in flight, counts as a
    /// saved call. The invocation itself is metered once whether it
    /// succeeds, fails or panics. Failures are never cached.
    pub async fn call_with_ttl<S, F, Fut>(
        &self,
        category: impl Display,
        inputs: &[S],
        metric: &str,
        ttl: Duration,
        operation: F,
    ) -> Result<T>
    where
        S: AsRef<str>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let key = derive_key(category, inputs);

        if let Some(value) = self.cache.get(&key).await {
            self.meter.track_saved(metric);
            return Ok(value);
        }

        let mut invoked = false;
        let outcome = self
            .coordinator
            .deduplicate(&key, || {
                invoked = true;

                let work = operation();
                let cache = self.cache.clone();
                let meter = self.meter.clone();
                let metric = metric.to_string();
                let key = key.clone();

                async move {
                    let result = work.await;
                    meter.track_call_once(&metric);
                    if let Ok(value) = &result {
                        cache.set(key, value.clone(), ttl).await;
                    }
                    result
                }
            })
            .await;

        if !invoked {
            debug!("Joined in-flight call: {}", key);
            self.meter.track_saved(metric);
        } else if matches!(outcome, Err(GenCacheError::TaskFailed(_))) {
            // The operation panicked before it could meter itself
            self.meter.track_call_once(metric);
        }

        outcome
    }

    /// Store statistics
    pub async fn stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Current usage window
    pub fn usage(&self) -> UsageSnapshot {
        self.meter.usage()
    }

    /// Persist usage counters next to the cache entries
    pub async fn save_usage(&self) -> Result<()> {
        self.meter
            .save(self.cache.persistent().as_ref(), &self.cache.config().namespace)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, Category};
    use crate::coordinator::CoordinatorConfig;
    use crate::usage::UsageConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service() -> GenerationService<String> {
        GenerationService::from_parts(
            Arc::new(CacheStore::in_memory(CacheConfig::default())),
            Arc::new(RequestCoordinator::new(CoordinatorConfig::default())),
            Arc::new(UsageMeter::new(UsageConfig::default())),
        )
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let service = service();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let value = service
                .call(
                    Category::Recipe,
                    &["Tomato", "cheese"],
                    "generation-calls",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok("caprese".to_string())
                    },
                )
                .await
                .unwrap();
            assert_eq!(value, "caprese");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let usage = service.usage();
        assert_eq!(usage.calls("generation-calls"), 1);
        assert_eq!(usage.saved("generation-calls"), 1);
    }

    #[tokio::test]
    async fn test_failure_is_metered_not_cached() {
        let service = service();

        let err = service
            .call("image", &["sunset"], "image-calls", || async {
                Err::<String, _>(anyhow::anyhow!("rate limited"))
            })
            .await
            .unwrap_err();
        assert!(err.is_operation());

        assert!(service.cache().get("image:sunset").await.is_none());
        assert_eq!(service.usage().calls("image-calls"), 1);
    }

    #[tokio::test]
    async fn test_open_sweeps_in_background_by_default() {
        let mut config = GenCacheConfig::default();
        config.cache.sweep_interval = Duration::from_millis(50);

        let service = GenerationService::<String>::open(config).await.unwrap();
        service
            .cache()
            .set("narration:intro", "Once upon a time".to_string(), Duration::from_millis(10))
            .await;
        assert_eq!(service.cache().len().await, 1);

        tokio::time::sleep(Duration::from_millis(200)).await;

        // Dropped without the key ever being read again
        assert!(service.cache().is_empty().await);
        assert_eq!(service.stats().await.evictions_ttl, 1);
    }

    #[tokio::test]
    async fn test_panicking_operation_is_metered() {
        let service = service();

        let err = service
            .call("speech", &["chapter one"], "speech-calls", || async {
                if true {
                    panic!("synthesizer crashed");
                }
                Ok("audio".to_string())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GenCacheError::TaskFailed(_)));

        let usage = service.usage();
        assert_eq!(usage.calls("speech-calls"), 1);
        assert_eq!(usage.saved("speech-calls"), 0);
        assert!(service.cache().get("speech:chapter one").await.is_none());
    }
}
