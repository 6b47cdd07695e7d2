//! In-flight call deduplication
//!
//! The first caller for a key registers a shared handle and starts the
//! operation on its own task; later callers attach to that handle. The
//! registration is removed as soon as the operation settles, so the next
//! caller after that starts fresh.

use crate::error::{GenCacheError, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Shared handle to one in-flight operation
pub(crate) type SharedCall<T> = Shared<BoxFuture<'static, Result<T>>>;

type Registry<T> = Arc<Mutex<HashMap<String, SharedCall<T>>>>;

fn lock<T>(
    registry: &Mutex<HashMap<String, SharedCall<T>>>,
) -> MutexGuard<'_, HashMap<String, SharedCall<T>>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of pending calls, at most one per key
pub struct Deduplicator<T> {
    pending: Registry<T>,
}

impl<T> Default for Deduplicator<T> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Removes a key from the registry when the driving task ends, even by panic
struct Deregister<T> {
    registry: Registry<T>,
    key: String,
}

impl<T> Drop for Deregister<T> {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.key);
    }
}

impl<T> Deduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `operation` unless a call for `key` is already in flight
    ///
    /// Every caller racing on the same key observes the outcome of a single
    /// invocation. The check and the registration happen under one lock
    /// acquisition with no suspension point between them. The operation
    /// runs on its own task and completes even if every caller goes away.
    pub async fn deduplicate<F, Fut>(&self, key: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let call = {
            let mut pending = lock(&self.pending);

            match pending.get(key) {
                Some(call) => {
                    debug!("Attaching to in-flight call: {}", key);
                    call.clone()
                }
                None => {
                    debug!("Starting call: {}", key);
                    let work = operation();
                    let guard = Deregister {
                        registry: self.pending.clone(),
                        key: key.to_string(),
                    };

                    let handle = tokio::spawn(async move {
                        let _guard = guard;
                        work.await.map_err(GenCacheError::operation)
                    });

                    let call = async move {
                        handle
                            .await
                            .map_err(|e| GenCacheError::TaskFailed(e.to_string()))?
                    }
                    .boxed()
                    .shared();

                    pending.insert(key.to_string(), call.clone());
                    call
                }
            }
        };

        call.await
    }

    /// Number of calls currently in flight
    pub fn in_flight(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Whether a call for `key` is in flight
    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.pending).contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_invocation() {
        let dedup = Deduplicator::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..10).map(|_| {
            let calls = calls.clone();
            dedup.deduplicate("recipe:cheese,tomato", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(42)
            })
        });

        let results = join_all(callers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| matches!(r, Ok(42))));
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_not_sticky() {
        let dedup = Deduplicator::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err::<u32, _>(anyhow::anyhow!("backend returned 503"))
            }
        };

        let (a, b) = tokio::join!(
            dedup.deduplicate("k", failing(calls.clone())),
            dedup.deduplicate("k", failing(calls.clone())),
        );

        let (a, b) = (a.unwrap_err(), b.unwrap_err());
        assert_eq!(a.to_string(), "Operation failed: backend returned 503");
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Settled: the next call starts fresh
        let value = dedup.deduplicate("k", || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_different_keys_run_independently() {
        let dedup = Deduplicator::<&'static str>::new();

        let (a, b) = tokio::join!(
            dedup.deduplicate("a", || async { Ok("first") }),
            dedup.deduplicate("b", || async { Ok("second") }),
        );

        assert_eq!(a.unwrap(), "first");
        assert_eq!(b.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_operation_survives_dropped_caller() {
        let dedup = Deduplicator::<u32>::new();
        let finished = Arc::new(AtomicUsize::new(0));

        let done = finished.clone();
        let first = dedup.deduplicate("k", move || async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            done.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });

        // Poll once so the call registers, then drop the caller
        let _ = tokio::time::timeout(Duration::from_millis(5), first).await;
        assert!(dedup.is_pending("k"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(!dedup.is_pending("k"));
    }

    #[tokio::test]
    async fn test_panicking_operation_releases_key() {
        let dedup = Deduplicator::<u32>::new();

        let err = dedup
            .deduplicate("k", || async {
                if true {
                    panic!("provider client bug");
                }
                Ok(0)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GenCacheError::TaskFailed(_)));
        assert!(!dedup.is_pending("k"));
    }
}
