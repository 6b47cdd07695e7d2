//! Per-key debouncing of bursty calls
//!
//! Each call for a key replaces the pending timer for that key and arms a
//! new one `delay` later. Only the newest registration's operation runs;
//! callers it superseded resolve with that same outcome.

use crate::coordinator::dedup::SharedCall;
use crate::error::{GenCacheError, Result};
use futures::future::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// One burst of calls for a key that has not fired yet
struct Slot<T> {
    /// Registration that owns the armed timer
    generation: u64,

    /// Timer task; aborted when a newer registration arrives
    timer: JoinHandle<()>,

    /// Taken by the timer when it fires
    outcome_tx: Option<oneshot::Sender<Result<T>>>,

    /// What every caller in the burst awaits
    outcome: SharedCall<T>,
}

type Slots<T> = Arc<Mutex<HashMap<String, Slot<T>>>>;

fn lock<T>(
    slots: &Mutex<HashMap<String, Slot<T>>>,
) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of armed debounce timers, at most one per key
pub struct Debouncer<T> {
    slots: Slots<T>,
    generations: AtomicU64,
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
        }
    }
}

impl<T> Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `operation` for `key` after `delay` of quiet
    ///
    /// Any not-yet-fired registration for the same key is cancelled and
    /// its caller resolves with the outcome of this (or a later) one.
    pub async fn debounce<F, Fut>(&self, key: &str, operation: F, delay: Duration) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let outcome = {
            let mut slots = lock(&self.slots);

            let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
            let timer = tokio::spawn(fire(
                self.slots.clone(),
                key.to_string(),
                generation,
                delay,
                operation,
            ));

            match slots.get_mut(key) {
                Some(slot) => {
                    debug!("Superseding debounced call: {}", key);
                    slot.timer.abort();
                    slot.timer = timer;
                    slot.generation = generation;
                    slot.outcome.clone()
                }
                None => {
                    debug!("Arming debounced call: {}", key);
                    let (tx, rx) = oneshot::channel();
                    let outcome = async move {
                        rx.await.unwrap_or_else(|_| {
                            Err(GenCacheError::TaskFailed(
                                "debounced operation did not complete".to_string(),
                            ))
                        })
                    }
                    .boxed()
                    .shared();

                    slots.insert(
                        key.to_string(),
                        Slot {
                            generation,
                            timer,
                            outcome_tx: Some(tx),
                            outcome: outcome.clone(),
                        },
                    );
                    outcome
                }
            }
        };

        outcome.await
    }

    /// Cancel the armed timer for `key`; its waiters get [`GenCacheError::Cancelled`]
    pub fn cancel(&self, key: &str) -> bool {
        let Some(mut slot) = lock(&self.slots).remove(key) else {
            return false;
        };

        slot.timer.abort();
        if let Some(tx) = slot.outcome_tx.take() {
            let _ = tx.send(Err(GenCacheError::Cancelled));
        }
        debug!("Cancelled debounced call: {}", key);
        true
    }

    /// Number of keys with an armed timer
    pub fn pending(&self) -> usize {
        lock(&self.slots).len()
    }
}

/// Timer body: wait out the quiet period, then run if still the newest registration
async fn fire<T, F, Fut>(
    slots: Slots<T>,
    key: String,
    generation: u64,
    delay: Duration,
    operation: F,
) where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    tokio::time::sleep(delay).await;

    let outcome_tx = {
        let mut slots = lock(&slots);

        // Superseded after the sleep finished but before the abort landed
        if slots.get(&key).map(|slot| slot.generation) != Some(generation) {
            return;
        }
        slots.remove(&key).and_then(|mut slot| slot.outcome_tx.take())
    };

    debug!("Firing debounced call: {}", key);
    let outcome = operation().await.map_err(GenCacheError::operation);

    if let Some(tx) = outcome_tx {
        let _ = tx.send(outcome);
    }
}
