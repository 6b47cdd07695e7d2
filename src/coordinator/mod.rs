//! # Request Coordinator
//!
//! Protects expensive operations from redundant concurrent or rapid-fire
//! invocation.
//!
//! - **Deduplicate**: at most one in-flight invocation per key; every
//!   concurrent caller gets that invocation's outcome
//! - **Debounce**: only the last call of a burst runs, `delay` after it
//! - **Batch**: fixed-size concurrent groups with a pause between groups
//!
//! The coordinator knows nothing about what an operation does. Failures
//! are shared with every caller of the same invocation and never retried.
//!
//! ## Example
//!
//! ```rust
//! use gencache::coordinator::{CoordinatorConfig, RequestCoordinator};
//!
//! # async fn example() -> gencache::Result<()> {
//! let coordinator = RequestCoordinator::<String>::new(CoordinatorConfig::default());
//!
//! let recipe = coordinator
//!     .deduplicate("generate:cheese,tomato", || async {
//!         Ok("Caprese salad".to_string())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod debounce;
pub mod dedup;

pub use batch::run_batched;
pub use config::CoordinatorConfig;
pub use debounce::Debouncer;
pub use dedup::Deduplicator;

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Dedup and debounce registries for operations producing `T`
pub struct RequestCoordinator<T> {
    config: CoordinatorConfig,
    dedup: Deduplicator<T>,
    debouncer: Debouncer<T>,
}

impl<T> RequestCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a coordinator with empty registries
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            dedup: Deduplicator::new(),
            debouncer: Debouncer::new(),
        }
    }

    /// The configuration this coordinator was built with
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Invoke `operation` once for all concurrent callers of `key`
    pub async fn deduplicate<F, Fut>(&self, key: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.dedup.deduplicate(key, operation).await
    }

    /// Invoke `operation` after `delay` without a newer call for `key`
    pub async fn debounce<F, Fut>(&self, key: &str, operation: F, delay: Duration) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.debouncer.debounce(key, operation, delay).await
    }

    /// Debounce with the configured default delay
    pub async fn debounce_default<F, Fut>(&self, key: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let delay = self.config.debounce_delay;
        self.debouncer.debounce(key, operation, delay).await
    }

    /// Cancel a pending debounced call
    pub fn cancel_debounce(&self, key: &str) -> bool {
        self.debouncer.cancel(key)
    }

    /// Run `operations` in groups of `group_size`, preserving input order
    pub async fn batch<U, F, Fut>(&self, operations: Vec<F>, group_size: usize) -> Vec<Result<U>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<U>>,
    {
        run_batched(operations, group_size, self.config.batch_pause).await
    }

    /// Number of deduplicated calls in flight
    pub fn in_flight(&self) -> usize {
        self.dedup.in_flight()
    }

    /// Number of keys with an armed debounce timer
    pub fn pending_debounces(&self) -> usize {
        self.debouncer.pending()
    }
}
