//! Rate-limited batching of independent operations

use crate::error::{GenCacheError, Result};
use futures::future::join_all;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Run `operations` in consecutive concurrent groups of at most `group_size`
///
/// Groups run one after another with `pause` between them. `results[i]` is
/// the outcome of `operations[i]`; a failing member only fails its own slot.
/// A `group_size` of zero is treated as one.
pub async fn run_batched<T, F, Fut>(
    operations: Vec<F>,
    group_size: usize,
    pause: Duration,
) -> Vec<Result<T>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let group_size = group_size.max(1);
    let total = operations.len();
    let mut results = Vec::with_capacity(total);
    let mut remaining = operations.into_iter().peekable();

    let mut group = 0usize;
    while remaining.peek().is_some() {
        if group > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        let running: Vec<Fut> = remaining.by_ref().take(group_size).map(|op| op()).collect();
        debug!("Running batch group {} ({} operations)", group, running.len());

        let outcomes = join_all(running).await;
        results.extend(
            outcomes
                .into_iter()
                .map(|outcome| outcome.map_err(GenCacheError::operation)),
        );
        group += 1;
    }

    debug!("Batch finished: {} operations in {} groups", total, group);
    results
}
