//! Bounded-concurrency executor for independent fetch operations.
//!
//! Work is partitioned into fixed-size windows; each window is launched
//! concurrently and awaited as a whole before the next window starts. The
//! shared cancellation token is checked before each window and remaining
//! windows are abandoned once it fires. Windowing trades straggler latency
//! for a trivially correct concurrency bound.

use std::future::Future;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::domain::cancellation::CancellationToken;
use crate::domain::error::SyncError;

/// Runs `op` over `items` with at most `window` operations in flight.
///
/// The result vector is index-aligned with the input: a failed item yields
/// `None` (logged, never propagated) so one item's failure cannot abort the
/// batch, and items in abandoned windows yield `None` as well.
pub async fn run_windowed<T, R, F, Fut>(
    items: Vec<T>,
    window: usize,
    token: &CancellationToken,
    op: F,
) -> Vec<Option<R>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, SyncError>>,
{
    let window = window.max(1);
    let total = items.len();
    let mut results: Vec<Option<R>> = Vec::with_capacity(total);

    let mut remaining = items.into_iter();
    loop {
        let chunk: Vec<T> = remaining.by_ref().take(window).collect();
        if chunk.is_empty() {
            break;
        }

        if token.is_cancelled() {
            warn!(
                processed = results.len(),
                total, "window executor stopped by cancellation"
            );
            break;
        }

        let window_results = join_all(chunk.into_iter().map(&op)).await;
        for result in window_results {
            match result {
                Ok(value) => results.push(Some(value)),
                Err(err) => {
                    debug!(error = %err, "window item failed, continuing");
                    results.push(None);
                }
            }
        }
    }

    // Pad abandoned items so the output stays index-aligned with the input.
    results.resize_with(total, || None);
    results
}
