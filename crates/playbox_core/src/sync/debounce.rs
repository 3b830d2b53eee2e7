//! Debounce timer shared by the sync coordinators.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::cancel::CancellationToken;

/// Coalesces bursts of triggers into a single deferred task.
///
/// Each [`schedule`](Debouncer::schedule) supersedes any pending task; the
/// task only runs if no newer schedule arrived during the quiet period.
/// A cancelled teardown token discards pending work instead of flushing it.
pub struct Debouncer {
    delay: Duration,
    epoch: Arc<AtomicU64>,
    teardown: CancellationToken,
}

impl Debouncer {
    /// Create a debouncer with the given quiet period.
    pub fn new(delay: Duration, teardown: CancellationToken) -> Self {
        Self {
            delay,
            epoch: Arc::new(AtomicU64::new(0)),
            teardown,
        }
    }

    /// Schedule `task` to run after the quiet period, superseding any
    /// previously scheduled task.
    pub fn schedule<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let epochs = Arc::clone(&self.epoch);
        let teardown = self.teardown.clone();
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::select! {
                _ = teardown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if epochs.load(Ordering::SeqCst) == epoch && !teardown.is_cancelled() {
                task.await;
            }
        });
    }

    /// Discard any pending task without running it.
    pub fn cancel_pending(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}
