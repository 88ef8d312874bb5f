//! Fixed fan-out runner for per-account work.
//!
//! Every item is driven to completion: a failing or panicking worker is
//! counted and logged, and the remaining items keep running.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use futures::stream;
use futures::FutureExt;
use futures::StreamExt;
use tracing::debug;
use tracing::error;

/// Tally of one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoundedExecutor {
    concurrency: usize,
}

impl BoundedExecutor {
    /// A concurrency of 0 is treated as 1.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs `worker` over `items` with at most `concurrency` workers in
    /// flight and resolves once every item has settled.
    pub async fn run<T, R, E, F, Fut>(
        &self,
        items: Vec<T>,
        worker: F,
    ) -> BatchOutcome
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
        E: Display,
    {
        let succeeded = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        stream::iter(items)
            .for_each_concurrent(self.concurrency, |item| {
                let fut = AssertUnwindSafe(worker(item)).catch_unwind();
                let succeeded = &succeeded;
                let failed = &failed;
                async move {
                    match fut.await {
                        Ok(Ok(_)) => {
                            succeeded.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(Err(e)) => {
                            debug!("work item failed: {}", e);
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            error!("work item panicked");
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
            .await;

        BatchOutcome {
            succeeded: succeeded.into_inner(),
            failed: failed.into_inner(),
        }
    }
}
