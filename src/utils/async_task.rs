//! Timeout and retry helpers shared by every RPC call site.
//!
//! Each hard timeout is acquired through a [`TimerRegistry`], which hands out
//! a [`TimerGuard`] that is released when the guard is dropped. The race is
//! run while the guard is alive, so the timer is released on success, on
//! error, on elapse and when the racing future itself is dropped.

use std::future::Future;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::error;
use tracing::warn;

use crate::BackoffPolicy;
use crate::RpcError;

/// Counts hard-timeout timers that are currently armed.
#[derive(Debug, Clone, Default)]
pub struct TimerRegistry {
    live: Arc<AtomicUsize>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers acquired and not yet released.
    pub fn live_timers(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    fn acquire(&self) -> TimerGuard {
        self.live.fetch_add(1, Ordering::AcqRel);
        TimerGuard {
            live: self.live.clone(),
        }
    }

    /// Races `fut` against a hard timeout of `duration`.
    ///
    /// The timer is released on every exit path.
    pub async fn with_timeout<F, T>(
        &self,
        operation: &'static str,
        duration: Duration,
        fut: F,
    ) -> std::result::Result<T, RpcError>
    where
        F: Future<Output = std::result::Result<T, RpcError>>,
    {
        let _guard = self.acquire();
        match tokio::time::timeout(duration, fut).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout { operation, duration }),
        }
    }
}

/// Releases its timer slot on drop.
#[derive(Debug)]
pub struct TimerGuard {
    live: Arc<AtomicUsize>,
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Runs `task` up to `policy.max_retries` times, each attempt bounded by
/// `policy.timeout_ms`, sleeping `policy.delay_after(n)` between attempts.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    timers: &TimerRegistry,
    operation: &'static str,
    task: F,
    policy: BackoffPolicy,
) -> std::result::Result<P, RpcError>
where
    F: Fn() -> T,
    T: Future<Output = std::result::Result<P, RpcError>>,
{
    let max_attempts = policy.max_retries.max(1);
    let mut attempt = 0;
    let mut last_error = String::new();

    while attempt < max_attempts {
        attempt += 1;
        match timers.with_timeout(operation, policy.timeout(), task()).await {
            Ok(r) => return Ok(r),
            Err(e) => {
                warn!(operation, attempt, max_attempts, "attempt failed: {}", e);
                last_error = e.to_string();
            }
        }

        if attempt < max_attempts {
            sleep(policy.delay_after(attempt)).await;
        }
    }

    warn!(operation, "task failed after {} attempts", attempt);
    Err(RpcError::RetriesExhausted {
        operation,
        attempts: attempt,
        last_error,
    })
}

// Helper function to spawn tasks and track their JoinHandles
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
    handles: Option<&mut Vec<tokio::task::JoinHandle<()>>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = crate::Result<()>> + Send + 'static,
{
    let name = name.to_string();
    let handle = tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    });

    if let Some(h) = handles {
        h.push(handle);
    }
}
