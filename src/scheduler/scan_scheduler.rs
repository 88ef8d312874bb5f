//! Tick-driven scanning of watched accounts.
//!
//! Lifecycle: `Idle -> Syncing -> Polling -> Stopped`. `start()` runs a
//! one-time cursor sync bounded by `initial_sync_timeout`, then spawns the
//! tick loop. At most one tick is in flight; a tick firing while the
//! previous one still runs is skipped, never queued.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use super::BatchOutcome;
use super::BoundedExecutor;
use super::InProgressSet;
use crate::CursorStore;
use crate::Error;
use crate::NotificationDedupCache;
use crate::NotificationSink;
use crate::PendingEvent;
use crate::ResourceCounters;
use crate::Result;
use crate::RetryingRpcAdapter;
use crate::RpcError;
use crate::ScanConfig;
use crate::SubscriberRegistry;
use crate::WatcherError;
use crate::ACCOUNT_SCANS;
use crate::NOTIFICATIONS;
use crate::SCAN_TICKS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Syncing,
    Polling,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub initialized: bool,
    pub initializing: bool,
    pub error: Option<String>,
    pub state: SchedulerState,
    pub ticks_completed: u64,
    pub ticks_skipped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The previous tick was still running.
    Skipped,
    Completed(BatchOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Another task is scanning the address.
    Busy,
    /// The address was unregistered while its fetch was in flight.
    Unwatched,
    /// First cursor established; no events emitted.
    Synced,
    Scanned {
        new_transactions: usize,
        delivered: usize,
    },
}

/// Components a scan reads and updates.
#[derive(Clone)]
pub struct ScanContext {
    pub cursors: Arc<CursorStore>,
    pub dedup: Arc<NotificationDedupCache>,
    pub adapter: Arc<RetryingRpcAdapter>,
    pub subscribers: Arc<SubscriberRegistry>,
    pub sink: Arc<dyn NotificationSink>,
    pub counters: Arc<ResourceCounters>,
    pub in_progress: InProgressSet,
}

struct TickGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> TickGuard<'a> {
    fn try_acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickGuard { running })
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

pub struct ScanScheduler {
    ctx: ScanContext,
    config: ScanConfig,
    dedup_ttl: Duration,
    executor: BoundedExecutor,
    tick_running: AtomicBool,
    ticks_completed: AtomicU64,
    ticks_skipped: AtomicU64,
    state: Mutex<SchedulerState>,
    last_error: Mutex<Option<String>>,
    shutdown: CancellationToken,
}

impl ScanScheduler {
    pub fn new(
        ctx: ScanContext,
        config: ScanConfig,
        dedup_ttl: Duration,
    ) -> Self {
        Self {
            executor: BoundedExecutor::new(config.concurrency),
            ctx,
            config,
            dedup_ttl,
            tick_running: AtomicBool::new(false),
            ticks_completed: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            state: Mutex::new(SchedulerState::Idle),
            last_error: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.state();
        SchedulerStatus {
            initialized: state == SchedulerState::Polling,
            initializing: state == SchedulerState::Syncing,
            error: self.last_error.lock().clone(),
            state,
            ticks_completed: self.ticks_completed.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
        }
    }

    pub fn is_tick_running(&self) -> bool {
        self.tick_running.load(Ordering::Acquire)
    }

    /// Syncs every known account, then starts the tick loop.
    ///
    /// # Errors
    /// `WatcherError::AlreadyStarted` unless the scheduler is idle,
    /// `WatcherError::Stopped` once it has been stopped.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                SchedulerState::Idle => *state = SchedulerState::Syncing,
                SchedulerState::Stopped => return Err(WatcherError::Stopped.into()),
                SchedulerState::Syncing | SchedulerState::Polling => {
                    return Err(WatcherError::AlreadyStarted.into())
                }
            }
        }

        self.initial_sync().await;

        {
            let mut state = self.state.lock();
            if *state == SchedulerState::Stopped {
                return Ok(());
            }
            *state = SchedulerState::Polling;
        }
        self.spawn_tick_loop();
        info!(interval = ?self.config.poll_interval(), "scan scheduler polling");
        Ok(())
    }

    /// Stops the tick loop. Ticks already running finish on their own and
    /// cursors stay in memory.
    pub fn stop(&self) {
        *self.state.lock() = SchedulerState::Stopped;
        self.shutdown.cancel();
        info!("scan scheduler stopped");
    }

    fn spawn_tick_loop(self: &Arc<Self>) {
        let every = self.config.poll_interval();
        let token = self.shutdown.clone();
        let scheduler = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("tick loop exiting");
                        break;
                    }
                    _ = ticker.tick() => {
                        let scheduler = scheduler.clone();
                        tokio::spawn(async move {
                            scheduler.run_tick().await;
                        });
                    }
                }
            }
        });
    }

    #[instrument(skip(self))]
    async fn initial_sync(&self) {
        let pending = self.ctx.cursors.unsynced_accounts();
        if pending.is_empty() {
            return;
        }

        let budget = self.config.initial_sync_timeout();
        info!(accounts = pending.len(), ?budget, "initial cursor sync");
        let sync = self.executor.run(pending, |address| self.sync_account(address));

        match tokio::time::timeout(budget, sync).await {
            Ok(outcome) => {
                info!(
                    succeeded = outcome.succeeded,
                    failed = outcome.failed,
                    "initial sync settled"
                );
            }
            Err(_) => {
                let msg = format!("initial sync timed out after {budget:?}");
                warn!("{}, continuing with empty cursors", msg);
                *self.last_error.lock() = Some(msg);
            }
        }

        for address in self.ctx.cursors.unsynced_accounts() {
            self.ctx.cursors.mark_empty_unsynced(&address);
        }
    }

    async fn sync_account(
        &self,
        address: String,
    ) -> Result<()> {
        let Some(_claim) = self.ctx.in_progress.try_acquire(&address) else {
            return Ok(());
        };

        match self.ctx.adapter.initial_sync_watermark(&address).await {
            Ok(watermark) => {
                if self.ctx.cursors.contains(&address) {
                    self.ctx.cursors.advance(&address, watermark);
                }
                Ok(())
            }
            Err(e) => {
                self.ctx.cursors.mark_empty_unsynced(&address);
                Err(e.into())
            }
        }
    }

    /// Scans every due account not already being scanned.
    #[instrument(skip(self))]
    pub async fn run_tick(&self) -> TickOutcome {
        let Some(_tick) = TickGuard::try_acquire(&self.tick_running) else {
            SCAN_TICKS.with_label_values(&["skipped"]).inc();
            self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
            debug!("previous tick still running, skipping");
            return TickOutcome::Skipped;
        };

        let tick_at = Instant::now();
        let due: Vec<String> = self
            .ctx
            .cursors
            .due_accounts(tick_at)
            .into_iter()
            .filter(|address| !self.ctx.in_progress.contains(address))
            .collect();

        let outcome = self
            .executor
            .run(due, |address| self.scan_account_at(address, tick_at))
            .await;

        SCAN_TICKS.with_label_values(&["completed"]).inc();
        self.ticks_completed.fetch_add(1, Ordering::Relaxed);
        debug!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "tick completed"
        );
        TickOutcome::Completed(outcome)
    }

    /// Fetches what changed for `address` since its cursor, advances the
    /// cursor and delivers the resulting events.
    ///
    /// On failure the cursor is left untouched so the next tick retries
    /// from the same position.
    pub async fn scan_account(
        &self,
        address: String,
    ) -> Result<ScanOutcome> {
        self.scan_account_at(address, Instant::now()).await
    }

    /// [`ScanScheduler::scan_account`] on behalf of the tick started at
    /// `tick_at`.
    #[instrument(skip(self, tick_at))]
    async fn scan_account_at(
        &self,
        address: String,
        tick_at: Instant,
    ) -> Result<ScanOutcome> {
        let Some(_claim) = self.ctx.in_progress.try_acquire(&address) else {
            ACCOUNT_SCANS.with_label_values(&["busy"]).inc();
            return Ok(ScanOutcome::Busy);
        };
        self.ctx.cursors.mark_checked(&address, tick_at);

        let since = match self.ctx.cursors.get(&address) {
            Some(since) if !self.ctx.cursors.needs_baseline(&address) => since,
            _ => return self.establish_baseline(&address).await,
        };

        let (transactions, watermark) = self
            .ctx
            .adapter
            .fetch_new_transactions(&address, &since)
            .await
            .map_err(|e| self.scan_failed(&address, e))?;

        if !self.ctx.cursors.contains(&address) {
            return Ok(ScanOutcome::Unwatched);
        }
        self.ctx.cursors.advance(&address, watermark);
        let interval = self.ctx.cursors.activity_hint(&address, !transactions.is_empty());
        ACCOUNT_SCANS.with_label_values(&["success"]).inc();

        let Some(newest) = transactions.first() else {
            debug!(?interval, "no new transactions");
            return Ok(ScanOutcome::Scanned {
                new_transactions: 0,
                delivered: 0,
            });
        };

        let subscribers = self.ctx.subscribers.subscribers(&address);
        let mut events: Vec<PendingEvent> = transactions
            .iter()
            .rev()
            .map(|tx| PendingEvent::transaction(&address, subscribers.clone(), tx))
            .collect();
        if let Some(event) = self.balance_event(&address, &subscribers, &newest.signature).await {
            events.push(event);
        }

        let mut delivered = 0;
        for event in events {
            if self.deliver(event).await {
                delivered += 1;
            }
        }

        info!(new = transactions.len(), delivered, "account activity detected");
        Ok(ScanOutcome::Scanned {
            new_transactions: transactions.len(),
            delivered,
        })
    }

    /// Adopts the newest transaction of a never-synced account, or of one
    /// whose sync fell back to `Empty`, without reporting its history.
    async fn establish_baseline(
        &self,
        address: &str,
    ) -> Result<ScanOutcome> {
        let watermark = self
            .ctx
            .adapter
            .fetch_latest_watermark(address)
            .await
            .map_err(|e| self.scan_failed(address, e))?;
        if !self.ctx.cursors.contains(address) {
            return Ok(ScanOutcome::Unwatched);
        }
        debug!(address, ?watermark, "baseline established");
        self.ctx.cursors.advance(address, watermark);
        ACCOUNT_SCANS.with_label_values(&["success"]).inc();
        Ok(ScanOutcome::Synced)
    }

    fn scan_failed(
        &self,
        address: &str,
        e: RpcError,
    ) -> Error {
        let outcome = if e.is_timeout() { "timeout" } else { "failure" };
        ACCOUNT_SCANS.with_label_values(&[outcome]).inc();
        warn!(address, "scan failed, cursor kept: {}", e);
        e.into()
    }

    /// Reads the current balance and diffs it against the last one seen.
    /// The first reading only sets the baseline.
    async fn balance_event(
        &self,
        address: &str,
        subscribers: &[String],
        newest_signature: &str,
    ) -> Option<PendingEvent> {
        let current = match self.ctx.adapter.fetch_balance(address).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(address, "balance fetch failed: {}", e);
                return None;
            }
        };
        let previous = self.ctx.cursors.last_balance(address);
        self.ctx.cursors.set_balance(address, current);

        previous.and_then(|previous| {
            PendingEvent::balance_change(
                address,
                subscribers.to_vec(),
                previous,
                current,
                newest_signature,
            )
        })
    }

    /// Hands `event` to the sink unless it was already delivered. Returns
    /// true when the sink accepted it.
    async fn deliver(
        &self,
        event: PendingEvent,
    ) -> bool {
        if self.ctx.dedup.has_seen(&event.id) {
            NOTIFICATIONS.with_label_values(&["duplicate"]).inc();
            debug!(event_id = %event.id, "duplicate event suppressed");
            return false;
        }

        let id = event.id.clone();
        match self.ctx.sink.deliver(event).await {
            Ok(()) => {
                self.ctx.dedup.mark_seen(&id, self.dedup_ttl);
                self.ctx.counters.track_outbound_message();
                NOTIFICATIONS.with_label_values(&["delivered"]).inc();
                true
            }
            Err(e) => {
                NOTIFICATIONS.with_label_values(&["failed"]).inc();
                warn!(event_id = %id, "notification delivery failed: {}", e);
                false
            }
        }
    }
}
